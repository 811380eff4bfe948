//! The Header Composer (spec §4.6): merges per-request headers fresh on
//! every outbound exchange. Never cached on the transport instance, so a
//! caller mutating `RequestInit`'s headers between sends is visible on the
//! very next request (Invariant 4).

use http::{HeaderMap, HeaderName, HeaderValue};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Which kind of exchange headers are being composed for — the merge rules
/// in spec §4.6 apply a different subset of steps to each.
///
/// A standalone stream opened with a resumption token and an automatic
/// reconnect GET are the same request shape from the header composer's
/// point of view: both are a `Get` that carries `Last-Event-ID` exactly
/// when one is known. There is no separate "reconnect" kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Post,
    Get,
    Delete,
}

#[derive(Default)]
pub struct HeaderComposer<'a> {
    pub custom_headers: &'a HeaderMap,
    pub session_id: Option<&'a str>,
    pub auth_token: Option<&'a str>,
    pub last_event_id: Option<&'a str>,
}

impl<'a> HeaderComposer<'a> {
    pub fn compose(&self, kind: RequestKind) -> HeaderMap {
        let mut headers = HeaderMap::new();

        // 1. default Accept, for exchanges that may open or read a stream.
        if !matches!(kind, RequestKind::Delete) {
            headers.insert(
                http::header::ACCEPT,
                HeaderValue::from_static(ACCEPT_VALUE),
            );
        }

        // 2. caller-supplied headers — re-read fresh every call.
        for (name, value) in self.custom_headers {
            headers.insert(name.clone(), value.clone());
        }

        // 3. bearer auth token, if the provider has one cached.
        if let Some(token) = self.auth_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(http::header::AUTHORIZATION, value);
            }
        }

        // 4. session id, once captured.
        if let Some(session_id) = self.session_id {
            if let Ok(value) = HeaderValue::from_str(session_id) {
                headers.insert(HeaderName::from_static(SESSION_ID_HEADER), value);
            }
        }

        // 5. Last-Event-ID, whenever one is known — whether this GET is an
        // automatic reconnect or an explicit open with a resumption token.
        if let Some(last_event_id) = self.last_event_id {
            if let Ok(value) = HeaderValue::from_str(last_event_id) {
                headers.insert(HeaderName::from_static(LAST_EVENT_ID_HEADER), value);
            }
        }

        // 6. Content-Type, for POST only.
        if matches!(kind, RequestKind::Post) {
            headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_carries_accept_and_content_type() {
        let custom = HeaderMap::new();
        let composer = HeaderComposer {
            custom_headers: &custom,
            ..Default::default()
        };
        let headers = composer.compose(RequestKind::Post);
        assert_eq!(
            headers.get(http::header::ACCEPT).unwrap(),
            "application/json, text/event-stream"
        );
        assert_eq!(
            headers.get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn delete_carries_only_session_id() {
        let custom = HeaderMap::new();
        let composer = HeaderComposer {
            custom_headers: &custom,
            session_id: Some("sess-1"),
            ..Default::default()
        };
        let headers = composer.compose(RequestKind::Delete);
        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers.get(HeaderName::from_static(SESSION_ID_HEADER)).unwrap(),
            "sess-1"
        );
    }

    #[test]
    fn get_carries_last_event_id_when_known() {
        let custom = HeaderMap::new();
        let composer = HeaderComposer {
            custom_headers: &custom,
            last_event_id: Some("evt-42"),
            ..Default::default()
        };
        let headers = composer.compose(RequestKind::Get);
        assert_eq!(
            headers
                .get(HeaderName::from_static(LAST_EVENT_ID_HEADER))
                .unwrap(),
            "evt-42"
        );
    }

    #[test]
    fn get_omits_last_event_id_when_none_is_known() {
        let custom = HeaderMap::new();
        let composer = HeaderComposer {
            custom_headers: &custom,
            ..Default::default()
        };
        let headers = composer.compose(RequestKind::Get);
        assert!(
            headers
                .get(HeaderName::from_static(LAST_EVENT_ID_HEADER))
                .is_none()
        );
    }

    #[test]
    fn transport_managed_headers_win_over_stale_caller_headers() {
        let mut custom = HeaderMap::new();
        custom.insert(
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderValue::from_static("stale"),
        );
        let composer = HeaderComposer {
            custom_headers: &custom,
            session_id: Some("fresh"),
            ..Default::default()
        };
        let headers = composer.compose(RequestKind::Post);
        assert_eq!(
            headers.get(HeaderName::from_static(SESSION_ID_HEADER)).unwrap(),
            "fresh"
        );
    }

    #[test]
    fn header_names_dedupe_case_insensitively() {
        let mut custom = HeaderMap::new();
        custom.insert(
            HeaderName::from_bytes(b"Accept").unwrap(),
            HeaderValue::from_static("text/plain"),
        );
        let composer = HeaderComposer {
            custom_headers: &custom,
            ..Default::default()
        };
        let headers = composer.compose(RequestKind::Post);
        assert_eq!(
            headers.get(http::header::ACCEPT).unwrap(),
            "text/plain",
            "caller's Accept override should replace, not duplicate, the default"
        );
        assert_eq!(
            headers.get_all(http::header::ACCEPT).iter().count(),
            1
        );
    }
}
