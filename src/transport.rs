//! The Transport Controller (spec §4.1) and the actor that backs it.
//!
//! All mutable protocol state — session id, the set of live SSE streams,
//! reconnect counters — is owned by a single task, grounded on the
//! `Worker`/`WorkerTransport` actor shape in the teacher's
//! `streamable_http_client.rs`: a spawned task owns state and is reached
//! only through channels, so concurrent `send`s never race each other for
//! the session id or the stream registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use sse_stream::{Error as SseError, Sse};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "auth")]
use crate::auth::AuthProvider;
use crate::config::TransportConfig;
use crate::dispatcher::{classify_response, Classified};
use crate::error::TransportError;
use crate::fetch::{BodyStream, Fetch, HttpRequest};
use crate::headers::{HeaderComposer, RequestKind};
use crate::message::{InboundPayload, JsonRpcMessage, OutboundPayload};
use crate::session::SessionSlot;
use crate::sse::decode_sse_stream;

pub type MessageHandler = Arc<dyn Fn(JsonRpcMessage) + Send + Sync>;
pub type ErrorHandler<E> = Arc<dyn Fn(TransportError<E>) + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// A unit of work the actor tracks in its `JoinSet` (an SSE stream reader,
/// or a command handler), requested via `ActorState::spawn` from any task
/// holding a clone of the actor — not only the actor's own loop.
type SpawnedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Whether a stream is eligible for the Resumption Manager. The standalone
/// stream always is; a per-request stream only becomes resumable once its
/// first event has arrived (spec §4.3).
#[derive(Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Standalone,
    PerRequest,
}

enum Command<F: Fetch> {
    Send {
        payload: OutboundPayload,
        reply: oneshot::Sender<Result<(), TransportError<F::Error>>>,
    },
    OpenStandaloneStream {
        last_event_id: Option<String>,
        reply: oneshot::Sender<Result<(), TransportError<F::Error>>>,
    },
    TerminateSession {
        reply: oneshot::Sender<Result<(), TransportError<F::Error>>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotStarted,
    Started,
    Closed,
}

/// Construction-time handler registration and the pluggable `Fetch`/config
/// pair (spec §6.4). Mirrors the small chainable-setter builder style of
/// `StreamableHttpClientTransportConfig::with_uri` in the teacher rather
/// than a derive-heavy builder crate.
pub struct TransportBuilder<F: Fetch> {
    fetch: F,
    config: TransportConfig,
    on_message: Option<MessageHandler>,
    on_error: Option<ErrorHandler<F::Error>>,
    on_close: Option<CloseHandler>,
}

impl<F: Fetch> TransportBuilder<F> {
    pub fn new(fetch: F, config: TransportConfig) -> Self {
        Self {
            fetch,
            config,
            on_message: None,
            on_error: None,
            on_close: None,
        }
    }

    pub fn on_message(mut self, handler: impl Fn(JsonRpcMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(handler));
        self
    }

    pub fn on_error(
        mut self,
        handler: impl Fn(TransportError<F::Error>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn on_close(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> StreamableHttpClientTransport<F> {
        let session = Arc::new(SessionSlot::new());
        let cancellation_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        let state = ActorState {
            fetch: self.fetch,
            config: self.config,
            session: session.clone(),
            on_message: self.on_message,
            on_error: self.on_error,
            on_close: self.on_close,
            cancellation_token: cancellation_token.clone(),
            spawn_tx,
        };
        tokio::spawn(state.run(command_rx, spawn_rx));
        StreamableHttpClientTransport {
            command_tx,
            session,
            cancellation_token,
            lifecycle: Arc::new(Mutex::new(Lifecycle::NotStarted)),
        }
    }
}

/// The public handle (spec §4.1): `start`/`send`/`terminate_session`/
/// `close`, plus `session_id()` for diagnostics (restored from the
/// TypeScript original's `sessionId` getter — dropped by the distillation,
/// not excluded by any Non-goal) and `open_standalone_stream` (the
/// resumption-token entry point exercised directly by scenario 5).
pub struct StreamableHttpClientTransport<F: Fetch> {
    command_tx: mpsc::UnboundedSender<Command<F>>,
    session: Arc<SessionSlot>,
    cancellation_token: CancellationToken,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl<F: Fetch> Clone for StreamableHttpClientTransport<F> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            session: self.session.clone(),
            cancellation_token: self.cancellation_token.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<F: Fetch> StreamableHttpClientTransport<F> {
    pub fn session_id(&self) -> Option<String> {
        self.session.get()
    }

    /// Marks the transport started. Opens no network connection itself.
    /// Fails if already started, or after `close()` — per the explicit
    /// failure condition in spec §4.1 (read as authoritative over the
    /// same sentence's looser "idempotent" description; see DESIGN.md).
    pub fn start(&self) -> Result<(), TransportError<F::Error>> {
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
        match *lifecycle {
            Lifecycle::NotStarted => {
                *lifecycle = Lifecycle::Started;
                Ok(())
            }
            Lifecycle::Started | Lifecycle::Closed => Err(TransportError::AlreadyStarted),
        }
    }

    fn ensure_not_closed(&self) -> Result<(), TransportError<F::Error>> {
        let lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
        if *lifecycle == Lifecycle::Closed {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Transmits one message or a batch (spec §4.1). Resolves once the
    /// response has been classified, not once any resulting stream
    /// completes.
    pub async fn send(
        &self,
        payload: impl Into<OutboundPayload>,
    ) -> Result<(), TransportError<F::Error>> {
        self.ensure_not_closed()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send {
                payload: payload.into(),
                reply: reply_tx,
            })
            .map_err(|_| TransportError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }

    /// Opens the standalone listening stream, optionally resuming from a
    /// previously observed event id. Directly callable (scenario 5), and
    /// also invoked internally once an `initialize` send captures a
    /// session id.
    pub async fn open_standalone_stream(
        &self,
        last_event_id: Option<String>,
    ) -> Result<(), TransportError<F::Error>> {
        self.ensure_not_closed()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::OpenStandaloneStream {
                last_event_id,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }

    /// If no session id is set, resolves immediately. Otherwise issues
    /// DELETE; 2xx or 405 both clear the session id (spec §8 invariant 6
    /// is read as authoritative here; see DESIGN.md).
    pub async fn terminate_session(&self) -> Result<(), TransportError<F::Error>> {
        self.ensure_not_closed()?;
        if self.session.get().is_none() {
            return Ok(());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::TerminateSession { reply: reply_tx })
            .map_err(|_| TransportError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }

    /// Aborts all active streams, cancels pending reconnection timers, and
    /// marks the transport closed. Further operations fail with
    /// `ConnectionClosed`.
    pub fn close(&self) {
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
        if *lifecycle != Lifecycle::Closed {
            *lifecycle = Lifecycle::Closed;
            self.cancellation_token.cancel();
        }
    }
}

/// Owns every piece of mutable protocol state and runs as a single spawned
/// task. `Clone` so a fresh copy can be moved into each spawned stream
/// task, the same way the teacher's worker clones `self` into
/// `execute_sse_stream`.
#[derive(Clone)]
struct ActorState<F: Fetch> {
    fetch: F,
    config: TransportConfig,
    session: Arc<SessionSlot>,
    on_message: Option<MessageHandler>,
    on_error: Option<ErrorHandler<F::Error>>,
    on_close: Option<CloseHandler>,
    cancellation_token: CancellationToken,
    /// Lets any task holding a clone of the actor (a spawned command
    /// handler, an SSE reader) hand a future back to the actor loop to be
    /// tracked in its `JoinSet`, without needing a borrow of `streams`
    /// itself (§5: the actor is the only thing that ever touches the
    /// stream registry directly).
    spawn_tx: mpsc::UnboundedSender<SpawnedFuture>,
}

impl<F: Fetch> ActorState<F> {
    /// Hands a future to the actor loop to run as a tracked, independently
    /// cancellable task. Used for both new SSE stream readers and — so
    /// that `send`/`terminate_session`/`open_standalone_stream` never
    /// serialize against each other (spec §4.1, §5) — the command handlers
    /// themselves.
    fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let _ = self.spawn_tx.send(Box::pin(fut));
    }

    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Command<F>>,
        mut spawned: mpsc::UnboundedReceiver<SpawnedFuture>,
    ) {
        let mut streams: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    streams.shutdown().await;
                    if let Some(on_close) = &self.on_close {
                        on_close();
                    }
                    return;
                }
                maybe_command = commands.recv() => {
                    match maybe_command {
                        None => {
                            streams.shutdown().await;
                            return;
                        }
                        // Each command's HTTP round-trip is spawned as its
                        // own tracked task rather than awaited inline, so
                        // the loop stays free to accept the next command
                        // immediately — concurrent sends are independent
                        // (spec §4.1) and an in-flight one is aborted (and
                        // its reply channel dropped, rejecting the waiting
                        // caller with `ConnectionClosed`) the moment
                        // `close()` cancels the token.
                        Some(Command::Send { payload, reply }) => {
                            let actor = self.clone();
                            streams.spawn(async move {
                                let result = actor.handle_send(payload).await;
                                let _ = reply.send(result);
                            });
                        }
                        Some(Command::OpenStandaloneStream { last_event_id, reply }) => {
                            let actor = self.clone();
                            streams.spawn(async move {
                                let result = actor.handle_open_standalone_stream(last_event_id).await;
                                let _ = reply.send(result);
                            });
                        }
                        Some(Command::TerminateSession { reply }) => {
                            let actor = self.clone();
                            streams.spawn(async move {
                                let result = actor.handle_terminate_session().await;
                                let _ = reply.send(result);
                            });
                        }
                    }
                }
                maybe_spawn = spawned.recv() => {
                    if let Some(fut) = maybe_spawn {
                        streams.spawn(fut);
                    }
                }
                joined = streams.join_next(), if !streams.is_empty() => {
                    if let Some(Err(join_error)) = joined {
                        tracing::warn!("sse stream task failed to join: {join_error}");
                    }
                }
            }
        }
    }

    fn deliver(&self, message: JsonRpcMessage) {
        if let Some(on_message) = &self.on_message {
            on_message(message);
        }
    }

    fn report_error(&self, error: TransportError<F::Error>) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }

    /// Issues one HTTP exchange (spec §4.2), composing headers fresh every
    /// call (Invariant 4), and folds in the Auth Coordinator's retry-once
    /// rule (spec §4.5): a single silent-refresh retry on 401, never more.
    fn execute<'a>(
        &'a self,
        kind: RequestKind,
        body: Option<Vec<u8>>,
        last_event_id: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Classified<F::Error>, TransportError<F::Error>>> + Send + 'a>>
    {
        self.execute_inner(kind, body, last_event_id, false)
    }

    fn execute_inner<'a>(
        &'a self,
        kind: RequestKind,
        body: Option<Vec<u8>>,
        last_event_id: Option<&'a str>,
        retried: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Classified<F::Error>, TransportError<F::Error>>> + Send + 'a>>
    {
        Box::pin(async move {
            let custom_headers = self.config.request_init.snapshot_headers();
            let auth_token = self.config.cached_auth_token();
            let session_id = self.session.get();
            let composer = HeaderComposer {
                custom_headers: &custom_headers,
                session_id: session_id.as_deref(),
                auth_token: auth_token.as_deref(),
                last_event_id,
            };
            let headers = composer.compose(kind);
            let method = match kind {
                RequestKind::Post => http::Method::POST,
                RequestKind::Delete => http::Method::DELETE,
                RequestKind::Get => http::Method::GET,
            };
            let request = HttpRequest {
                method,
                url: self.config.endpoint.clone(),
                headers,
                body: body.clone(),
            };
            let response = self
                .fetch
                .execute(request)
                .await
                .map_err(TransportError::Client)?;
            let classified = classify_response(kind, response).await?;
            match classified {
                Classified::Unauthorized if !retried => {
                    self.handle_unauthorized().await?;
                    self.execute_inner(kind, body, last_event_id, true).await
                }
                // A second 401 on the retry is fatal for this send (spec
                // §4.5 point 2), regardless of whether the first refresh
                // appeared to succeed.
                Classified::Unauthorized => Err(TransportError::Unauthorized),
                other => Ok(other),
            }
        })
    }

    #[cfg(feature = "auth")]
    async fn handle_unauthorized(&self) -> Result<(), TransportError<F::Error>> {
        let Some(provider) = self.config.auth_provider.as_ref() else {
            return Err(TransportError::Unauthorized);
        };
        match provider.refresh().await {
            Ok(Some(tokens)) => {
                provider.save_tokens(tokens).await;
                Ok(())
            }
            Ok(None) => {
                provider.redirect_to_authorization();
                Err(TransportError::Unauthorized)
            }
            Err(e) => Err(TransportError::from(e)),
        }
    }

    #[cfg(not(feature = "auth"))]
    async fn handle_unauthorized(&self) -> Result<(), TransportError<F::Error>> {
        Err(TransportError::Unauthorized)
    }

    async fn handle_send(
        &self,
        payload: OutboundPayload,
    ) -> Result<(), TransportError<F::Error>> {
        let wants_initialize = payload.contains_initialize_request();
        let body = serde_json::to_vec(&payload)?;
        match self.execute(RequestKind::Post, Some(body), None).await? {
            Classified::Accepted => Ok(()),
            Classified::Json {
                messages,
                session_id,
            } => {
                if let Some(session_id) = session_id {
                    self.session.capture(session_id);
                }
                for message in messages {
                    self.deliver(message);
                }
                if wants_initialize && self.session.get().is_some() {
                    self.open_standalone_stream_best_effort(None).await;
                }
                Ok(())
            }
            Classified::Sse { body, session_id } => {
                if let Some(session_id) = session_id {
                    self.session.capture(session_id);
                }
                self.spawn(
                    self.clone()
                        .run_sse_stream(body, StreamKind::PerRequest, None),
                );
                if wants_initialize && self.session.get().is_some() {
                    self.open_standalone_stream_best_effort(None).await;
                }
                Ok(())
            }
            Classified::Unauthorized => {
                unreachable!("execute() resolves 401 before returning a classification")
            }
            Classified::ListeningStreamNotSupported | Classified::DeleteNotImplemented => {
                unreachable!("a POST response is never classified this way")
            }
        }
    }

    /// Used to auto-open the standalone stream right after a successful
    /// `initialize`: best-effort, any failure is reported via `onerror`
    /// rather than failing the `initialize` send itself.
    async fn open_standalone_stream_best_effort(&self, last_event_id: Option<String>) {
        match self
            .execute(RequestKind::Get, None, last_event_id.as_deref())
            .await
        {
            Ok(Classified::Sse { body, .. }) => {
                self.spawn(self.clone().run_sse_stream(
                    body,
                    StreamKind::Standalone,
                    last_event_id,
                ));
            }
            Ok(Classified::ListeningStreamNotSupported) => {
                tracing::debug!("server does not offer a standalone listening stream");
            }
            Ok(_) => {
                tracing::warn!("unexpected response opening the standalone stream");
            }
            Err(error) => {
                tracing::warn!("failed to open the standalone stream: {error}");
                self.report_error(error);
            }
        }
    }

    async fn handle_open_standalone_stream(
        &self,
        last_event_id: Option<String>,
    ) -> Result<(), TransportError<F::Error>> {
        match self
            .execute(RequestKind::Get, None, last_event_id.as_deref())
            .await?
        {
            Classified::Sse { body, .. } => {
                self.spawn(self.clone().run_sse_stream(
                    body,
                    StreamKind::Standalone,
                    last_event_id,
                ));
                Ok(())
            }
            // A 405 here is swallowed silently (Invariant 5); any other
            // response to a GET is likewise not treated as an error — the
            // caller learns nothing useful is happening, not that the
            // open itself failed.
            _ => Ok(()),
        }
    }

    async fn handle_terminate_session(&self) -> Result<(), TransportError<F::Error>> {
        match self.execute(RequestKind::Delete, None, None).await? {
            Classified::Accepted | Classified::DeleteNotImplemented => {
                self.session.clear();
                Ok(())
            }
            other => {
                // No other classification is reachable for a DELETE in
                // practice (see dispatcher::classify_response), but any
                // surprise response preserves the session id rather than
                // guessing.
                tracing::warn!("unexpected response terminating session");
                let _ = other;
                Ok(())
            }
        }
    }

    /// The SSE Stream Reader plus Resumption Manager for one stream (spec
    /// §4.3/§4.4). Consumes the body stream until clean EOF, cancellation,
    /// or an unresumable error.
    async fn run_sse_stream(
        self,
        body_stream: BodyStream<F::Error>,
        kind: StreamKind,
        initial_last_event_id: Option<String>,
    ) {
        let mut stream: BoxStream<'static, Result<Sse, SseError>> = decode_sse_stream(body_stream);
        let mut last_event_id = initial_last_event_id;
        let mut seen_first_event = false;
        let mut attempt = 0usize;
        let mut server_retry_hint: Option<Duration> = None;

        loop {
            let next = tokio::select! {
                _ = self.cancellation_token.cancelled() => return,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    // lastEventId is updated before delivery (Invariant 3/
                    // spec §4.3) so a failure right after delivery still
                    // replays from the correct point.
                    if let Some(id) = event.id.clone() {
                        last_event_id = Some(id);
                    }
                    if let Some(retry_ms) = event.retry {
                        server_retry_hint = Some(Duration::from_millis(retry_ms));
                    }
                    attempt = 0;
                    seen_first_event = true;
                    if let Some(data) = event.data {
                        match serde_json::from_str::<InboundPayload>(&data) {
                            Ok(payload) => {
                                for message in payload.into_messages() {
                                    self.deliver(message);
                                }
                            }
                            Err(parse_error) => {
                                tracing::warn!(
                                    "failed to parse sse event payload as json-rpc: {parse_error}"
                                );
                                self.report_error(TransportError::ParseError(parse_error));
                            }
                        }
                    }
                }
                Some(Err(stream_error)) => {
                    let resumable = kind == StreamKind::Standalone || seen_first_event;
                    if !resumable {
                        tracing::warn!(
                            "per-request stream closed before its first event ({stream_error}); not resuming"
                        );
                        return;
                    }
                    tracing::warn!("sse stream interrupted: {stream_error}");
                    match self
                        .reconnect(&mut attempt, last_event_id.clone(), server_retry_hint)
                        .await
                    {
                        Some(new_stream) => stream = new_stream,
                        None => {
                            self.report_error(TransportError::ReconnectExhausted);
                            return;
                        }
                    }
                }
                None => {
                    tracing::debug!("sse stream closed cleanly");
                    return;
                }
            }
        }
    }

    /// Retries opening the stream with exponential backoff (spec §4.4).
    /// Resets `attempt` to 0 on success; returns `None` once `max_retries`
    /// attempts are exhausted.
    async fn reconnect(
        &self,
        attempt: &mut usize,
        last_event_id: Option<String>,
        server_retry_hint: Option<Duration>,
    ) -> Option<BoxStream<'static, Result<Sse, SseError>>> {
        loop {
            let delay = self.config.reconnection_options.next_delay(*attempt)?;
            tracing::debug!(
                attempt = *attempt,
                ?delay,
                ?server_retry_hint,
                "reconnecting sse stream"
            );
            tokio::select! {
                _ = self.cancellation_token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            match self
                .execute(RequestKind::Get, None, last_event_id.as_deref())
                .await
            {
                Ok(Classified::Sse { body, .. }) => {
                    *attempt = 0;
                    return Some(decode_sse_stream(body));
                }
                Ok(Classified::ListeningStreamNotSupported) => return None,
                Ok(_) => {
                    tracing::warn!("unexpected response while reconnecting sse stream");
                    *attempt += 1;
                }
                Err(error) => {
                    tracing::warn!("sse reconnect attempt failed: {error}");
                    *attempt += 1;
                }
            }
        }
    }
}
