use crate::core::config::SocketConfig;
use crate::core::errors::{ReadinessError, SocketError};
use crate::core::kernel::{JsonCodec, WsConfig, WsSession};
use crate::core::types::{ConnectionState, Request, Response};
use crate::socket::builder::SocketBuilder;
use crate::socket::cache::ResponseCache;
use crate::socket::correlator::{PendingReply, ResponseHandle, Subscription};
use crate::socket::readiness::ReadinessSignal;
use crate::socket::session::Session;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Messages from client handles to the connection task
#[derive(Debug)]
pub(crate) enum Command {
    Send {
        request: Request,
        reply: Option<PendingReply>,
    },
    Shutdown,
}

enum Event {
    Command(Option<Command>),
    Frame(Option<Result<Response, SocketError>>),
    KeepAliveExpired,
}

/// Owns the session and the live transport.
///
/// Every transport event, client command and timer expiry is handled one at a
/// time on this task, so the session never sees concurrent access.
pub(crate) struct ConnectionTask<T, F> {
    session: Session,
    transport: Option<T>,
    factory: F,
    url: String,
    ws_config: WsConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
}

impl<T, F> ConnectionTask<T, F>
where
    T: WsSession<JsonCodec> + 'static,
    F: FnMut(&str) -> T + Send + 'static,
{
    pub(crate) fn new(
        session: Session,
        factory: F,
        url: String,
        ws_config: WsConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            session,
            transport: None,
            factory,
            url,
            ws_config,
            commands,
            state,
        }
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub(crate) async fn run(mut self) {
        loop {
            if self.session.take_connect_request() {
                self.publish_state();
                if !self.open_connection().await {
                    self.publish_state();
                    info!("Socket task stopped while connecting");
                    return;
                }
            }
            self.transmit_outbox().await;
            self.publish_state();

            let deadline = self.session.keep_alive_deadline();
            let event = tokio::select! {
                command = self.commands.recv() => Event::Command(command),
                frame = next_frame(&mut self.transport) => Event::Frame(frame),
                () = idle_until(deadline) => Event::KeepAliveExpired,
            };

            match event {
                Event::Command(Some(Command::Send { request, reply })) => {
                    self.session.dispatch(request, reply);
                }
                Event::Command(Some(Command::Shutdown) | None) => {
                    self.disconnect().await;
                    self.publish_state();
                    info!("Socket task stopped");
                    return;
                }
                Event::Frame(Some(Ok(response))) => {
                    self.session.on_response(response, Instant::now());
                }
                Event::Frame(Some(Err(SocketError::MalformedFrame(detail)))) => {
                    warn!(%detail, "Dropping malformed frame");
                }
                Event::Frame(Some(Err(e))) => {
                    warn!(error = %e, "Connection lost");
                    self.disconnect().await;
                }
                Event::Frame(None) => {
                    info!("Connection closed by server");
                    self.disconnect().await;
                }
                Event::KeepAliveExpired => {
                    self.session.poll_keep_alive(Instant::now());
                }
            }
        }
    }

    /// Build a fresh transport and try to open it, retrying with backoff.
    ///
    /// Commands keep flowing while connecting, so requests made meanwhile are
    /// buffered. Exhausting the attempts closes the session and the next send
    /// retries. Returns `false` if a shutdown arrived first.
    async fn open_connection(&mut self) -> bool {
        let mut transport = (self.factory)(&self.url);
        let mut delays = self.ws_config.retry_delays();
        let mut attempt = 1;

        loop {
            let connecting = transport.connect();
            let Some(result) =
                accepting_commands(&mut self.commands, &mut self.session, connecting).await
            else {
                self.session.on_close();
                return false;
            };

            match result {
                Ok(()) => {
                    info!(attempt, "Connected");
                    self.transport = Some(transport);
                    self.session.on_open();
                    return true;
                }
                Err(e) => match delays.next() {
                    Some(delay) => {
                        warn!(attempt, error = %e, ?delay, "Connection attempt failed, retrying");
                        let backoff = tokio::time::sleep(delay);
                        if accepting_commands(&mut self.commands, &mut self.session, backoff)
                            .await
                            .is_none()
                        {
                            self.session.on_close();
                            return false;
                        }
                        attempt += 1;
                    }
                    None => {
                        error!(attempt, error = %e, "Giving up until the next send");
                        self.session.on_close();
                        return true;
                    }
                },
            }
        }
    }

    async fn transmit_outbox(&mut self) {
        let frames = self.session.take_outbox();
        if frames.is_empty() {
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            warn!(dropped = frames.len(), "No open transport for outgoing frames");
            return;
        };

        let mut failure = None;
        for request in &frames {
            debug!(kind = %request.kind(), req_id = ?request.req_id(), "Sending frame");
            if let Err(e) = transport.send_message(request).await {
                failure = Some(e);
                break;
            }
        }

        if let Some(e) = failure {
            warn!(error = %e, "Send failed, dropping connection");
            self.disconnect().await;
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "Error while closing transport");
            }
        }
        self.session.on_close();
    }

    fn publish_state(&self) {
        let current = self.session.state();
        self.state.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
    }
}

/// Drive `operation` to completion while still dispatching client commands.
///
/// Queued commands are taken first. Returns `None` when a shutdown arrives or
/// every client handle is gone.
async fn accepting_commands<Fut: Future>(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    session: &mut Session,
    operation: Fut,
) -> Option<Fut::Output> {
    tokio::pin!(operation);
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Send { request, reply }) => {
                    session.dispatch(request, reply);
                }
                Some(Command::Shutdown) | None => return None,
            },
            output = &mut operation => return Some(output),
        }
    }
}

async fn next_frame<T>(transport: &mut Option<T>) -> Option<Result<Response, SocketError>>
where
    T: WsSession<JsonCodec>,
{
    match transport {
        Some(transport) => transport.next_message().await,
        None => std::future::pending().await,
    }
}

async fn idle_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running socket session.
///
/// All clones talk to the same connection task. The task stops once
/// [`SocketClient::shutdown`] is called or every handle has been dropped.
#[derive(Debug, Clone)]
pub struct SocketClient {
    commands: mpsc::UnboundedSender<Command>,
    readiness: watch::Receiver<ReadinessSignal>,
    state: watch::Receiver<ConnectionState>,
    cache: ResponseCache,
    config: Arc<SocketConfig>,
}

impl SocketClient {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        readiness: watch::Receiver<ReadinessSignal>,
        state: watch::Receiver<ConnectionState>,
        cache: ResponseCache,
        config: Arc<SocketConfig>,
    ) -> Self {
        Self {
            commands,
            readiness,
            state,
            cache,
            config,
        }
    }

    /// Connect with default collaborators.
    ///
    /// Returns the client and the receiver for responses no request claimed.
    /// Dropping the receiver is fine; such responses are then discarded.
    pub fn init(
        config: SocketConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Response>), SocketError> {
        SocketBuilder::new(config).build()
    }

    /// Fire-and-forget send. Buffered while the connection is down.
    pub fn send(&self, request: Request) -> Result<(), SocketError> {
        self.command(Command::Send {
            request,
            reply: None,
        })
    }

    /// Send a request and get a handle to its response.
    ///
    /// Cacheable kinds with a cached response are answered immediately
    /// without touching the connection.
    pub fn request(&self, request: Request) -> Result<ResponseHandle, SocketError> {
        if let Some(cached) = self.cache.lookup(&request) {
            debug!(kind = %request.kind(), "Answered from cache");
            return Ok(ResponseHandle::ready(cached));
        }

        let (reply, handle) = PendingReply::once();
        self.command(Command::Send {
            request,
            reply: Some(reply),
        })?;
        Ok(handle)
    }

    /// Send a request whose every response is delivered to the returned stream
    pub fn subscribe(&self, request: Request) -> Result<Subscription, SocketError> {
        let (reply, subscription) = PendingReply::stream();
        if let Some(cached) = self.cache.lookup(&request) {
            debug!(kind = %request.kind(), "Answered from cache");
            reply.deliver(cached);
            return Ok(subscription);
        }

        self.command(Command::Send {
            request,
            reply: Some(reply),
        })?;
        Ok(subscription)
    }

    /// Readiness signal of the current connection attempt.
    ///
    /// A reconnect replaces the signal, so fetch it again rather than keeping
    /// an old one around.
    pub fn readiness(&self) -> ReadinessSignal {
        self.readiness.borrow().clone()
    }

    /// Wait for the current attempt's handshake to settle
    pub async fn ready(&self) -> Result<(), ReadinessError> {
        self.readiness().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn app_id(&self) -> &str {
        self.config.resolved_app_id()
    }

    pub fn server(&self) -> &str {
        self.config.server()
    }

    pub fn socket_url(&self) -> String {
        self.config.socket_url()
    }

    /// Close the connection and stop the task
    pub fn shutdown(&self) -> Result<(), SocketError> {
        self.command(Command::Shutdown)
    }

    fn command(&self, command: Command) -> Result<(), SocketError> {
        self.commands
            .send(command)
            .map_err(|_| SocketError::ChannelClosed)
    }
}
