use crate::core::config::{MessageKindSets, SocketConfig};
use crate::core::errors::SocketError;
use crate::core::kernel::{JsonCodec, TungsteniteWs, WsConfig, WsSession};
use crate::core::traits::{IdentityStore, ResponseStore, SessionHooks};
use crate::core::types::{ConnectionState, Response};
use crate::socket::orchestrator::{ConnectionTask, SocketClient};
use crate::socket::session::{Collaborators, Session};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Builder for a [`SocketClient`] and its background connection task
pub struct SocketBuilder {
    config: SocketConfig,
    ws_config: WsConfig,
    kinds: MessageKindSets,
    collaborators: Collaborators,
}

impl SocketBuilder {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            ws_config: WsConfig::default(),
            kinds: MessageKindSets::default(),
            collaborators: Collaborators::default(),
        }
    }

    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    /// Override which kinds gate readiness and which are answered from cache
    pub fn with_kind_sets(mut self, kinds: MessageKindSets) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_identity_store(mut self, identity: Arc<dyn IdentityStore>) -> Self {
        self.collaborators.identity = identity;
        self
    }

    pub fn with_response_store(mut self, responses: Arc<dyn ResponseStore>) -> Self {
        self.collaborators.responses = responses;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.collaborators.hooks = hooks;
        self
    }

    /// Build over a real WebSocket transport.
    ///
    /// Must be called from within a tokio runtime. The first connection
    /// attempt starts immediately.
    pub fn build(self) -> Result<(SocketClient, mpsc::UnboundedReceiver<Response>), SocketError> {
        let ws_config = self.ws_config.clone();
        self.build_with_transport(move |url: &str| {
            TungsteniteWs::new(url.to_string(), JsonCodec).with_config(ws_config.clone())
        })
    }

    /// Build over transports produced by `factory`, one per connection attempt
    pub fn build_with_transport<T, F>(
        self,
        factory: F,
    ) -> Result<(SocketClient, mpsc::UnboundedReceiver<Response>), SocketError>
    where
        T: WsSession<JsonCodec> + 'static,
        F: FnMut(&str) -> T + Send + 'static,
    {
        self.config.validate()?;

        let url = self.config.socket_url();
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let mut session = Session::new(
            self.config.keep_alive_window(),
            self.kinds,
            self.collaborators,
            unsolicited_tx,
        );
        session.connect();

        let (state_tx, state_rx) = watch::channel(session.state());
        let client = SocketClient::new(
            command_tx,
            session.watch_readiness(),
            state_rx,
            session.cache().clone(),
            Arc::new(self.config),
        );

        info!(%url, "Starting socket task");
        let task = ConnectionTask::new(session, factory, url, self.ws_config, command_rx, state_tx);
        tokio::spawn(task.run());

        Ok((client, unsolicited_rx))
    }
}

impl Default for SocketBuilder {
    fn default() -> Self {
        Self::new(SocketConfig::default())
    }
}
