use crate::core::config::MessageKindSets;
use crate::core::traits::{IdentityStore, NoopHooks, ResponseStore, SessionHooks, TOKEN_KEY};
use crate::core::types::{ConnectionState, MessageKind, Request, Response};
use crate::socket::buffer::OutgoingBuffer;
use crate::socket::cache::ResponseCache;
use crate::socket::correlator::{PendingReply, RequestCorrelator, ResponseHandle, Subscription};
use crate::socket::keep_alive::KeepAlive;
use crate::socket::readiness::{GateState, ReadinessGate, ReadinessSignal};
use crate::utils::memory::{MemoryIdentityStore, MemoryResponseStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// External services the session reads from and reports to
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityStore>,
    pub responses: Arc<dyn ResponseStore>,
    pub hooks: Arc<dyn SessionHooks>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            identity: Arc::new(MemoryIdentityStore::new()),
            responses: Arc::new(MemoryResponseStore::new()),
            hooks: Arc::new(NoopHooks),
        }
    }
}

/// Connection-scoped state machine.
///
/// The session performs no I/O. It is fed transport events one at a time
/// (`on_open`, `on_response`, `on_close`, keep-alive expiry) plus outgoing
/// requests, and leaves the frames to write in an outbox that the owner drains
/// with [`Session::take_outbox`]. A `connect` request is likewise raised as a
/// flag for the owner to act on.
pub struct Session {
    state: ConnectionState,
    kinds: Arc<MessageKindSets>,
    identity: Arc<dyn IdentityStore>,
    hooks: Arc<dyn SessionHooks>,
    cache: ResponseCache,
    correlator: RequestCorrelator,
    gate: ReadinessGate,
    readiness: watch::Sender<ReadinessSignal>,
    buffer: OutgoingBuffer,
    keep_alive: KeepAlive,
    outbox: Vec<Request>,
    unsolicited: mpsc::UnboundedSender<Response>,
    connect_requested: bool,
}

impl Session {
    pub fn new(
        keep_alive_window: Duration,
        kinds: MessageKindSets,
        collaborators: Collaborators,
        unsolicited: mpsc::UnboundedSender<Response>,
    ) -> Self {
        let kinds = Arc::new(kinds);
        let gate = ReadinessGate::new(&kinds.required);
        let (readiness, _) = watch::channel(gate.signal());

        Self {
            state: ConnectionState::Closed,
            cache: ResponseCache::new(collaborators.responses, Arc::clone(&kinds)),
            kinds,
            identity: collaborators.identity,
            hooks: collaborators.hooks,
            correlator: RequestCorrelator::new(),
            gate,
            readiness,
            buffer: OutgoingBuffer::new(),
            keep_alive: KeepAlive::new(keep_alive_window),
            outbox: Vec::new(),
            unsolicited,
            connect_requested: false,
        }
    }

    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Readiness signal of the current connection attempt
    pub fn readiness(&self) -> ReadinessSignal {
        self.gate.signal()
    }

    /// Receiver that always holds the latest attempt's readiness signal
    pub fn watch_readiness(&self) -> watch::Receiver<ReadinessSignal> {
        self.readiness.subscribe()
    }

    pub const fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn is_satisfied(&self, kind: &MessageKind) -> bool {
        self.gate.is_satisfied(kind)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    pub const fn keep_alive_deadline(&self) -> Option<Instant> {
        self.keep_alive.deadline()
    }

    /// Start a new connection attempt if the channel is closed.
    ///
    /// Readiness is reset here, before the transport exists, so flags from a
    /// previous attempt never reach the new one. Returns `false` when an
    /// attempt is already underway or the channel is open.
    pub fn connect(&mut self) -> bool {
        if self.state != ConnectionState::Closed {
            return false;
        }

        self.state = ConnectionState::Connecting;
        self.gate = ReadinessGate::new(&self.kinds.required);
        self.readiness.send_replace(self.gate.signal());
        self.connect_requested = true;
        debug!("Connection attempt requested");
        true
    }

    /// Consume the pending connect request, if any
    pub fn take_connect_request(&mut self) -> bool {
        std::mem::take(&mut self.connect_requested)
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        info!(buffered = self.buffer.len(), "Connection open, starting handshake");

        if let Some(token) = self.identity.get(TOKEN_KEY).filter(|token| !token.is_empty()) {
            self.send(Request::new(MessageKind::Authorize, token));
        }
        self.send(Request::new(MessageKind::WebsiteStatus, 1));
    }

    /// Transport closed, or a connection attempt failed for good
    pub fn on_close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.state = ConnectionState::Closed;
        self.keep_alive.cancel();
        self.gate.abandon();
        self.outbox.clear();
        let abandoned = self.correlator.abandon_in_flight();
        info!(
            abandoned,
            buffered = self.buffer.len(),
            "Connection closed"
        );
    }

    pub fn on_response(&mut self, response: Response, now: Instant) {
        self.keep_alive.reset(now);
        self.cache.store(&response);

        debug!(msg_type = %response.msg_type, req_id = ?response.req_id, "Received frame");

        if response.msg_type == MessageKind::Logout {
            self.hooks.on_logout(&response);
        }

        let observation = self.gate.observe(&response, self.identity.as_ref());
        if observation.authorized {
            self.hooks.on_authorized(&response);
        }

        if let Some(unclaimed) = self.correlator.resolve(response) {
            if self.unsolicited.send(unclaimed).is_err() {
                debug!("No unsolicited-message receiver, dropping frame");
            }
        }

        for follow_up in observation.follow_ups {
            self.send(follow_up);
        }

        if observation.resolved {
            self.flush_buffer();
            self.hooks.on_ready();
        }
    }

    /// Send the keep-alive frame if the idle window has run out
    pub fn poll_keep_alive(&mut self, now: Instant) -> bool {
        if self.state != ConnectionState::Open || !self.keep_alive.poll_expired(now) {
            return false;
        }

        debug!(window = ?self.keep_alive.window(), "Idle window elapsed, sending keep-alive");
        self.send(Request::new(MessageKind::Ping, 1));
        true
    }

    /// Fire-and-forget send
    pub fn send(&mut self, request: Request) {
        self.dispatch(request, None);
    }

    /// Send expecting a single response
    pub fn request(&mut self, request: Request) -> ResponseHandle {
        let (reply, handle) = PendingReply::once();
        self.dispatch(request, Some(reply));
        handle
    }

    /// Send expecting a stream of responses
    pub fn subscribe(&mut self, request: Request) -> Subscription {
        let (reply, subscription) = PendingReply::stream();
        self.dispatch(request, Some(reply));
        subscription
    }

    /// Route a request through the cache, the correlator and the channel.
    ///
    /// A reply-bearing request whose kind has a cached response is answered
    /// on the spot and nothing is transmitted. Returns the id assigned to the
    /// request, if one was.
    pub fn dispatch(&mut self, mut request: Request, reply: Option<PendingReply>) -> Option<u64> {
        let mut req_id = None;

        if let Some(reply) = reply {
            if let Some(cached) = self.cache.lookup(&request) {
                debug!(kind = %request.kind(), "Answered from cache");
                reply.deliver(cached);
                return None;
            }

            let id = self.correlator.register(reply);
            request.set_req_id(id);
            req_id = Some(id);
        }

        self.transmit(request);
        req_id
    }

    /// Frames to write to the transport, oldest first
    pub fn take_outbox(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.outbox)
    }

    fn transmit(&mut self, request: Request) {
        match self.state {
            ConnectionState::Open => {
                if let Some(id) = request.req_id() {
                    self.correlator.mark_transmitted(id);
                }
                self.outbox.push(request);
            }
            ConnectionState::Connecting => self.buffer.enqueue(request),
            ConnectionState::Closed => {
                self.buffer.enqueue(request);
                self.connect();
            }
        }
    }

    fn flush_buffer(&mut self) {
        let drained = self.buffer.drain();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Flushing buffered requests");
        }
        for request in drained {
            self.transmit(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ReadinessError;
    use crate::core::traits::LOGINID_KEY;
    use futures_util::FutureExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHooks {
        authorized: AtomicUsize,
        logouts: AtomicUsize,
        ready: AtomicUsize,
    }

    impl SessionHooks for CountingHooks {
        fn on_authorized(&self, _response: &Response) {
            self.authorized.fetch_add(1, Ordering::SeqCst);
        }

        fn on_logout(&self, _response: &Response) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_ready(&self) {
            self.ready.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        session: Session,
        hooks: Arc<CountingHooks>,
        identity: Arc<MemoryIdentityStore>,
        unsolicited: mpsc::UnboundedReceiver<Response>,
    }

    fn harness(identity: MemoryIdentityStore) -> Harness {
        let identity = Arc::new(identity);
        let hooks = Arc::new(CountingHooks::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let collaborators = Collaborators {
            identity: identity.clone(),
            responses: Arc::new(MemoryResponseStore::new()),
            hooks: hooks.clone(),
        };
        let session = Session::new(
            Duration::from_secs(60),
            MessageKindSets::default(),
            collaborators,
            tx,
        );
        Harness {
            session,
            hooks,
            identity,
            unsolicited: rx,
        }
    }

    fn logged_in() -> Harness {
        harness(MemoryIdentityStore::with_session("CR123", "CR123"))
    }

    fn frame(value: Value) -> Response {
        serde_json::from_value(value).unwrap()
    }

    fn bodies(requests: &[Request]) -> Vec<Value> {
        requests
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect()
    }

    fn open(session: &mut Session) -> Vec<Request> {
        session.connect();
        assert!(session.take_connect_request());
        session.on_open();
        session.take_outbox()
    }

    fn complete_handshake(session: &mut Session) {
        let now = Instant::now();
        session.on_response(
            frame(json!({"msg_type": "authorize", "authorize": {"loginid": "CR123"}})),
            now,
        );
        session.on_response(frame(json!({"msg_type": "balance", "balance": {}})), now);
        session.on_response(frame(json!({"msg_type": "get_settings", "get_settings": {}})), now);
        session.on_response(frame(json!({"msg_type": "website_status", "website_status": {}})), now);
    }

    #[test]
    fn test_open_sends_authorize_and_website_status() {
        let mut h = logged_in();
        let sent = open(&mut h.session);
        assert_eq!(
            bodies(&sent),
            vec![json!({"authorize": "CR123"}), json!({"website_status": 1})]
        );
    }

    #[test]
    fn test_open_without_token_skips_authorize() {
        let mut h = harness(MemoryIdentityStore::new());
        let sent = open(&mut h.session);
        assert_eq!(bodies(&sent), vec![json!({"website_status": 1})]);
    }

    #[test]
    fn test_open_with_empty_token_skips_authorize() {
        let identity = MemoryIdentityStore::new();
        identity.set(TOKEN_KEY, "");
        let mut h = harness(identity);
        let sent = open(&mut h.session);
        assert_eq!(bodies(&sent), vec![json!({"website_status": 1})]);
    }

    #[test]
    fn test_authorize_match_requests_balance_and_settings() {
        let mut h = logged_in();
        open(&mut h.session);

        h.session.on_response(
            frame(json!({"msg_type": "authorize", "req_id": 1, "authorize": {"loginid": "CR123"}})),
            Instant::now(),
        );

        assert_eq!(
            bodies(&h.session.take_outbox()),
            vec![json!({"balance": 1, "subscribe": 1}), json!({"get_settings": 1})]
        );
        assert!(h.session.is_satisfied(&MessageKind::Authorize));
        assert!(h.session.readiness().try_outcome().is_none());
        assert_eq!(h.hooks.authorized.load(Ordering::SeqCst), 1);
        // req_id 1 has no pending request, so the frame is unsolicited
        assert!(h.unsolicited.try_recv().is_ok());
    }

    #[test]
    fn test_authorize_mismatch_logs_out_and_rejects() {
        let mut h = logged_in();
        open(&mut h.session);
        let signal = h.session.readiness();

        h.session.on_response(
            frame(json!({"msg_type": "authorize", "authorize": {"loginid": "CR999"}})),
            Instant::now(),
        );

        assert_eq!(bodies(&h.session.take_outbox()), vec![json!({"logout": 1})]);
        assert!(matches!(
            signal.try_outcome(),
            Some(Err(ReadinessError::IdentityMismatch { .. }))
        ));

        h.session.on_response(frame(json!({"msg_type": "logout", "logout": 1})), Instant::now());
        assert_eq!(h.hooks.logouts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_fires_once() {
        let mut h = logged_in();
        open(&mut h.session);
        complete_handshake(&mut h.session);

        assert!(h.session.readiness().is_ready());
        assert_eq!(h.session.gate_state(), GateState::Resolved);
        assert_eq!(h.hooks.ready.load(Ordering::SeqCst), 1);

        h.session.on_response(frame(json!({"msg_type": "website_status"})), Instant::now());
        h.session.on_response(frame(json!({"msg_type": "balance"})), Instant::now());
        assert_eq!(h.hooks.ready.load(Ordering::SeqCst), 1);
        assert_eq!(h.identity.get(LOGINID_KEY).as_deref(), Some("CR123"));
    }

    #[test]
    fn test_cache_hit_skips_transmission() {
        let mut h = logged_in();
        open(&mut h.session);
        h.session.take_outbox();
        h.session.on_response(
            frame(json!({"msg_type": "get_account_status", "get_account_status": {"status": []}})),
            Instant::now(),
        );
        h.session.take_outbox();

        let handle = h
            .session
            .request(Request::new(MessageKind::GetAccountStatus, 1));
        let cached = handle.now_or_never().unwrap().unwrap();

        assert_eq!(cached.msg_type, MessageKind::GetAccountStatus);
        assert!(h.session.take_outbox().is_empty());
        assert_eq!(h.session.pending_requests(), 0);
    }

    #[test]
    fn test_uncacheable_kind_always_transmits() {
        let mut h = logged_in();
        open(&mut h.session);
        h.session.take_outbox();
        let login_list = MessageKind::Other("login_list".to_string());
        h.session
            .on_response(frame(json!({"msg_type": "login_list", "login_list": []})), Instant::now());

        let first = h.session.request(Request::new(login_list.clone(), 1));
        let second = h.session.request(Request::new(login_list, 1));
        let sent = h.session.take_outbox();

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].req_id(), Some(1));
        assert_eq!(sent[1].req_id(), Some(2));
        drop((first, second));
    }

    #[test]
    fn test_send_while_closed_buffers_and_connects_once() {
        let mut h = logged_in();

        h.session.send(Request::new(MessageKind::from("statement"), 1));
        h.session.send(Request::new(MessageKind::from("portfolio"), 1));

        assert_eq!(h.session.state(), ConnectionState::Connecting);
        assert!(h.session.take_connect_request());
        assert!(!h.session.take_connect_request());
        assert!(!h.session.connect());
        assert_eq!(h.session.buffered(), 2);
    }

    #[test]
    fn test_buffer_flushes_in_order_after_ready() {
        let mut h = logged_in();
        h.session.send(Request::new(MessageKind::from("statement"), 1));
        let handle = h.session.request(Request::new(MessageKind::from("portfolio"), 1));
        h.session.send(Request::new(MessageKind::from("profit_table"), 1));

        h.session.take_connect_request();
        h.session.on_open();
        h.session.take_outbox();
        assert_eq!(h.session.buffered(), 3);

        let now = Instant::now();
        h.session.on_response(
            frame(json!({"msg_type": "authorize", "authorize": {"loginid": "CR123"}})),
            now,
        );
        h.session.on_response(frame(json!({"msg_type": "balance"})), now);
        h.session.on_response(frame(json!({"msg_type": "get_settings", "get_settings": {}})), now);
        assert_eq!(h.session.buffered(), 3);
        h.session.take_outbox();

        h.session.on_response(frame(json!({"msg_type": "website_status"})), now);
        let kinds: Vec<String> = h
            .session
            .take_outbox()
            .iter()
            .map(|r| r.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["statement", "portfolio", "profit_table"]);
        assert_eq!(h.session.buffered(), 0);
        drop(handle);
    }

    #[test]
    fn test_reconnect_resets_readiness() {
        let mut h = logged_in();
        open(&mut h.session);
        complete_handshake(&mut h.session);
        let first = h.session.readiness();
        assert!(first.is_ready());

        h.session.on_close();
        h.session.send(Request::new(MessageKind::Ping, 1));

        let second = h.session.readiness();
        assert!(second.try_outcome().is_none());
        assert_eq!(h.session.gate_state(), GateState::Pending);
        assert!(!h.session.is_satisfied(&MessageKind::Authorize));
        assert!(first.is_ready());
        assert!(h.session.watch_readiness().borrow().try_outcome().is_none());
    }

    #[test]
    fn test_close_abandons_unsettled_signal_and_in_flight_requests() {
        let mut h = logged_in();
        open(&mut h.session);
        let signal = h.session.readiness();
        let in_flight = h.session.request(Request::new(MessageKind::from("statement"), 1));
        let mut subscription = h
            .session
            .subscribe(Request::new(MessageKind::from("ticks"), "R_100"));

        h.session.on_close();

        assert_eq!(signal.try_outcome(), Some(Err(ReadinessError::Abandoned)));
        assert!(in_flight.now_or_never().unwrap().is_err());
        assert_eq!(h.session.pending_requests(), 1);
        assert!(subscription.try_recv().is_none());
        assert!(h.session.keep_alive_deadline().is_none());
    }

    #[test]
    fn test_subscription_receives_every_match() {
        let mut h = logged_in();
        open(&mut h.session);
        let mut subscription = h
            .session
            .subscribe(Request::new(MessageKind::from("ticks"), "R_100"));
        let id = h.session.take_outbox().last().and_then(|r| r.req_id()).unwrap();

        for quote in 0..3 {
            h.session.on_response(
                frame(json!({"msg_type": "tick", "req_id": id, "tick": {"quote": quote}})),
                Instant::now(),
            );
        }

        let mut received = 0;
        while subscription.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[test]
    fn test_keep_alive_sends_one_ping_per_idle_window() {
        let mut h = logged_in();
        open(&mut h.session);
        let start = Instant::now();
        h.session.on_response(frame(json!({"msg_type": "website_status"})), start);
        h.session.take_outbox();

        assert!(!h.session.poll_keep_alive(start + Duration::from_secs(59)));
        assert!(h.session.poll_keep_alive(start + Duration::from_secs(60)));
        assert!(!h.session.poll_keep_alive(start + Duration::from_secs(180)));
        assert_eq!(bodies(&h.session.take_outbox()), vec![json!({"ping": 1})]);
    }

    #[test]
    fn test_settings_country_code_requests_landing_company() {
        let mut h = logged_in();
        open(&mut h.session);
        h.session.take_outbox();

        h.session.on_response(
            frame(json!({"msg_type": "get_settings", "get_settings": {"country_code": "id"}})),
            Instant::now(),
        );

        assert_eq!(
            bodies(&h.session.take_outbox()),
            vec![json!({"landing_company": "id"})]
        );
    }
}
