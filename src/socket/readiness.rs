//! Session readiness gate.
//!
//! Every connection attempt gets a fresh [`ReadinessGate`] tracking the
//! required handshake kinds. The gate owns the sending half of a one-shot
//! [`ReadinessSignal`]; it resolves once all kinds are satisfied, rejects on an
//! authorization or settings failure, and reports
//! [`ReadinessError::Abandoned`] if the gate is dropped first.

use crate::core::errors::ReadinessError;
use crate::core::traits::{IdentityStore, LOGINID_KEY, RESIDENCE_KEY};
use crate::core::types::{MessageKind, Request, Response};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{info, warn};

type Outcome = Result<(), ReadinessError>;

/// Cloneable future completing when one connection attempt's handshake settles.
///
/// Signals belong to a single attempt: fetch a new one after a reconnect.
/// Every waiter observes the same outcome, but waiters are woken in no
/// particular order.
#[derive(Clone)]
pub struct ReadinessSignal {
    inner: Shared<BoxFuture<'static, Outcome>>,
}

impl ReadinessSignal {
    fn new(rx: oneshot::Receiver<Outcome>) -> Self {
        let inner = rx
            .map(|received| received.unwrap_or(Err(ReadinessError::Abandoned)))
            .boxed()
            .shared();
        Self { inner }
    }

    /// Outcome if already settled, without waiting
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.clone().now_or_never()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.try_outcome(), Some(Ok(())))
    }
}

impl Future for ReadinessSignal {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for ReadinessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessSignal")
            .field("outcome", &self.try_outcome())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Resolved,
    Rejected,
}

/// What the session has to do after the gate looked at a response
#[derive(Debug, Default)]
pub struct Observation {
    /// Requests to send, in order
    pub follow_ups: Vec<Request>,
    /// `authorize` was accepted by this response
    pub authorized: bool,
    /// The gate moved to `Resolved` on this response
    pub resolved: bool,
}

pub struct ReadinessGate {
    flags: Vec<(MessageKind, bool)>,
    state: GateState,
    sender: Option<oneshot::Sender<Outcome>>,
    signal: ReadinessSignal,
}

impl ReadinessGate {
    pub fn new(required: &[MessageKind]) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            flags: required.iter().map(|kind| (kind.clone(), false)).collect(),
            state: GateState::Pending,
            sender: Some(tx),
            signal: ReadinessSignal::new(rx),
        }
    }

    pub fn signal(&self) -> ReadinessSignal {
        self.signal.clone()
    }

    pub const fn state(&self) -> GateState {
        self.state
    }

    pub fn is_satisfied(&self, kind: &MessageKind) -> bool {
        self.flags
            .iter()
            .any(|(required, satisfied)| required == kind && *satisfied)
    }

    /// Drop the signal's sender so waiters observe `Abandoned`
    pub fn abandon(&mut self) {
        self.sender = None;
    }

    /// Feed an inbound response through the handshake rules
    pub fn observe(&mut self, response: &Response, identity: &dyn IdentityStore) -> Observation {
        let mut observation = Observation::default();
        if self.state != GateState::Pending {
            return observation;
        }

        match &response.msg_type {
            MessageKind::Authorize => {
                if let Err(err) = check_authorize(response, identity) {
                    warn!(error = %err, "Authorization rejected, logging out");
                    observation
                        .follow_ups
                        .push(Request::new(MessageKind::Logout, 1));
                    self.reject(err);
                    return observation;
                }

                if let Some(loginid) = response.payload_str("loginid") {
                    identity.set(LOGINID_KEY, loginid);
                }
                observation.authorized = true;
                observation
                    .follow_ups
                    .push(Request::new(MessageKind::Balance, 1).subscribe());
                observation
                    .follow_ups
                    .push(Request::new(MessageKind::GetSettings, 1));
                self.satisfy(&MessageKind::Authorize);
            }
            MessageKind::GetSettings => {
                if let Some(error) = &response.error {
                    self.reject(ReadinessError::Settings(error.clone()));
                    return observation;
                }

                if let Some(country_code) = response
                    .payload_str("country_code")
                    .filter(|code| !code.is_empty())
                {
                    identity.set(RESIDENCE_KEY, country_code);
                    observation
                        .follow_ups
                        .push(Request::new(MessageKind::LandingCompany, country_code));
                }
                self.satisfy(&MessageKind::GetSettings);
            }
            kind @ (MessageKind::Balance | MessageKind::WebsiteStatus) => self.satisfy(kind),
            kind if response.error.is_none() && self.is_required(kind) => self.satisfy(kind),
            _ => return observation,
        }

        if self.flags.iter().all(|(_, satisfied)| *satisfied) {
            self.state = GateState::Resolved;
            if let Some(tx) = self.sender.take() {
                let _ = tx.send(Ok(()));
            }
            info!("Session ready");
            observation.resolved = true;
        }

        observation
    }

    fn is_required(&self, kind: &MessageKind) -> bool {
        self.flags.iter().any(|(required, _)| required == kind)
    }

    fn satisfy(&mut self, kind: &MessageKind) {
        if let Some((_, satisfied)) = self.flags.iter_mut().find(|(required, _)| required == kind) {
            *satisfied = true;
        }
    }

    fn reject(&mut self, err: ReadinessError) {
        self.state = GateState::Rejected;
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(Err(err));
        }
    }
}

fn check_authorize(response: &Response, identity: &dyn IdentityStore) -> Result<(), ReadinessError> {
    if let Some(error) = &response.error {
        return Err(ReadinessError::Authorization(error.clone()));
    }

    let actual = response.payload_str("loginid");
    let expected = identity.get(LOGINID_KEY);
    if actual.is_none() || actual != expected.as_deref() {
        return Err(ReadinessError::IdentityMismatch {
            expected,
            actual: actual.map(str::to_string),
        });
    }

    Ok(())
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("flags", &self.flags)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
