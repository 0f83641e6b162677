use crate::core::errors::SocketError;
use crate::core::types::Response;
use futures_util::Stream;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Where a matched response is delivered
#[derive(Debug)]
pub enum PendingReply {
    /// Deliver the first match, then forget the request
    Once(oneshot::Sender<Result<Response, SocketError>>),
    /// Deliver every match until the subscriber goes away
    Stream(mpsc::UnboundedSender<Response>),
}

impl PendingReply {
    /// Create a one-shot reply and the handle that awaits it
    pub fn once() -> (Self, ResponseHandle) {
        let (tx, rx) = oneshot::channel();
        (Self::Once(tx), ResponseHandle { rx })
    }

    /// Create a streaming reply and the subscription that yields it
    pub fn stream() -> (Self, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Stream(tx), Subscription { rx })
    }

    pub const fn is_subscription(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Hand a response to the waiting side. Returns `false` when nobody is
    /// listening any more.
    pub fn deliver(self, response: Response) -> bool {
        match self {
            Self::Once(tx) => tx.send(Ok(response)).is_ok(),
            Self::Stream(tx) => tx.send(response).is_ok(),
        }
    }

    fn fail(self, err: SocketError) {
        if let Self::Once(tx) = self {
            let _ = tx.send(Err(err));
        }
    }
}

/// Future resolving to the single response of a request
#[derive(Debug)]
pub struct ResponseHandle {
    rx: oneshot::Receiver<Result<Response, SocketError>>,
}

impl ResponseHandle {
    /// A handle that is already complete, used for cache hits
    pub fn ready(response: Response) -> Self {
        let (reply, handle) = PendingReply::once();
        reply.deliver(response);
        handle
    }
}

impl Future for ResponseHandle {
    type Output = Result<Response, SocketError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SocketError::ChannelClosed)))
    }
}

/// Stream of responses for a subscribed request
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Response>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Response> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Response> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug)]
struct PendingRequest {
    reply: PendingReply,
    /// Written to a live connection; only these are abandoned on close
    transmitted: bool,
}

/// Assigns request ids and routes responses back to their requesters
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    last_id: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pending reply under a fresh id. Ids start at 1 and only grow.
    pub fn register(&mut self, reply: PendingReply) -> u64 {
        self.last_id += 1;
        let id = self.last_id;
        self.pending.insert(
            id,
            PendingRequest {
                reply,
                transmitted: false,
            },
        );
        id
    }

    pub fn mark_transmitted(&mut self, id: u64) {
        if let Some(entry) = self.pending.get_mut(&id) {
            entry.transmitted = true;
        }
    }

    /// Deliver a response to its requester.
    ///
    /// Returns the response back when no pending request claims it, so the
    /// caller can forward it to the unsolicited handler.
    pub fn resolve(&mut self, response: Response) -> Option<Response> {
        let Some(id) = response.req_id else {
            return Some(response);
        };

        let Some(entry) = self.pending.remove(&id) else {
            return Some(response);
        };

        match entry.reply {
            PendingReply::Stream(tx) => {
                if tx.send(response).is_ok() {
                    self.pending.insert(
                        id,
                        PendingRequest {
                            reply: PendingReply::Stream(tx),
                            transmitted: entry.transmitted,
                        },
                    );
                } else {
                    debug!(req_id = id, "Subscriber dropped, forgetting subscription");
                }
            }
            reply @ PendingReply::Once(_) => {
                if !reply.deliver(response) {
                    debug!(req_id = id, "Requester dropped before its response arrived");
                }
            }
        }

        None
    }

    /// Forget one-shot requests that were written to a connection that has
    /// now closed. Their handles complete with
    /// [`SocketError::RequestAbandoned`]. Subscriptions and requests still
    /// waiting in the outgoing buffer are kept.
    pub fn abandon_in_flight(&mut self) -> usize {
        let abandoned: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.transmitted && !entry.reply.is_subscription())
            .map(|(id, _)| *id)
            .collect();

        for id in &abandoned {
            if let Some(entry) = self.pending.remove(id) {
                entry.reply.fail(SocketError::RequestAbandoned(*id));
            }
        }

        abandoned.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub const fn last_id(&self) -> u64 {
        self.last_id
    }
}
