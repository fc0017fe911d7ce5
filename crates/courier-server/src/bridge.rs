//! Hand-off between connection tasks and the simulation loop.
//!
//! Connection tasks `submit` a decoded request and wait on a oneshot for the
//! response. The simulation loop is the only consumer; it pulls submissions
//! in FIFO order and answers each before taking the next.

use std::net::SocketAddr;
use std::time::Duration;

use courier_protocol::{Request, Response};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("simulation loop is not accepting requests")]
    Closed,

    #[error("simulation loop dropped the reply")]
    Dropped,

    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// One pending request and the slot its response goes into.
#[derive(Debug)]
pub struct Submission {
    pub request: Request,
    pub origin: SocketAddr,
    reply: oneshot::Sender<Response>,
}

impl Submission {
    /// Deliver the response. Returns false when the submitter stopped
    /// waiting; the state change stands either way.
    pub fn respond(self, response: Response) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// Submitting side, cloned into every connection task.
#[derive(Debug, Clone)]
pub struct RequestBridge {
    tx: mpsc::Sender<Submission>,
    timeout: Duration,
}

/// Draining side, owned by the simulation loop.
#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::Receiver<Submission>,
}

pub fn channel(capacity: usize, timeout: Duration) -> (RequestBridge, BridgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RequestBridge { tx, timeout }, BridgeReceiver { rx })
}

impl RequestBridge {
    /// Queue a request and wait for its response.
    ///
    /// The timeout covers both waiting for queue space and waiting for the
    /// reply.
    pub async fn submit(
        &self,
        request: Request,
        origin: SocketAddr,
    ) -> Result<Response, BridgeError> {
        let (reply, reply_rx) = oneshot::channel();
        let submission = Submission {
            request,
            origin,
            reply,
        };

        let exchange = async {
            self.tx
                .send(submission)
                .await
                .map_err(|_| BridgeError::Closed)?;
            reply_rx.await.map_err(|_| BridgeError::Dropped)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| BridgeError::Timeout(self.timeout))?
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl BridgeReceiver {
    /// Next queued submission, without waiting.
    pub fn try_next(&mut self) -> Option<Submission> {
        self.rx.try_recv().ok()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn work(name: &str) -> Request {
        Request::RequestForTask { name: name.into() }
    }

    #[tokio::test]
    async fn test_submissions_drain_in_order() {
        let (bridge, mut rx) = channel(8, Duration::from_secs(1));

        let mut waiters = Vec::new();
        for name in ["a", "b", "c"] {
            let bridge = bridge.clone();
            waiters.push(tokio::spawn(async move {
                bridge.submit(work(name), origin()).await
            }));
            // Let each submission land before the next is spawned.
            while rx.pending() < waiters.len() {
                tokio::task::yield_now().await;
            }
        }

        let mut seen = Vec::new();
        while let Some(sub) = rx.try_next() {
            seen.push(sub.request.agent_name().to_string());
            assert!(sub.respond(Response::ok()));
        }
        assert_eq!(seen, vec!["a", "b", "c"]);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(Response::ok()));
        }
    }

    #[tokio::test]
    async fn test_submit_times_out_when_nobody_drains() {
        let (bridge, _rx) = channel(8, Duration::from_millis(50));
        let err = bridge.submit(work("a"), origin()).await.unwrap_err();
        assert_eq!(err, BridgeError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_submit_fails_when_receiver_gone() {
        let (bridge, rx) = channel(8, Duration::from_secs(1));
        drop(rx);
        assert_eq!(
            bridge.submit(work("a"), origin()).await,
            Err(BridgeError::Closed)
        );
    }

    #[tokio::test]
    async fn test_late_response_is_discarded() {
        let (bridge, mut rx) = channel(8, Duration::from_millis(20));
        let err = bridge.submit(work("a"), origin()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));

        let sub = rx.try_next().unwrap();
        assert!(!sub.respond(Response::ok()));
    }
}
