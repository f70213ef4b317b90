//! Serialized request queue with shared outcomes.
//!
//! Authenticated requests must not interleave: a request that observes a
//! missing token runs the challenge handshake, and a second request doing
//! the same concurrently would race it. The queue gives every request a
//! slot; a request first drives all earlier slots to completion, then its
//! own. Each slot's future runs at most once and its outcome is cached,
//! so a slot forced by a successor is not executed again when its own
//! caller reaches it.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::error::ClientError;
use crate::transport::HttpResponse;

type Outcome = Result<HttpResponse, ClientError>;
type Thunk = Pin<Box<dyn Future<Output = Outcome> + Send>>;

struct Slot {
    cell: OnceCell<Outcome>,
    thunk: Mutex<Option<Thunk>>,
    done: AtomicBool,
}

impl Slot {
    fn new(thunk: Thunk) -> Self {
        Self { cell: OnceCell::new(), thunk: Mutex::new(Some(thunk)), done: AtomicBool::new(false) }
    }

    /// Run the slot's future if it has not run yet; either way, return the
    /// (cached) outcome.
    async fn force(&self) -> Outcome {
        let outcome = self
            .cell
            .get_or_init(|| async {
                let thunk = {
                    let mut guard = self.thunk.lock().unwrap_or_else(PoisonError::into_inner);
                    guard.take()
                };
                match thunk {
                    Some(fut) => fut.await,
                    // The initializing future was cancelled after taking
                    // the thunk; the work is lost, not repeatable.
                    None => Err(ClientError::Internal {
                        reason: "request slot lost its work to a cancelled caller".to_string(),
                    }),
                }
            })
            .await;
        self.done.store(true, Ordering::Release);
        outcome.clone()
    }
}

/// FIFO queue that serializes request futures.
#[derive(Default)]
pub struct RequestQueue {
    slots: Mutex<VecDeque<Arc<Slot>>>,
}

impl RequestQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `request` and drive it to completion in FIFO order.
    ///
    /// Earlier slots are completed first (their outcomes discarded here;
    /// their own callers receive them from the cache). A failure in an
    /// earlier slot does not fail this one.
    pub async fn run<F>(&self, request: F) -> Outcome
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let slot = Arc::new(Slot::new(Box::pin(request)));
        let predecessors: Vec<Arc<Slot>> = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let predecessors = slots.iter().cloned().collect();
            slots.push_back(Arc::clone(&slot));
            predecessors
        };

        for earlier in predecessors {
            let _ = earlier.force().await;
        }

        let outcome = slot.force().await;
        self.prune();
        outcome
    }

    /// Drop completed slots from the front.
    fn prune(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        while slots.front().is_some_and(|slot| slot.done.load(Ordering::Acquire)) {
            slots.pop_front();
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn response(body: &str) -> Outcome {
        Ok(HttpResponse { status: 200, body: body.to_string() })
    }

    #[tokio::test]
    async fn requests_complete_in_enqueue_order() {
        let queue = Arc::new(RequestQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let order = Arc::clone(&order);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                order.lock().unwrap().push("slow");
                response("slow")
            }
        };
        let fast = {
            let order = Arc::clone(&order);
            async move {
                order.lock().unwrap().push("fast");
                response("fast")
            }
        };

        let (a, b) = tokio::join!(queue.run(slow), queue.run(fast));
        assert_eq!(a.unwrap().body, "slow");
        assert_eq!(b.unwrap().body, "fast");
        assert_eq!(*order.lock().unwrap(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn each_request_runs_exactly_once() {
        let queue = Arc::new(RequestQueue::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let make = |body: &'static str| {
            let executions = Arc::clone(&executions);
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                response(body)
            }
        };

        // Later callers force earlier slots; the cache keeps the forced
        // slot from running a second time for its own caller.
        let (a, b, c) = tokio::join!(queue.run(make("a")), queue.run(make("b")), queue.run(make("c")));
        assert_eq!(a.unwrap().body, "a");
        assert_eq!(b.unwrap().body, "b");
        assert_eq!(c.unwrap().body, "c");
        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_does_not_poison_later_requests() {
        let queue = Arc::new(RequestQueue::new());

        let failing = async { Err(ClientError::NotAuthenticated) };
        let healthy = async { response("ok") };

        let (a, b) = tokio::join!(queue.run(failing), queue.run(healthy));
        assert_eq!(a.unwrap_err(), ClientError::NotAuthenticated);
        assert_eq!(b.unwrap().body, "ok");
    }

    #[tokio::test]
    async fn completed_slots_are_pruned() {
        let queue = RequestQueue::new();
        queue.run(async { response("one") }).await.unwrap();
        queue.run(async { response("two") }).await.unwrap();
        assert_eq!(queue.pending(), 0);
    }
}
