//! OperationQueue (C6): serializes mutating operations against the task
//! store so that a rapid burst of user input produces a sequence of
//! internally consistent snapshots (§4.6, §9 "serial FIFO, not a mutex").
//!
//! The queue is a single-consumer channel, not a lock: operations are
//! boxed closures enqueued in order and drained by one background task.
//! Failure of one operation never blocks the next. After a batch drains
//! (every operation that was ready at the time draining started), exactly
//! one "recompute" callback fires if any operation in the batch mutated
//! state — coalescing a burst of `addTask` calls into a single CPM run.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Whether an executed operation should trigger the coalesced
/// recomputation at the end of its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationEffect {
    /// The operation mutated scheduling-relevant state; a CPM run should
    /// follow once the current batch finishes draining.
    Mutating,
    /// The operation only touched view-only state (e.g. `_collapsed`) and
    /// never needs a recompute (§4.7 recomputation policy).
    ViewOnly,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue's consumer task has shut down; no further operations can
    /// be enqueued.
    #[error("operation queue is closed")]
    Closed,
}

type BoxedOp = Box<dyn FnOnce() -> OperationEffect + Send + 'static>;

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

struct QueueItem {
    op: BoxedOp,
    done: oneshot::Sender<()>,
}

/// A handle to the running queue. Cloning shares the same underlying
/// channel and consumer task.
#[derive(Clone)]
pub struct OperationQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl OperationQueue {
    /// Spawns the queue's consumer task on the current tokio runtime.
    /// `on_batch_drained` runs once per drained batch that contained at
    /// least one [`OperationEffect::Mutating`] operation — the coalesced
    /// recomputation trigger (§4.6).
    pub fn spawn<F>(mut on_batch_drained: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueItem>();
        tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                while let Ok(item) = rx.try_recv() {
                    batch.push(item);
                }
                debug!(batch_len = batch.len(), "draining operation batch");
                let mut any_mutating = false;
                let mut done_senders = Vec::with_capacity(batch.len());
                for item in batch {
                    let effect = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                        item.op,
                    )) {
                        Ok(effect) => effect,
                        Err(payload) => {
                            warn!(message = %panic_message(&payload), "operation panicked; batch continues");
                            OperationEffect::ViewOnly
                        }
                    };
                    trace!(?effect, "operation executed");
                    if effect == OperationEffect::Mutating {
                        any_mutating = true;
                    }
                    done_senders.push(item.done);
                }
                // Recompute runs before any caller is unblocked, so that by
                // the time `enqueue()` returns, a subscriber reading the
                // published snapshot sees the result of its own operation.
                if any_mutating {
                    on_batch_drained();
                } else {
                    trace!("batch drained with no mutating operations, recompute skipped");
                }
                for done in done_senders {
                    let _ = done.send(());
                }
            }
            warn!("operation queue consumer shut down");
        });
        Self { tx }
    }

    /// Enqueues `op` and waits for it to run. `op` returns its own
    /// [`OperationEffect`] — ordinary failures are caught and reported by
    /// the caller's own closure, not by the queue itself (§7 "mutation
    /// errors are caught at the queue boundary"). If `op` panics instead,
    /// the consumer task catches the unwind, logs it, treats the batch
    /// item as [`OperationEffect::ViewOnly`], and moves on to the next
    /// queued operation rather than taking the whole queue down with it.
    pub async fn enqueue<F>(&self, op: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> OperationEffect + Send + 'static,
    {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(QueueItem {
                op: Box::new(op),
                done,
            })
            .map_err(|_| QueueError::Closed)?;
        wait.await.map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn operations_run_in_enqueue_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let queue = OperationQueue::spawn(|| {});
        for i in 0..10 {
            let order = order.clone();
            queue
                .enqueue(move || {
                    order.lock().unwrap().push(i);
                    OperationEffect::ViewOnly
                })
                .await
                .unwrap();
        }
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn recompute_fires_once_per_mutating_batch() {
        let recomputes = Arc::new(AtomicUsize::new(0));
        let counter = recomputes.clone();
        let queue = OperationQueue::spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue
            .enqueue(|| OperationEffect::Mutating)
            .await
            .unwrap();
        queue
            .enqueue(|| OperationEffect::ViewOnly)
            .await
            .unwrap();
        assert_eq!(recomputes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn view_only_batch_never_triggers_recompute() {
        let recomputes = Arc::new(AtomicUsize::new(0));
        let counter = recomputes.clone();
        let queue = OperationQueue::spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue
            .enqueue(|| OperationEffect::ViewOnly)
            .await
            .unwrap();
        assert_eq!(recomputes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_panicking_operation_does_not_block_the_next() {
        let queue = OperationQueue::spawn(|| {});
        let panicking = queue
            .enqueue(|| -> OperationEffect { panic!("boom") })
            .await;
        assert!(panicking.is_ok(), "the panic is caught, not propagated");

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let next = queue
            .enqueue(move || {
                ran2.fetch_add(1, Ordering::SeqCst);
                OperationEffect::ViewOnly
            })
            .await;
        assert!(next.is_ok());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
