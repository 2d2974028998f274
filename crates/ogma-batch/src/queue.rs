//! Bounded-concurrency admission queues.
//!
//! Each queue is a dispatcher task draining an unbounded channel: units
//! are admitted strictly in submission order, each behind a semaphore
//! permit, so the concurrency ceiling is hard, never a target. Units may
//! complete out of order once the ceiling exceeds 1, and the queue never
//! reports unit-level failure; callers track outcomes through the batch
//! tracker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

type UnitFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A FIFO-admission queue with a hard concurrency ceiling.
pub struct WorkQueue {
    name: String,
    sender: mpsc::UnboundedSender<UnitFuture>,
    /// Pending + running units.
    size: Arc<AtomicUsize>,
}

impl WorkQueue {
    /// Create a queue and spawn its dispatcher.
    ///
    /// Must be called from within a tokio runtime. A ceiling of 0 is
    /// treated as 1.
    pub fn new(name: impl Into<String>, ceiling: usize) -> Self {
        let name = name.into();
        let ceiling = ceiling.max(1);
        let (sender, mut receiver) = mpsc::unbounded_channel::<UnitFuture>();
        let size = Arc::new(AtomicUsize::new(0));

        let semaphore = Arc::new(Semaphore::new(ceiling));
        let dispatcher_name = name.clone();
        let dispatcher_size = size.clone();
        tokio::spawn(async move {
            while let Some(unit) = receiver.recv().await {
                // Admission blocks here, preserving submission order
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let size = dispatcher_size.clone();
                tokio::spawn(async move {
                    unit.await;
                    size.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                });
            }
            debug!(queue = %dispatcher_name, "Queue dispatcher stopped");
        });

        debug!(queue = %name, ceiling, "Queue started");
        Self { name, sender, size }
    }

    /// Enqueue a unit of work. Fire-and-forget.
    pub fn enqueue<F>(&self, unit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.size.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Box::pin(unit)).is_err() {
            self.size.fetch_sub(1, Ordering::SeqCst);
            warn!(queue = %self.name, "Queue dispatcher gone, unit dropped");
        }
    }

    /// Pending plus running units.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Queue name, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The two independent schedulers of the system.
pub struct WorkQueues {
    /// Slow, contention-sensitive content processing. Ceiling 1.
    pub processing: WorkQueue,
    /// Graph indexing. Configurable ceiling.
    pub graph: WorkQueue,
}

/// Default ceiling for the graph-indexing queue.
pub const DEFAULT_GRAPH_CEILING: usize = 3;

impl WorkQueues {
    /// Create both queues.
    pub fn new(graph_ceiling: usize) -> Self {
        Self {
            processing: WorkQueue::new("processing", 1),
            graph: WorkQueue::new("graph", graph_ceiling),
        }
    }
}

impl Default for WorkQueues {
    fn default() -> Self {
        Self::new(DEFAULT_GRAPH_CEILING)
    }
}
