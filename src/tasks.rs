use crate::scene::Scene;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};

pub type MainThreadTask = Box<dyn FnOnce(&mut Scene) + Send + 'static>;

/// Handoff from background threads to the thread that owns the scene.
///
/// Closures run exactly once, in submission order per producer, during the
/// next `drain_once` on the owning thread.
pub struct MainThreadQueue {
    sender: Sender<MainThreadTask>,
    receiver: Receiver<MainThreadTask>,
    pending: Arc<AtomicUsize>,
    owner: ThreadId,
}

/// Cloneable producer side of the queue. Safe to move to any thread.
#[derive(Clone)]
pub struct TaskSender {
    sender: Sender<MainThreadTask>,
    pending: Arc<AtomicUsize>,
}

impl MainThreadQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver, pending: Arc::new(AtomicUsize::new(0)), owner: thread::current().id() }
    }

    pub fn sender(&self) -> TaskSender {
        TaskSender { sender: self.sender.clone(), pending: Arc::clone(&self.pending) }
    }

    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce(&mut Scene) + Send + 'static,
    {
        self.sender().submit(task);
    }

    /// Runs every closure already received when the drain starts. Closures
    /// submitted while the batch runs wait for the next drain.
    pub fn drain_once(&self, scene: &mut Scene) -> usize {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "main-thread tasks must be drained on the thread that created the queue"
        );
        let batch: Vec<MainThreadTask> = self.receiver.try_iter().collect();
        self.pending.fetch_sub(batch.len(), Ordering::AcqRel);
        let ran = batch.len();
        for task in batch {
            task(scene);
        }
        ran
    }

    /// Closures submitted but not yet run. Diagnostic only.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSender {
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce(&mut Scene) + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(Box::new(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            log::debug!(target: "tasks", "main-thread queue closed; dropping task");
        }
    }
}
