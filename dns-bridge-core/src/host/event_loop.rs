//! The host's single execution thread.
//!
//! Engine completions never run on engine threads: an attached context posts
//! them as tasks to a [`HostLoop`], and the host runs them when it pumps the
//! loop. A fault raised by a callback aborts the pump and is handed to the
//! caller, the host's top-level fault handler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dns_bridge_engine::{EventSink, Task};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::HostFault;

/// Loop state reachable from contexts and pending callbacks.
#[derive(Default)]
struct LoopShared {
    faults: Mutex<VecDeque<HostFault>>,
    pending: AtomicUsize,
}

/// Cheap handle to a [`HostLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    tx: UnboundedSender<Task>,
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    /// Sink an engine context attaches to.
    pub fn sink(&self) -> EventSink {
        EventSink::new(self.tx.clone())
    }

    /// Record a fault raised by a callback.
    pub fn report_fault(&self, fault: HostFault) {
        log::error!("Host callback raised a fault: {fault}");
        self.shared.faults.lock().push_back(fault);
    }

    pub fn take_fault(&self) -> Option<HostFault> {
        self.shared.faults.lock().pop_front()
    }

    /// Count one callback as pending until the guard drops.
    pub(crate) fn track(&self) -> PendingGuard {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        PendingGuard {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Keeps a callback counted as pending on its loop.
pub(crate) struct PendingGuard {
    shared: Arc<LoopShared>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Single-threaded task queue standing in for the host event loop.
pub struct HostLoop {
    rx: UnboundedReceiver<Task>,
    handle: LoopHandle,
}

impl HostLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            handle: LoopHandle {
                tx,
                shared: Arc::new(LoopShared::default()),
            },
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Callbacks issued on this loop that have not fired yet.
    pub fn pending(&self) -> usize {
        self.handle.shared.pending.load(Ordering::SeqCst)
    }

    fn run(&self, task: Task) -> Result<(), HostFault> {
        task();
        self.handle.take_fault().map_or(Ok(()), Err)
    }

    /// Run every task already queued, without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> Result<usize, HostFault> {
        if let Some(fault) = self.handle.take_fault() {
            return Err(fault);
        }
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            ran += 1;
            self.run(task)?;
        }
        Ok(ran)
    }

    /// Wait for the next task and run it.
    pub async fn turn(&mut self) -> Result<(), HostFault> {
        if let Some(fault) = self.handle.take_fault() {
            return Err(fault);
        }
        // The loop holds a sender itself, so the channel never closes.
        if let Some(task) = self.rx.recv().await {
            self.run(task)?;
        }
        Ok(())
    }

    /// Keep turning until no callback issued on this loop is pending.
    pub async fn run_until_idle(&mut self) -> Result<(), HostFault> {
        while self.pending() > 0 {
            self.turn().await?;
        }
        self.run_pending().map(|_| ())
    }
}

impl Default for HostLoop {
    fn default() -> Self {
        Self::new()
    }
}
