//! The first-come-first-served line of tasks waiting for admission.

use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Waker};

use parking_lot::Mutex;

/// Auto-resetting wake signal of a single waiter.
#[derive(Debug, Default)]
struct Signal {
    /// Set by whoever wakes the waiter, cleared when the waiter observes it.
    notified: bool,
    /// Waker registered by the last poll of the waiter.
    waker: Option<Waker>,
}

/// A single task waiting in the line.
#[derive(Debug)]
pub(crate) struct Waiter {
    /// Arrival sequence number.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    id: u64,
    /// Volume this waiter is trying to get admitted.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    volume: u64,
    signal: Mutex<Signal>,
}

impl Waiter {
    /// Raise the signal and wake the waiter if it is suspended.
    ///
    /// Raising an already raised signal has no additional effect.
    fn notify(&self) {
        let waker = {
            let mut signal = self.signal.lock();
            signal.notified = true;
            signal.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Consume a raised signal, or register the waker in `cx` to be woken up
    /// when it is raised.
    pub(crate) fn poll_notified(&self, cx: &mut Context<'_>) -> bool {
        let mut signal = self.signal.lock();

        if signal.notified {
            signal.notified = false;
            return true;
        }

        match &signal.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => {
                signal.waker = Some(cx.waker().clone());
            }
        }

        false
    }
}

#[derive(Debug, Default)]
struct Queue {
    waiters: VecDeque<Arc<Waiter>>,
    next_id: u64,
}

/// Ordered line of waiters.
///
/// Only the head of the line is allowed to evaluate admission. Every other
/// waiter stays suspended until the waiter ahead of it leaves and passes the
/// baton by raising the new head's signal.
#[derive(Debug, Default)]
pub(crate) struct AdmissionLine {
    queue: Mutex<Queue>,
}

impl AdmissionLine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a new waiter to the back of the line.
    ///
    /// Returns the waiter and whether it is the only one in the line, in
    /// which case it is entitled to evaluate admission right away.
    pub(crate) fn enqueue(&self, volume: u64) -> (Arc<Waiter>, bool) {
        let mut queue = self.queue.lock();

        let id = queue.next_id;
        queue.next_id = queue.next_id.wrapping_add(1);

        let waiter = Arc::new(Waiter {
            id,
            volume,
            signal: Mutex::new(Signal::default()),
        });

        queue.waiters.push_back(waiter.clone());
        let sole = queue.waiters.len() == 1;
        trace!(id, volume, sole, len = queue.waiters.len(), "enqueue");
        (waiter, sole)
    }

    /// Remove `waiter` from the line.
    ///
    /// If it was the head, the new head (if any) is signaled so that it
    /// starts evaluating. Removing a waiter which is not in the line does
    /// nothing.
    pub(crate) fn remove(&self, waiter: &Arc<Waiter>) {
        let mut queue = self.queue.lock();

        let Some(index) = queue.waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) else {
            return;
        };

        queue.waiters.remove(index);
        trace!(id = waiter.id, index, len = queue.waiters.len(), "remove");

        if index == 0 {
            if let Some(head) = queue.waiters.front() {
                trace!(id = head.id, volume = head.volume, "pass baton");
                head.notify();
            }
        }
    }

    /// Signal the current head, if any, to re-check admission.
    pub(crate) fn notify_head(&self) {
        let queue = self.queue.lock();

        if let Some(head) = queue.waiters.front() {
            trace!(id = head.id, volume = head.volume, "notify head");
            head.notify();
        }
    }

    /// Test if `waiter` is currently at the head of the line.
    pub(crate) fn is_head(&self, waiter: &Arc<Waiter>) -> bool {
        let queue = self.queue.lock();

        queue
            .waiters
            .front()
            .map_or(false, |head| Arc::ptr_eq(head, waiter))
    }

    /// Number of waiters in the line.
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().waiters.len()
    }

    /// Test if nobody is waiting.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().waiters.is_empty()
    }
}
