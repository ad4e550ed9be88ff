//! Shared-resource primitives backing channel access: a single-holder,
//! interruptible lock (`access_lock` in the spec) and a priority-preemptive
//! try-acquire gate (`priority_queue`).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::scheduler::{Handle, TaskId};

struct MutexInner {
    handle: Handle,
    holder: Option<TaskId>,
    waiters: VecDeque<TaskId>,
}

/// Single-holder mutual-exclusion resource. Waiting tasks are granted the
/// lock FIFO as holders release it. A wait on this resource is interruptible
/// only through the caller `select`-ing it against an interrupt signal, same
/// as a plain `timeout`.
#[derive(Clone)]
pub struct MutexResource(Rc<RefCell<MutexInner>>);

impl MutexResource {
    pub fn new(handle: Handle) -> Self {
        MutexResource(Rc::new(RefCell::new(MutexInner {
            handle,
            holder: None,
            waiters: VecDeque::new(),
        })))
    }

    pub fn request(&self, task: TaskId) -> MutexRequest {
        MutexRequest {
            res: self.clone(),
            task,
            queued: false,
        }
    }

    pub fn release(&self, task: TaskId) {
        let mut inner = self.0.borrow_mut();
        if inner.holder != Some(task) {
            return;
        }
        inner.holder = None;
        if let Some(next) = inner.waiters.pop_front() {
            inner.holder = Some(next);
            let handle = inner.handle.clone();
            drop(inner);
            handle.wake(next);
        }
    }

    pub fn holder(&self) -> Option<TaskId> {
        self.0.borrow().holder
    }
}

pub struct MutexRequest {
    res: MutexResource,
    task: TaskId,
    queued: bool,
}

impl Future for MutexRequest {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.res.0.borrow_mut();
        if inner.holder.is_none() {
            inner.holder = Some(self.task);
            return Poll::Ready(());
        }
        if inner.holder == Some(self.task) {
            return Poll::Ready(());
        }
        if !self.queued {
            inner.waiters.push_back(self.task);
            self.queued = true;
        }
        Poll::Pending
    }
}

struct PriorityInner {
    holder: Option<(TaskId, i64)>,
}

/// Single-capacity, priority-preemptive resource used for the instantaneous
/// contention tiebreak at the moment two stations reach for the channel at
/// the same virtual instant. `try_acquire` never suspends: the spec's
/// `request(priority) | timeout(0)` idiom is exactly "win now or treat as
/// preempted", so there is nothing to gain from modelling it as a `Future`
/// that could resolve later. A loser does not need to be told apart from an
/// evicted former holder — the spec resolves both the same way, by letting
/// the holder's own air-time collision check see the overlap (see the
/// preemption branch in `wifi_station`/`nru_station`), so eviction here is
/// pure bookkeeping and never delivers a cross-task interrupt.
#[derive(Clone)]
pub struct PriorityResource(Rc<RefCell<PriorityInner>>);

impl PriorityResource {
    pub fn new() -> Self {
        PriorityResource(Rc::new(RefCell::new(PriorityInner { holder: None })))
    }

    /// Attempt to win the resource for `task` at `priority`. Returns `true`
    /// if `task` now holds it (either it was free, or `task` preempted a
    /// strictly lower-priority holder); `false` if a holder of equal or
    /// higher priority already has it.
    pub fn try_acquire(&self, task: TaskId, priority: i64) -> bool {
        let mut inner = self.0.borrow_mut();
        match inner.holder {
            None => {
                inner.holder = Some((task, priority));
                true
            }
            Some((_, holder_priority)) if priority > holder_priority => {
                inner.holder = Some((task, priority));
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, task: TaskId) {
        let mut inner = self.0.borrow_mut();
        if inner.holder.map(|(t, _)| t) == Some(task) {
            inner.holder = None;
        }
    }
}

impl Default for PriorityResource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::Executor;
    use std::rc::Rc;

    #[test]
    fn mutex_grants_fifo_on_release() {
        let mut exec = Executor::new();
        let handle = exec.handle();
        let mutex = MutexResource::new(handle.clone());
        let order = Rc::new(RefCell::new(Vec::new()));

        let m1 = mutex.clone();
        let first_holder = Rc::new(RefCell::new(0usize));
        let first_holder2 = first_holder.clone();
        exec.spawn(move |id, _h| {
            *first_holder2.borrow_mut() = id;
            async move {
                m1.request(id).await;
            }
        });

        for i in 0..2 {
            let m = mutex.clone();
            let order2 = order.clone();
            exec.spawn(move |id, _h| async move {
                m.request(id).await;
                order2.borrow_mut().push((i, id));
            });
        }

        exec.run_until(0);
        let holder = *first_holder.borrow();
        mutex.release(holder);
        exec.run_until(0);

        assert_eq!(order.borrow().len(), 1);
    }

    #[test]
    fn priority_resource_preempts_lower_priority() {
        let gate = PriorityResource::new();
        assert!(gate.try_acquire(1, 10));
        assert!(!gate.try_acquire(2, 5));
        assert!(gate.try_acquire(3, 20));
        gate.release(3);
        assert!(gate.try_acquire(4, 1));
    }
}
