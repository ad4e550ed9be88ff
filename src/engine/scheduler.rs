//! Deterministic virtual-time scheduler.
//!
//! `embassy-time` supplies `Duration`/`Instant` as plain value types elsewhere
//! in this crate; no `embassy_time_driver::Driver` is registered anywhere.
//! A registered driver ties virtual time to a background thread's real-time
//! passage (see the real-time-scaled driver this module replaces), and stays
//! race-free only because real time keeps a task's next deadline from being
//! requested before the clock has already advanced past it. A zero-delay
//! virtual clock has no such slack: jumping the clock ahead while a runnable
//! task has not yet registered its own (possibly earlier) deadline would
//! silently reorder events. This scheduler avoids that by running every task
//! to a fixed point on a single thread before ever moving the clock, which
//! eliminates the race by construction instead of relying on timing luck.
//!
//! The executor never relies on `Waker::wake` callbacks to decide what is
//! runnable — the [`Waker`] it hands to `poll` is a no-op. Instead, every
//! primitive that can unblock a task re-enqueues that task's id explicitly:
//! the clock advance step re-enqueues deadline holders, [`Handle::interrupt`]
//! re-enqueues the interrupted task, and [`super::resources::MutexResource`]
//! re-enqueues the next waiter on release. This keeps wakeup ordering fully
//! under this module's control, which is what determinism requires.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;

pub type TaskId = usize;

struct SchedulerState {
    now_us: u64,
    run_queue: VecDeque<TaskId>,
    deadlines: BTreeMap<u64, Vec<TaskId>>,
    live: Vec<bool>,
    signals: Vec<Rc<Signal<NoopRawMutex, ()>>>,
}

/// Cheaply-cloned (`Rc`) shared handle passed to every task and resource.
/// Never crosses an OS thread boundary — the executor that owns the
/// underlying state is itself confined to one thread.
#[derive(Clone)]
pub struct Handle(Rc<RefCell<SchedulerState>>);

impl Handle {
    pub fn now_us(&self) -> u64 {
        self.0.borrow().now_us
    }

    /// Suspend the current task until virtual time has advanced by
    /// `duration_us`. Never interruptible on its own; combine with
    /// [`Handle::interrupt_signal`] via `select` at call sites that need to
    /// be interruptible (see the station defer loops).
    pub fn timeout(&self, task: TaskId, duration_us: u64) -> Timeout {
        let deadline = self.0.borrow().now_us + duration_us;
        Timeout {
            handle: self.clone(),
            task,
            deadline,
            registered: false,
        }
    }

    /// The per-task interrupt channel. Stations `select` a `timeout` or a
    /// mutex-resource wait against `interrupt_signal(id).wait()` at any
    /// suspension point the spec calls interruptible.
    pub fn interrupt_signal(&self, task: TaskId) -> Rc<Signal<NoopRawMutex, ()>> {
        self.0.borrow().signals[task].clone()
    }

    /// Deliver a one-shot interrupt to `task`. Ignored if the task has
    /// already finished. Re-enqueues `task` immediately so its interrupt
    /// channel gets polled this same scheduler pass.
    pub fn interrupt(&self, task: TaskId) {
        let signal = {
            let s = self.0.borrow();
            if task >= s.live.len() || !s.live[task] {
                return;
            }
            s.signals[task].clone()
        };
        signal.signal(());
        self.wake(task);
    }

    /// Re-enqueue `task` for polling on the next scheduler pass. Used by
    /// resources (mutex release, priority handoff) to drive wakeup without
    /// depending on `Waker::wake`.
    pub fn wake(&self, task: TaskId) {
        let mut s = self.0.borrow_mut();
        if !s.run_queue.contains(&task) {
            s.run_queue.push_back(task);
        }
    }

    fn register_deadline(&self, task: TaskId, deadline: u64) {
        self.0
            .borrow_mut()
            .deadlines
            .entry(deadline)
            .or_default()
            .push(task);
    }
}

/// Future returned by [`Handle::timeout`]; resolves once virtual time
/// reaches the deadline computed at creation time.
pub struct Timeout {
    handle: Handle,
    task: TaskId,
    deadline: u64,
    registered: bool,
}

impl Future for Timeout {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.handle.now_us() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.registered {
            self.handle.register_deadline(self.task, self.deadline);
            self.registered = true;
        }
        Poll::Pending
    }
}

fn noop_raw_waker() -> RawWaker {
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    fn no_op(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// Single-threaded cooperative executor driving a purely virtual clock.
pub struct Executor {
    state: Handle,
    tasks: Vec<Option<Pin<Box<dyn Future<Output = ()>>>>>,
}

impl Executor {
    pub fn new() -> Self {
        Executor {
            state: Handle(Rc::new(RefCell::new(SchedulerState {
                now_us: 0,
                run_queue: VecDeque::new(),
                deadlines: BTreeMap::new(),
                live: Vec::new(),
                signals: Vec::new(),
            }))),
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> Handle {
        self.state.clone()
    }

    /// Reserve a task id and its interrupt channel, then spawn the future
    /// `build` constructs from them. Splitting reservation from construction
    /// lets a task's own future capture its own id for later `Handle` calls.
    pub fn spawn<F, Fut>(&mut self, build: F) -> TaskId
    where
        F: FnOnce(TaskId, Handle) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let id = self.tasks.len();
        {
            let mut s = self.state.0.borrow_mut();
            s.live.push(true);
            s.signals.push(Rc::new(Signal::new()));
            s.run_queue.push_back(id);
        }
        let fut = build(id, self.state.clone());
        self.tasks.push(Some(Box::pin(fut)));
        id
    }

    pub fn now_us(&self) -> u64 {
        self.state.now_us()
    }

    /// Run every spawned task to quiescence, then jump the virtual clock to
    /// the earliest pending deadline and repeat, until either `until_us` is
    /// reached or nothing remains both runnable and pending.
    pub fn run_until(&mut self, until_us: u64) {
        let waker = noop_waker();
        loop {
            self.drain_runnable(&waker);
            if self.state.0.borrow().now_us >= until_us {
                break;
            }
            let next_deadline = { self.state.0.borrow().deadlines.keys().next().copied() };
            match next_deadline {
                Some(d) if d <= until_us => {
                    let ids = {
                        let mut s = self.state.0.borrow_mut();
                        s.now_us = d;
                        s.deadlines.remove(&d).unwrap_or_default()
                    };
                    for id in ids {
                        self.state.wake(id);
                    }
                }
                _ => {
                    self.state.0.borrow_mut().now_us = until_us;
                    break;
                }
            }
        }
    }

    fn drain_runnable(&mut self, waker: &Waker) {
        loop {
            let next = self.state.0.borrow_mut().run_queue.pop_front();
            let Some(id) = next else { break };
            let Some(Some(fut)) = self.tasks.get_mut(id) else {
                continue;
            };
            let mut cx = Context::from_waker(waker);
            if fut.as_mut().poll(&mut cx).is_ready() {
                self.tasks[id] = None;
                self.state.0.borrow_mut().live[id] = false;
            }
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_resolves_at_deadline() {
        let mut exec = Executor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        exec.spawn(move |id, handle| async move {
            handle.timeout(id, 100).await;
            log2.borrow_mut().push(handle.now_us());
        });
        exec.run_until(1_000);
        assert_eq!(*log.borrow(), vec![100]);
    }

    #[test]
    fn interrupt_wakes_a_selecting_task() {
        use embassy_futures::select::{Either, select};

        let mut exec = Executor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        let interrupter_target = Rc::new(RefCell::new(0usize));
        let interrupter_target2 = interrupter_target.clone();

        exec.spawn(move |id, handle| {
            *interrupter_target2.borrow_mut() = id;
            async move {
                let signal = handle.interrupt_signal(id);
                match select(handle.timeout(id, 1_000), signal.wait()).await {
                    Either::First(()) => log2.borrow_mut().push("timed_out"),
                    Either::Second(()) => log2.borrow_mut().push("interrupted"),
                }
            }
        });
        let target = *interrupter_target.borrow();
        exec.spawn(move |id, handle| async move {
            handle.timeout(id, 10).await;
            handle.interrupt(target);
        });

        exec.run_until(10_000);
        assert_eq!(*log.borrow(), vec!["interrupted"]);
    }

    #[test]
    fn deterministic_same_instant_ordering_is_fifo() {
        let mut exec = Executor::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order2 = order.clone();
            exec.spawn(move |id, handle| async move {
                handle.timeout(id, 50).await;
                order2.borrow_mut().push(i);
            });
        }
        exec.run_until(1_000);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }
}
