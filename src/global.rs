//! Process-wide loop access and familiarity shims.
//!
//! The loop is thread-local state: a single-threaded executor has exactly
//! one per thread of use. It is created lazily on first access and torn
//! down explicitly with [`reset_event_loop`]; test isolation never relies
//! on hidden module state.

use crate::queue::QueueFull;
use crate::scheduler::{EventLoop, LoopError};
use crate::syscall::Value;
use crate::task::{Resumable, Work};
use crate::tick::Tick;
use std::cell::RefCell;
use std::time::Duration;

thread_local! {
    static EVENT_LOOP: RefCell<Option<EventLoop>> = RefCell::new(None);
}

/// Runs `f` against the thread's loop, creating a default one on first use.
pub fn with_event_loop<R>(f: impl FnOnce(&mut EventLoop) -> R) -> R {
    EVENT_LOOP.with(|slot| {
        let mut slot = slot.borrow_mut();
        f(slot.get_or_insert_with(EventLoop::new))
    })
}

/// Installs `event_loop` as the thread's loop, replacing any existing one.
pub fn set_event_loop(event_loop: EventLoop) {
    EVENT_LOOP.with(|slot| *slot.borrow_mut() = Some(event_loop));
}

/// Drops the thread's loop, pending entries included. The next access
/// creates a fresh one.
pub fn reset_event_loop() {
    EVENT_LOOP.with(|slot| *slot.borrow_mut() = None);
}

/// Returns a handle to the thread's loop, creating it lazily on first use
/// of any of its methods.
#[must_use]
pub fn get_event_loop() -> LoopHandle {
    LoopHandle(())
}

/// Handle to the thread's loop.
///
/// Methods borrow the loop for their duration. Work executing inside the
/// loop must schedule through the `Cx` it is handed, not through this
/// handle.
#[derive(Debug, Clone, Copy)]
pub struct LoopHandle(());

impl LoopHandle {
    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        with_event_loop(|ev| ev.now())
    }

    /// Number of pending entries.
    #[must_use]
    pub fn pending(&self) -> usize {
        with_event_loop(|ev| ev.pending())
    }

    /// Schedules a computation to run as soon as possible.
    pub fn create_task(&self, task: impl Resumable + 'static) -> Result<(), QueueFull> {
        with_event_loop(|ev| ev.create_task(task))
    }

    /// Schedules `work` to run as soon as possible.
    pub fn call_soon(&self, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        with_event_loop(|ev| ev.call_soon(work, args))
    }

    /// Schedules `work` to run after `delay`.
    pub fn call_later(
        &self,
        delay: Duration,
        work: Work,
        args: Vec<Value>,
    ) -> Result<(), QueueFull> {
        with_event_loop(|ev| ev.call_later(delay, work, args))
    }

    /// Millisecond variant of [`LoopHandle::call_later`].
    pub fn call_later_ms(
        &self,
        delay_ms: u32,
        work: Work,
        args: Vec<Value>,
    ) -> Result<(), QueueFull> {
        with_event_loop(|ev| ev.call_later_ms(delay_ms, work, args))
    }

    /// Schedules `work` to run at an absolute tick.
    pub fn call_at(&self, at: Tick, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        with_event_loop(|ev| ev.call_at(at, work, args))
    }

    /// Drives the dispatch loop until a stop syscall is observed.
    pub fn run_forever(&self) -> Result<Value, LoopError> {
        with_event_loop(EventLoop::run_forever)
    }

    /// Runs `task` to exhaustion, then stops the loop and returns the stop
    /// value.
    pub fn run_until_complete(&self, task: impl Resumable + 'static) -> Result<Value, LoopError> {
        with_event_loop(|ev| ev.run_until_complete(task))
    }

    /// Releases the loop's resources, dropping all pending entries.
    pub fn close(&self) {
        with_event_loop(EventLoop::close);
    }
}

pub mod compat {
    //! Shims for familiarity with other async ecosystems.
    //!
    //! Both functions immediately schedule on the thread's loop. Neither
    //! returns a handle: the scheduled computation has no identity separate
    //! from its place in the queue, so there is nothing to hand back. This
    //! is an intentional simplification, not an oversight.

    use super::with_event_loop;
    use crate::queue::QueueFull;
    use crate::task::Resumable;

    /// Schedules `task` to run as soon as possible on the thread's loop.
    pub fn ensure_future(task: impl Resumable + 'static) -> Result<(), QueueFull> {
        with_event_loop(|ev| ev.create_task(task))
    }

    /// Alias of [`ensure_future`], under the name other ecosystems use for
    /// task construction.
    pub fn task(task: impl Resumable + 'static) -> Result<(), QueueFull> {
        ensure_future(task)
    }
}
