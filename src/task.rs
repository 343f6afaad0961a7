//! Resumable computations and schedulable work.
//!
//! The scheduled unit is either a one-shot callback or a [`Resumable`]
//! computation. There is no separate task or future handle: once scheduled,
//! a computation has no identity beyond its place in the queue, cannot be
//! cancelled, and stops only by exhausting or by the loop observing a stop
//! syscall.

use crate::scheduler::Cx;
use crate::syscall::Value;
use core::fmt;
use std::error::Error;
use std::time::Duration;

/// Error raised by a resumed computation or callback.
///
/// Carried opaquely: the loop does not interpret task failures, it aborts
/// with them.
pub type TaskError = Box<dyn Error + 'static>;

/// Outcome of resuming a computation.
#[derive(Debug)]
pub enum Resumed {
    /// The computation suspended, yielding a value for the loop to classify.
    Yield(Value),
    /// The computation ran to exhaustion. No return value is produced.
    Done,
}

/// A suspendable unit of cooperative work.
///
/// `resume` drives the computation to its next suspension point. It receives
/// the args its queue entry was scheduled with (empty after an IO readiness
/// wakeup). Between suspension points the computation runs uninterrupted;
/// all state lives inside the implementor, the loop never inspects it.
pub trait Resumable {
    /// Resumes the computation.
    ///
    /// Any `Err` other than normal exhaustion terminates the whole loop;
    /// there is no per-task isolation.
    fn resume(&mut self, args: &[Value]) -> Result<Resumed, TaskError>;
}

/// One-shot callback form of scheduled work.
///
/// Invoked with a scheduling context so it can enqueue further work, and
/// with the args its entry was scheduled with.
pub type Callback = Box<dyn FnOnce(&mut Cx<'_>, &[Value]) -> Result<(), TaskError>>;

/// The unit held by a queue entry.
pub enum Work {
    /// Invoked once with the entry's args; never rescheduled by the loop.
    Call(Callback),
    /// Resumed with the entry's args; the yielded value decides what happens
    /// next.
    Resume(Box<dyn Resumable>),
}

impl Work {
    /// Wraps a one-shot callback.
    pub fn call<F>(f: F) -> Self
    where
        F: FnOnce(&mut Cx<'_>, &[Value]) -> Result<(), TaskError> + 'static,
    {
        Self::Call(Box::new(f))
    }

    /// Wraps a resumable computation.
    pub fn resume<R: Resumable + 'static>(task: R) -> Self {
        Self::Resume(Box::new(task))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Call(_) => "callback",
            Self::Resume(_) => "task",
        }
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Computation that yields a single delay, then exhausts.
///
/// Returned by [`sleep`] and [`sleep_ms`].
#[derive(Debug)]
pub struct Sleep {
    delay_ms: u32,
    fired: bool,
}

impl Resumable for Sleep {
    fn resume(&mut self, _args: &[Value]) -> Result<Resumed, TaskError> {
        if self.fired {
            Ok(Resumed::Done)
        } else {
            self.fired = true;
            Ok(Resumed::Yield(Value::Int(i64::from(self.delay_ms))))
        }
    }
}

/// A computation that suspends for `delay`, then exhausts.
#[must_use]
pub fn sleep(delay: Duration) -> Sleep {
    sleep_ms(delay.as_millis() as u32)
}

/// Millisecond variant of [`sleep`].
#[must_use]
pub fn sleep_ms(ms: u32) -> Sleep {
    Sleep {
        delay_ms: ms,
        fired: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_yields_once_then_exhausts() {
        let mut task = sleep_ms(25);
        match task.resume(&[]).unwrap() {
            Resumed::Yield(v) => assert_eq!(v.as_int(), Some(25)),
            Resumed::Done => panic!("expected a yield"),
        }
        assert!(matches!(task.resume(&[]).unwrap(), Resumed::Done));
    }

    #[test]
    fn work_kinds() {
        assert_eq!(Work::call(|_, _| Ok(())).kind(), "callback");
        assert_eq!(Work::resume(sleep_ms(1)).kind(), "task");
    }
}
