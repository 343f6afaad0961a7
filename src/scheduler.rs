//! The event loop: scheduling surface and dispatch state machine.
//!
//! [`EventLoop`] owns the timer queue, reads time from its clock, and
//! delegates blocking to its reactor. `run_forever` repeatedly pops the
//! earliest entry, waits out its deadline, then either invokes a callback or
//! resumes a computation and classifies the yielded value through the closed
//! syscall protocol.
//!
//! Scheduling calls are pure bookkeeping and never block. There is exactly
//! one executing context; the queue is exclusively owned and mutated here.

use crate::clock::{TimeSource, WallClock};
use crate::queue::{Entry, QueueFull, TimerQueue, DEFAULT_QUEUE_CAPACITY};
use crate::reactor::{BlockingReactor, Reactor, ReactorError};
use crate::syscall::{Syscall, Value};
use crate::task::{Resumable, Resumed, TaskError, Work};
use crate::tick::Tick;
use std::time::Duration;
use tracing::{debug, trace};

/// Fatal errors surfaced by the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// A reschedule or injection hit the queue bound.
    #[error(transparent)]
    Queue(#[from] QueueFull),
    /// A reactor registration call failed.
    #[error(transparent)]
    Reactor(#[from] ReactorError),
    /// A computation yielded a value outside the closed protocol.
    #[error("unsupported yield value: {repr} (of kind {kind})")]
    UnsupportedYield {
        /// Rendering of the offending value.
        repr: String,
        /// Kind name of the offending value.
        kind: &'static str,
    },
    /// A computation or callback failed. There is no per-task isolation: a
    /// single misbehaving unit of work terminates the whole loop.
    #[error("scheduled work failed: {0}")]
    Task(#[source] TaskError),
}

/// Scheduling context handed to callbacks.
///
/// Exposes the non-blocking scheduling surface without giving scheduled work
/// access to the loop itself.
pub struct Cx<'a> {
    queue: &'a mut TimerQueue,
    clock: &'a dyn TimeSource,
}

impl Cx<'_> {
    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Schedules `work` to run as soon as possible.
    pub fn call_soon(&mut self, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        let now = self.clock.now();
        self.call_at(now, work, args)
    }

    /// Schedules `work` to run after `delay`.
    pub fn call_later(
        &mut self,
        delay: Duration,
        work: Work,
        args: Vec<Value>,
    ) -> Result<(), QueueFull> {
        self.call_later_ms(delay.as_millis() as u32, work, args)
    }

    /// Millisecond variant of [`Cx::call_later`].
    pub fn call_later_ms(
        &mut self,
        delay_ms: u32,
        work: Work,
        args: Vec<Value>,
    ) -> Result<(), QueueFull> {
        let at = self.clock.now().advanced_by(delay_ms);
        self.call_at(at, work, args)
    }

    /// Schedules `work` to run at an absolute tick.
    pub fn call_at(&mut self, at: Tick, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        debug!(%at, kind = work.kind(), "scheduling");
        self.queue.push(at, work, args)
    }
}

/// Builder for a customized [`EventLoop`].
pub struct EventLoopBuilder {
    capacity: usize,
    clock: Option<Box<dyn TimeSource>>,
    reactor: Option<Box<dyn Reactor>>,
}

impl EventLoopBuilder {
    /// Starts from the defaults: wall clock, blocking reactor, capacity
    /// [`DEFAULT_QUEUE_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            clock: None,
            reactor: None,
        }
    }

    /// Sets the bound on pending queue entries.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Sets the reactor implementation.
    #[must_use]
    pub fn reactor(mut self, reactor: impl Reactor + 'static) -> Self {
        self.reactor = Some(Box::new(reactor));
        self
    }

    /// Builds the loop.
    #[must_use]
    pub fn build(self) -> EventLoop {
        EventLoop {
            queue: TimerQueue::new(self.capacity),
            clock: self.clock.unwrap_or_else(|| Box::new(WallClock::new())),
            reactor: self.reactor.unwrap_or_else(|| Box::new(BlockingReactor)),
        }
    }
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The single-threaded cooperative event loop.
pub struct EventLoop {
    queue: TimerQueue,
    clock: Box<dyn TimeSource>,
    reactor: Box<dyn Reactor>,
}

impl EventLoop {
    /// A loop with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder for custom configuration.
    #[must_use]
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedules a computation to run as soon as possible.
    ///
    /// No cancellable handle is returned: once scheduled, a computation runs
    /// until it exhausts or the loop stops.
    pub fn create_task(&mut self, task: impl Resumable + 'static) -> Result<(), QueueFull> {
        self.call_soon(Work::resume(task), Vec::new())
    }

    /// Schedules `work` to run as soon as possible.
    pub fn call_soon(&mut self, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        self.cx().call_soon(work, args)
    }

    /// Schedules `work` to run after `delay`.
    pub fn call_later(
        &mut self,
        delay: Duration,
        work: Work,
        args: Vec<Value>,
    ) -> Result<(), QueueFull> {
        self.cx().call_later(delay, work, args)
    }

    /// Millisecond variant of [`EventLoop::call_later`].
    pub fn call_later_ms(
        &mut self,
        delay_ms: u32,
        work: Work,
        args: Vec<Value>,
    ) -> Result<(), QueueFull> {
        self.cx().call_later_ms(delay_ms, work, args)
    }

    /// Schedules `work` to run at an absolute tick.
    pub fn call_at(&mut self, at: Tick, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        self.cx().call_at(at, work, args)
    }

    /// Drives the dispatch loop until a stop syscall is observed, returning
    /// the value it carries.
    ///
    /// With an empty queue the loop waits indefinitely on the reactor,
    /// assuming IO readiness will eventually inject new work.
    pub fn run_forever(&mut self) -> Result<Value, LoopError> {
        loop {
            let Some(entry) = self.next_entry()? else {
                continue;
            };
            if let Some(stop) = self.dispatch(entry)? {
                return Ok(stop);
            }
        }
    }

    /// Runs `task` to exhaustion, then stops the loop.
    ///
    /// Returns the stop value: `0` from the wrapper, unless the computation
    /// issues its own stop syscall first.
    pub fn run_until_complete(
        &mut self,
        task: impl Resumable + 'static,
    ) -> Result<Value, LoopError> {
        self.create_task(StopWhenDone {
            inner: Box::new(task),
        })?;
        self.run_forever()
    }

    /// Releases the loop's resources, dropping all pending entries.
    pub fn close(&mut self) {
        debug!(dropped = self.queue.len(), "closing loop");
        self.queue.clear();
    }

    fn cx(&mut self) -> Cx<'_> {
        Cx {
            queue: &mut self.queue,
            clock: self.clock.as_ref(),
        }
    }

    /// Re-injects computations the reactor reported ready, each with an
    /// immediate schedule and no args.
    fn inject_ready(&mut self, ready: Vec<Box<dyn Resumable>>) -> Result<(), QueueFull> {
        for task in ready {
            trace!("injecting readied computation");
            let now = self.clock.now();
            self.queue.push(now, Work::Resume(task), Vec::new())?;
        }
        Ok(())
    }

    /// Pops the nearest entry, waiting out its deadline first. `None` means
    /// the iteration should restart (the queue was empty and the reactor
    /// wait finished).
    fn next_entry(&mut self) -> Result<Option<Entry>, LoopError> {
        if self.queue.is_empty() {
            trace!("queue empty, waiting on reactor");
            let ready = self.reactor.wait(None);
            self.inject_ready(ready)?;
            return Ok(None);
        }
        let Some(entry) = self.queue.pop() else {
            return Ok(None);
        };
        let delay = entry.wake().diff(self.clock.now());
        if delay > 0 {
            trace!(delay_ms = delay, "waiting until deadline");
            let ready = self.reactor.wait(Some(Duration::from_millis(delay as u64)));
            self.inject_ready(ready)?;
        }
        Ok(Some(entry))
    }

    /// Executes one entry. `Some` carries the value of an observed stop
    /// syscall.
    fn dispatch(&mut self, entry: Entry) -> Result<Option<Value>, LoopError> {
        let (work, args) = entry.into_parts();
        let mut task = match work {
            Work::Call(callback) => {
                trace!("invoking callback");
                let mut cx = self.cx();
                callback(&mut cx, &args).map_err(LoopError::Task)?;
                return Ok(None);
            }
            Work::Resume(task) => task,
        };

        trace!(args = args.len(), "resuming computation");
        let value = match task.resume(&args).map_err(LoopError::Task)? {
            Resumed::Done => {
                trace!("computation finished");
                return Ok(None);
            }
            Resumed::Yield(value) => value,
        };
        trace!(yielded = ?value, "classifying yield");

        let delay_ms: u32 = match value {
            Value::Syscall(Syscall::Sleep(ms)) => ms,
            Value::Syscall(Syscall::StopLoop(result)) => {
                debug!("stop requested");
                return Ok(Some(*result));
            }
            Value::Syscall(Syscall::IoRead(token)) => {
                self.reactor.register_read(token, task)?;
                return Ok(None);
            }
            Value::Syscall(Syscall::IoWrite(token)) => {
                self.reactor.register_write(token, task)?;
                return Ok(None);
            }
            Value::Syscall(Syscall::IoReadDone(token)) => {
                self.reactor.unregister_read(token)?;
                0
            }
            Value::Syscall(Syscall::IoWriteDone(token)) => {
                self.reactor.unregister_write(token)?;
                0
            }
            Value::Task(sub) => {
                // Concurrent spawn: the sub-task runs now, and the parent is
                // rescheduled immediately as well.
                let now = self.clock.now();
                self.queue.push(now, Work::Resume(sub), Vec::new())?;
                0
            }
            Value::Int(ms) => clamp_delay_ms(ms),
            Value::None => 0,
            other @ (Value::Bool(_) | Value::Float(_) | Value::Str(_)) => {
                return Err(LoopError::UnsupportedYield {
                    repr: format!("{other:?}"),
                    kind: other.kind(),
                });
            }
        };

        // Reschedule: a fresh entry for the same computation and args.
        let at = self.clock.now().advanced_by(delay_ms);
        self.queue.push(at, Work::Resume(task), args)?;
        Ok(None)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Past delays run immediately; delays are capped to the half-range window
/// the wraparound-safe ordering relies on.
fn clamp_delay_ms(ms: i64) -> u32 {
    ms.clamp(0, i64::from(i32::MAX)) as u32
}

/// Wrapper that converts exhaustion of the inner computation into a stop
/// syscall carrying `0`. Everything the inner computation yields passes
/// through untouched.
struct StopWhenDone {
    inner: Box<dyn Resumable>,
}

impl Resumable for StopWhenDone {
    fn resume(&mut self, args: &[Value]) -> Result<Resumed, TaskError> {
        match self.inner.resume(args)? {
            Resumed::Done => Ok(Resumed::Yield(Value::Syscall(Syscall::stop(Value::Int(0))))),
            step => Ok(step),
        }
    }
}
