//! Tickloop: a minimal cooperative task scheduler for resource-constrained
//! runtimes.
//!
//! # Overview
//!
//! A single-threaded executor interleaves many suspendable computations
//! using a deadline-ordered timer queue and a small closed syscall protocol.
//! It targets environments with no native async primitives: the scheduler
//! itself implements timer ordering, wraparound-safe clock arithmetic, and
//! the bridge between cooperative suspension points and an external IO
//! readiness reactor.
//!
//! # Core guarantees
//!
//! - **Deterministic dispatch**: entries pop in wraparound-safe wake order,
//!   FIFO among equal ticks
//! - **Wraparound safety**: all tick comparisons go through a signed modular
//!   difference; counter overflow never corrupts ordering
//! - **One executing context**: no preemption, no locks; suspension happens
//!   only at explicit yields
//! - **Closed protocol**: a yield outside the syscall vocabulary is a fatal
//!   invariant violation, not a silent reschedule
//! - **Bounded queue**: exceeding the capacity is an explicit error, never
//!   silent data loss
//!
//! # Module structure
//!
//! - [`tick`]: wrapping millisecond counter and signed difference
//! - [`clock`]: time sources (wall and virtual)
//! - [`queue`]: bounded deadline-ordered timer queue
//! - [`task`]: resumable computations and schedulable work
//! - [`syscall`]: the closed request protocol between tasks and the loop
//! - [`reactor`]: IO readiness seam, implemented by platform layers
//! - [`lab`]: deterministic scripted reactor for scenario tests
//! - [`scheduler`]: the event loop itself
//! - [`global`]: thread-local singleton access and compat shims
//!
//! # Example
//!
//! ```
//! use tickloop::{EventLoop, Resumable, Resumed, TaskError, Value};
//!
//! struct Countdown(u32);
//!
//! impl Resumable for Countdown {
//!     fn resume(&mut self, _args: &[Value]) -> Result<Resumed, TaskError> {
//!         if self.0 == 0 {
//!             return Ok(Resumed::Done);
//!         }
//!         self.0 -= 1;
//!         // Bare yield: reschedule as soon as possible.
//!         Ok(Resumed::Yield(Value::None))
//!     }
//! }
//!
//! let mut ev = EventLoop::new();
//! let stop = ev.run_until_complete(Countdown(3)).unwrap();
//! assert_eq!(stop.as_int(), Some(0));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod global;
pub mod lab;
pub mod queue;
pub mod reactor;
pub mod scheduler;
pub mod syscall;
pub mod task;
pub mod tick;

pub use clock::{TimeSource, VirtualClock, WallClock};
pub use global::{
    compat, get_event_loop, reset_event_loop, set_event_loop, with_event_loop, LoopHandle,
};
pub use lab::LabReactor;
pub use queue::{QueueFull, TimerQueue, DEFAULT_QUEUE_CAPACITY};
pub use reactor::{BlockingReactor, Direction, Reactor, ReactorError, Token};
pub use scheduler::{Cx, EventLoop, EventLoopBuilder, LoopError};
pub use syscall::{Syscall, Value};
pub use task::{sleep, sleep_ms, Callback, Resumable, Resumed, Sleep, TaskError, Work};
pub use tick::Tick;
