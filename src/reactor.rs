//! Reactor seam: IO readiness registration and the blocking wait primitive.
//!
//! The loop never watches OS resources itself. When a computation yields an
//! IO syscall the loop parks it with the installed [`Reactor`]; when
//! [`Reactor::wait`] reports the resource ready it hands the computation
//! back, and the loop re-injects it with an immediate schedule. A
//! registration therefore leads to exactly one re-injection, or the
//! computation never resumes.
//!
//! Registration errors are opaque to the core: they propagate out of the
//! dispatch loop and are never retried.

use crate::task::Resumable;
use core::fmt;
use std::time::Duration;

/// Opaque identifier for a registered IO resource.
///
/// Platform layers map tokens to file descriptors or handles; the core only
/// carries them between syscalls and the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    /// Creates a token from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Readiness direction of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Readable readiness.
    Read,
    /// Writable readiness.
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Errors surfaced by reactor registration calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactorError {
    /// The installed reactor does not support IO registration.
    #[error("reactor does not support {op}")]
    Unsupported {
        /// The registration call that was attempted.
        op: &'static str,
    },
    /// No registration exists for the token.
    #[error("no {direction} registration for {token}")]
    NotRegistered {
        /// Direction of the missing registration.
        direction: Direction,
        /// The unregistered token.
        token: Token,
    },
}

/// Platform seam invoked by the loop on IO syscalls and when waiting.
///
/// This is the only place true external concurrency is coordinated; the core
/// has no visibility into how many resources are pending or how the platform
/// multiplexes them.
pub trait Reactor {
    /// Parks `task` until `token` is readable.
    fn register_read(
        &mut self,
        token: Token,
        task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError>;

    /// Parks `task` until `token` is writable.
    fn register_write(
        &mut self,
        token: Token,
        task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError>;

    /// Drops read interest in `token`.
    fn unregister_read(&mut self, token: Token) -> Result<(), ReactorError>;

    /// Drops write interest in `token`.
    fn unregister_write(&mut self, token: Token) -> Result<(), ReactorError>;

    /// Blocks up to `timeout` (indefinitely on `None`) and returns the
    /// computations whose IO became ready, in readiness order.
    ///
    /// May return early, and may return an empty vec when the timeout
    /// elapsed with nothing ready.
    fn wait(&mut self, timeout: Option<Duration>) -> Vec<Box<dyn Resumable>>;
}

/// Default reactor: pure blocking waits, no IO support.
///
/// `wait` sleeps for the full timeout and parks the thread forever when
/// asked to wait indefinitely: with this installed, an empty queue blocks
/// the loop for good, since nothing can inject new work. IO registration
/// fails with [`ReactorError::Unsupported`].
#[derive(Debug, Default)]
pub struct BlockingReactor;

impl Reactor for BlockingReactor {
    fn register_read(
        &mut self,
        _token: Token,
        _task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError> {
        Err(ReactorError::Unsupported {
            op: "register_read",
        })
    }

    fn register_write(
        &mut self,
        _token: Token,
        _task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError> {
        Err(ReactorError::Unsupported {
            op: "register_write",
        })
    }

    fn unregister_read(&mut self, _token: Token) -> Result<(), ReactorError> {
        Err(ReactorError::Unsupported {
            op: "unregister_read",
        })
    }

    fn unregister_write(&mut self, _token: Token) -> Result<(), ReactorError> {
        Err(ReactorError::Unsupported {
            op: "unregister_write",
        })
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Vec<Box<dyn Resumable>> {
        match timeout {
            Some(delay) => std::thread::sleep(delay),
            // Nothing will ever unpark this thread.
            None => loop {
                std::thread::park();
            },
        }
        Vec::new()
    }
}
