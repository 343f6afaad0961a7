//! Deterministic lab reactor for scenario tests.
//!
//! [`LabReactor`] replaces OS readiness polling with scripted events over a
//! shared [`VirtualClock`]: registrations are recorded, readiness is
//! injected at absolute virtual ticks, and `wait` advances virtual time
//! instead of sleeping. Same script + same schedule = same results, so
//! scenario tests never depend on wall-clock timing.
//!
//! Handles are cheap clones over shared state: move one clone into the loop
//! and keep another to inject events and inspect registrations.

use crate::clock::{TimeSource, VirtualClock};
use crate::reactor::{Direction, Reactor, ReactorError, Token};
use crate::task::Resumable;
use crate::tick::Tick;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// A scripted readiness event at an absolute virtual tick.
struct ReadyEvent {
    at: Tick,
    direction: Direction,
    token: Token,
}

/// Interest in one direction of one token. The parked computation is taken
/// on readiness; the interest itself persists until unregistered.
#[derive(Default)]
struct Registration {
    parked: Option<Box<dyn Resumable>>,
}

#[derive(Default)]
struct LabState {
    read: HashMap<Token, Registration>,
    write: HashMap<Token, Registration>,
    /// Pending events, in injection order.
    events: Vec<ReadyEvent>,
    /// Every registration observed, in order.
    registered: Vec<(Direction, Token)>,
}

impl LabState {
    fn interest(&mut self, direction: Direction) -> &mut HashMap<Token, Registration> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }
}

/// Scripted reactor over virtual time.
#[derive(Clone)]
pub struct LabReactor {
    clock: VirtualClock,
    state: Rc<RefCell<LabState>>,
}

impl LabReactor {
    /// Creates a reactor that drives `clock` during waits.
    #[must_use]
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(LabState::default())),
        }
    }

    /// Scripts `token` to become ready in `direction` at virtual tick `at`.
    ///
    /// Readiness for a token with no live registration at delivery time is
    /// dropped.
    pub fn ready_at(&self, token: Token, direction: Direction, at: Tick) {
        self.state.borrow_mut().events.push(ReadyEvent {
            at,
            direction,
            token,
        });
    }

    /// Number of registrations observed for `token` in `direction` over the
    /// reactor's lifetime.
    #[must_use]
    pub fn registration_count(&self, token: Token, direction: Direction) -> usize {
        self.state
            .borrow()
            .registered
            .iter()
            .filter(|(d, t)| *d == direction && *t == token)
            .count()
    }

    /// Whether interest in `token` is currently registered in `direction`.
    #[must_use]
    pub fn is_registered(&self, token: Token, direction: Direction) -> bool {
        let state = self.state.borrow();
        match direction {
            Direction::Read => state.read.contains_key(&token),
            Direction::Write => state.write.contains_key(&token),
        }
    }

    fn register(
        &mut self,
        direction: Direction,
        token: Token,
        task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError> {
        debug!(%token, %direction, "lab: registering interest");
        let mut state = self.state.borrow_mut();
        state.registered.push((direction, token));
        state
            .interest(direction)
            .insert(token, Registration { parked: Some(task) });
        Ok(())
    }

    fn unregister(&mut self, direction: Direction, token: Token) -> Result<(), ReactorError> {
        debug!(%token, %direction, "lab: unregistering interest");
        self.state
            .borrow_mut()
            .interest(direction)
            .remove(&token)
            .map(|_| ())
            .ok_or(ReactorError::NotRegistered { direction, token })
    }

    /// Delivers every event due at or before the current virtual tick,
    /// collecting the parked computations they release.
    fn deliver_due(&self) -> Vec<Box<dyn Resumable>> {
        let now = self.clock.now();
        let mut state = self.state.borrow_mut();
        let events = std::mem::take(&mut state.events);
        let mut ready = Vec::new();
        let mut pending = Vec::new();
        for event in events {
            if event.at.diff(now) > 0 {
                pending.push(event);
                continue;
            }
            let released = state
                .interest(event.direction)
                .get_mut(&event.token)
                .and_then(|reg| reg.parked.take());
            match released {
                Some(task) => ready.push(task),
                None => {
                    debug!(token = %event.token, direction = %event.direction,
                        "lab: readiness for unregistered token dropped");
                }
            }
        }
        state.events = pending;
        ready
    }

    /// Earliest pending event tick, wraparound-safe relative to `now`.
    fn next_event_at(&self, now: Tick) -> Option<Tick> {
        self.state
            .borrow()
            .events
            .iter()
            .map(|e| e.at)
            .min_by_key(|at| at.diff(now))
    }
}

impl Reactor for LabReactor {
    fn register_read(
        &mut self,
        token: Token,
        task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError> {
        self.register(Direction::Read, token, task)
    }

    fn register_write(
        &mut self,
        token: Token,
        task: Box<dyn Resumable>,
    ) -> Result<(), ReactorError> {
        self.register(Direction::Write, token, task)
    }

    fn unregister_read(&mut self, token: Token) -> Result<(), ReactorError> {
        self.unregister(Direction::Read, token)
    }

    fn unregister_write(&mut self, token: Token) -> Result<(), ReactorError> {
        self.unregister(Direction::Write, token)
    }

    /// Advances virtual time to the earlier of the timeout and the next
    /// scripted event, delivering whatever became due.
    ///
    /// # Panics
    ///
    /// Panics when asked to wait indefinitely with no scripted events left:
    /// the scenario would deadlock.
    fn wait(&mut self, timeout: Option<Duration>) -> Vec<Box<dyn Resumable>> {
        let now = self.clock.now();
        let timeout_ms = timeout.map(|d| d.as_millis() as u32);
        match self.next_event_at(now) {
            Some(at) if timeout_ms.map_or(true, |ms| at.diff(now) <= ms as i32) => {
                if at.diff(now) > 0 {
                    self.clock.set(at);
                }
                self.deliver_due()
            }
            _ => {
                let Some(ms) = timeout_ms else {
                    panic!("LabReactor::wait without a timeout and no scripted readiness left");
                };
                self.clock.advance(ms);
                Vec::new()
            }
        }
    }
}
