//! End-to-end scheduling scenarios over virtual time.
//!
//! Every test runs on a [`VirtualClock`] driven by a [`LabReactor`], so the
//! schedules are deterministic and independent of wall-clock jitter.

use std::cell::RefCell;
use std::rc::Rc;

use tickloop::{
    compat, get_event_loop, reset_event_loop, set_event_loop, sleep_ms, Direction, EventLoop,
    LabReactor, Resumable, Resumed, Syscall, TaskError, Tick, TimeSource, Token, Value,
    VirtualClock,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn lab_loop() -> (EventLoop, VirtualClock, LabReactor) {
    let clock = VirtualClock::new();
    let reactor = LabReactor::new(clock.clone());
    let ev = EventLoop::builder()
        .clock(clock.clone())
        .reactor(reactor.clone())
        .build();
    (ev, clock, reactor)
}

type Log = Rc<RefCell<Vec<String>>>;

/// Sleeps once for a fixed delay, then exhausts.
struct Sleeper {
    delay_ms: u32,
    slept: bool,
    clock: VirtualClock,
    log: Log,
}

impl Resumable for Sleeper {
    fn resume(&mut self, _args: &[Value]) -> Result<Resumed, TaskError> {
        if self.slept {
            self.log
                .borrow_mut()
                .push(format!("A:done@{}", self.clock.now()));
            return Ok(Resumed::Done);
        }
        self.slept = true;
        self.log
            .borrow_mut()
            .push(format!("A:start@{}", self.clock.now()));
        Ok(Resumed::Yield(Value::Syscall(Syscall::Sleep(self.delay_ms))))
    }
}

/// Yields nothing a fixed number of times, then exhausts.
struct Spinner {
    remaining: u32,
    clock: VirtualClock,
    log: Log,
}

impl Resumable for Spinner {
    fn resume(&mut self, _args: &[Value]) -> Result<Resumed, TaskError> {
        if self.remaining == 0 {
            return Ok(Resumed::Done);
        }
        self.remaining -= 1;
        self.log
            .borrow_mut()
            .push(format!("B:spin@{}", self.clock.now()));
        Ok(Resumed::Yield(Value::None))
    }
}

/// Two tasks created at tick 0: A sleeps 50ms once, B spins three quanta.
/// B finishes all its quanta before A's deadline elapses; A resumes at tick
/// >= 50. Neither stops the loop on its own, so the harness wraps a stopper
/// through `run_until_complete`.
#[test]
fn sleeper_and_spinner_interleave() {
    init_tracing();
    let (mut ev, clock, _reactor) = lab_loop();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    ev.create_task(Sleeper {
        delay_ms: 50,
        slept: false,
        clock: clock.clone(),
        log: Rc::clone(&log),
    })
    .unwrap();
    ev.create_task(Spinner {
        remaining: 3,
        clock: clock.clone(),
        log: Rc::clone(&log),
    })
    .unwrap();

    let stop = ev.run_until_complete(sleep_ms(100)).unwrap();
    assert_eq!(stop.as_int(), Some(0));

    let log = log.borrow();
    assert_eq!(
        *log,
        vec![
            "A:start@0ms",
            "B:spin@0ms",
            "B:spin@0ms",
            "B:spin@0ms",
            "A:done@50ms",
        ]
    );
    assert!(clock.now().diff(Tick::from_millis(100)) >= 0);
    assert_eq!(ev.pending(), 0);
}

/// Reads through the reactor seam: register on `IoRead`, stay parked until
/// the scripted readiness, resume with no args, unregister on `IoReadDone`.
struct Reader {
    token: Token,
    step: u32,
    clock: VirtualClock,
    log: Log,
}

impl Resumable for Reader {
    fn resume(&mut self, args: &[Value]) -> Result<Resumed, TaskError> {
        self.step += 1;
        match self.step {
            1 => {
                self.log
                    .borrow_mut()
                    .push(format!("registered@{}", self.clock.now()));
                Ok(Resumed::Yield(Value::Syscall(Syscall::IoRead(self.token))))
            }
            2 => {
                assert!(args.is_empty(), "readiness wakeups carry no args");
                self.log
                    .borrow_mut()
                    .push(format!("resumed@{}", self.clock.now()));
                Ok(Resumed::Yield(Value::Syscall(Syscall::IoReadDone(
                    self.token,
                ))))
            }
            _ => Ok(Resumed::Done),
        }
    }
}

#[test]
fn io_read_roundtrip() {
    init_tracing();
    let (mut ev, clock, reactor) = lab_loop();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let token = Token::new(7);

    reactor.ready_at(token, Direction::Read, Tick::from_millis(30));
    let stop = ev
        .run_until_complete(Reader {
            token,
            step: 0,
            clock: clock.clone(),
            log: Rc::clone(&log),
        })
        .unwrap();

    assert_eq!(stop.as_int(), Some(0));
    // Exactly one registration per IoRead syscall, and no resumption until
    // readiness re-injected the computation.
    assert_eq!(reactor.registration_count(token, Direction::Read), 1);
    assert!(!reactor.is_registered(token, Direction::Read));
    assert_eq!(*log.borrow(), vec!["registered@0ms", "resumed@30ms"]);
}

/// Deadlines scheduled astride the counter wrap still run in relative
/// order.
#[test]
fn scheduling_survives_counter_wraparound() {
    init_tracing();
    let start = Tick::from_millis(u32::MAX - 20);
    let clock = VirtualClock::starting_at(start);
    let reactor = LabReactor::new(clock.clone());
    let mut ev = EventLoop::builder()
        .clock(clock.clone())
        .reactor(reactor)
        .build();

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let first = Rc::clone(&log);
    let second = Rc::clone(&log);
    ev.call_later_ms(
        50,
        tickloop::Work::call(move |_cx, _args| {
            second.borrow_mut().push("second".into());
            Ok(())
        }),
        Vec::new(),
    )
    .unwrap();
    ev.call_later_ms(
        10,
        tickloop::Work::call(move |_cx, _args| {
            first.borrow_mut().push("first".into());
            Ok(())
        }),
        Vec::new(),
    )
    .unwrap();

    ev.run_until_complete(sleep_ms(60)).unwrap();

    assert_eq!(*log.borrow(), vec!["first", "second"]);
    // The counter wrapped during the run.
    assert!(clock.now().as_millis() < 100);
    assert!(clock.now().diff(start) >= 60);
}

#[test]
fn global_loop_and_compat_shims() {
    init_tracing();
    reset_event_loop();
    let clock = VirtualClock::new();
    let reactor = LabReactor::new(clock.clone());
    set_event_loop(
        EventLoop::builder()
            .clock(clock.clone())
            .reactor(reactor)
            .build(),
    );

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    compat::ensure_future(Spinner {
        remaining: 2,
        clock: clock.clone(),
        log: Rc::clone(&log),
    })
    .unwrap();
    compat::task(Spinner {
        remaining: 1,
        clock,
        log: Rc::clone(&log),
    })
    .unwrap();

    let handle = get_event_loop();
    let stop = handle.run_until_complete(sleep_ms(1)).unwrap();
    assert_eq!(stop.as_int(), Some(0));
    assert_eq!(log.borrow().len(), 3);
    assert_eq!(handle.pending(), 0);

    reset_event_loop();
    assert_eq!(get_event_loop().pending(), 0);
}

/// A computation's own stop syscall wins over the wrapper's implicit 0.
#[test]
fn explicit_stop_value_is_returned() {
    init_tracing();
    struct StopWith42;
    impl Resumable for StopWith42 {
        fn resume(&mut self, _args: &[Value]) -> Result<Resumed, TaskError> {
            Ok(Resumed::Yield(Value::Syscall(Syscall::stop(Value::Int(42)))))
        }
    }

    let (mut ev, _clock, _reactor) = lab_loop();
    let stop = ev.run_until_complete(StopWith42).unwrap();
    assert_eq!(stop.as_int(), Some(42));
}
