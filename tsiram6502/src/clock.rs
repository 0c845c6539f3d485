use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    thread,
    time::Duration,
};

use log::*;

const LOG_TARGET: &str = "CLK";

/// Anything that wants to be told when time passes.
pub trait ClockListener {
    /// Do one clock pulse worth of work. Must finish before returning; the
    /// next listener runs right after.
    fn pulse(&mut self);
}

/// Shared handle to a listener. The clock only ever borrows one at a time.
pub type ListenerHandle = Rc<RefCell<dyn ClockListener>>;

/// The one way to stop the clock from inside a pulse. Handed to whoever is
/// allowed to halt the machine (the CPU) instead of letting them reach for the
/// whole system.
#[derive(Clone, Default)]
pub struct HaltHandle(Rc<Cell<bool>>);

impl HaltHandle {
    pub fn request(&self) {
        self.0.set(true);
    }
    pub fn is_requested(&self) -> bool {
        self.0.get()
    }
    fn clear(&self) {
        self.0.set(false);
    }
}

/// Why `Clock::run` came back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockStop {
    Halted,
    TickLimit,
}

pub struct Clock {
    listeners: Vec<ListenerHandle>,
    halt: HaltHandle,
    ticks: u64,
    pulse_debug: bool,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Clock {
        return Clock {
            listeners: Vec::new(),
            halt: HaltHandle::default(),
            ticks: 0,
            pulse_debug: false,
        };
    }

    /// The clock gets told who is listening to it. Registration order is the
    /// order they pulse in, every tick, forever.
    pub fn register_listener(&mut self, listener: ListenerHandle) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn halt_handle(&self) -> HaltHandle {
        self.halt.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_requested()
    }

    /// Start ticking again after a halt (e.g. after a reset).
    pub fn resume(&mut self) {
        self.halt.clear();
    }

    pub fn get_ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_pulse_debug(&mut self, on: bool) {
        self.pulse_debug = on;
    }

    /// Pulse every listener once, in registration order. A halt requested
    /// mid-tick still lets the rest of the listeners finish this tick.
    pub fn tick(&mut self) {
        self.ticks += 1;
        if self.pulse_debug {
            trace!(target: LOG_TARGET, "Clock pulse {} initialized", self.ticks);
        }
        for listener in self.listeners.iter() {
            listener.borrow_mut().pulse();
        }
    }

    /// Tick until halted or until `limit` ticks have passed, sleeping
    /// `interval` before each one. `between_ticks` runs outside the tick
    /// boundary, which is where asynchronous input gets to post its
    /// interrupts. A halt it requests takes effect before the next tick.
    pub fn run<F: FnMut()>(
        &mut self,
        interval: Duration,
        limit: Option<u64>,
        mut between_ticks: F,
    ) -> ClockStop {
        let mut remaining = limit;
        loop {
            if self.halt.is_requested() {
                info!(target: LOG_TARGET, "Clock stopped after {} ticks", self.ticks);
                return ClockStop::Halted;
            }
            if let Some(left) = remaining.as_mut() {
                if *left == 0 {
                    return ClockStop::TickLimit;
                }
                *left -= 1;
            }
            if !interval.is_zero() {
                thread::sleep(interval);
            }
            between_ticks();
            if self.halt.is_requested() {
                continue;
            }
            self.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl ClockListener for Recorder {
        fn pulse(&mut self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    struct Halter(HaltHandle);

    impl ClockListener for Halter {
        fn pulse(&mut self) {
            self.0.request();
        }
    }

    fn recorder(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> ListenerHandle {
        Rc::new(RefCell::new(Recorder {
            name,
            log: log.clone(),
        }))
    }

    #[test]
    fn tick_pulses_everyone_once_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut clock = Clock::new();
        clock.register_listener(recorder("RAM", &log));
        clock.register_listener(recorder("MMU", &log));
        clock.register_listener(recorder("CPU", &log));
        clock.tick();
        clock.tick();
        assert_eq!(*log.borrow(), ["RAM", "MMU", "CPU", "RAM", "MMU", "CPU"]);
        assert_eq!(clock.get_ticks(), 2);
    }

    #[test]
    fn run_stops_at_the_tick_limit() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut clock = Clock::new();
        clock.register_listener(recorder("RAM", &log));
        let mut between = 0;
        let stop = clock.run(Duration::ZERO, Some(5), || between += 1);
        assert_eq!(stop, ClockStop::TickLimit);
        assert_eq!(log.borrow().len(), 5);
        assert_eq!(between, 5);
    }

    #[test]
    fn halting_stops_the_run() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut clock = Clock::new();
        clock.register_listener(Rc::new(RefCell::new(Halter(clock.halt_handle()))));
        clock.register_listener(recorder("after", &log));
        let stop = clock.run(Duration::ZERO, Some(10), || ());
        assert_eq!(stop, ClockStop::Halted);
        assert_eq!(clock.get_ticks(), 1);
        assert_eq!(*log.borrow(), ["after"]);

        clock.resume();
        assert!(!clock.is_halted());
    }

    #[test]
    fn halt_between_ticks_skips_the_next_tick() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut clock = Clock::new();
        clock.register_listener(recorder("RAM", &log));
        let halt = clock.halt_handle();
        let mut calls = 0;
        let stop = clock.run(Duration::ZERO, None, || {
            calls += 1;
            if calls == 3 {
                halt.request();
            }
        });
        assert_eq!(stop, ClockStop::Halted);
        assert_eq!(clock.get_ticks(), 2);
    }
}
