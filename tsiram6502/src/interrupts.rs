use std::{cmp::Ordering, collections::BinaryHeap};

use log::*;

use crate::{
    clock::ClockListener,
    devices::{console, keyboard, ConsoleOutput},
};

const LOG_TARGET: &str = "ICU";

/// What every interrupt-capable thing can tell the controller about itself.
pub trait InterruptSource {
    fn irq(&self) -> u8;
    /// Lower is more urgent.
    fn priority(&self) -> u8;
    fn source_name(&self) -> &'static str;
}

/// One pending event. Each kind carries exactly the payload its handler
/// needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// A key came in, already encoded through the character table.
    Keyboard { key: u8 },
    /// The console has something ready to show.
    Console { output: ConsoleOutput },
}

impl InterruptSource for Interrupt {
    fn irq(&self) -> u8 {
        match self {
            Interrupt::Keyboard { .. } => keyboard::IRQ,
            Interrupt::Console { .. } => console::IRQ,
        }
    }
    fn priority(&self) -> u8 {
        match self {
            Interrupt::Keyboard { .. } => keyboard::PRIORITY,
            Interrupt::Console { .. } => console::PRIORITY,
        }
    }
    fn source_name(&self) -> &'static str {
        match self {
            Interrupt::Keyboard { .. } => keyboard::NAME,
            Interrupt::Console { .. } => console::NAME,
        }
    }
}

/// Bookkeeping record for a registered device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub irq: u8,
    pub priority: u8,
    pub name: &'static str,
}

/// Heap entry. Ordered so the max-heap pops the lowest priority value first,
/// and among equals, whoever was posted first.
struct Pending {
    priority: u8,
    sequence: u64,
    event: Interrupt,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Pending {}
impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed on purpose: BinaryHeap is a max-heap
        (other.priority, other.sequence).cmp(&(self.priority, self.sequence))
    }
}

/// The interrupt controller. Devices post, the CPU's interrupt-check phase
/// takes them back out one at a time, most urgent first.
pub struct InterruptController {
    sources: Vec<SourceInfo>,
    queue: BinaryHeap<Pending>,
    next_sequence: u64,
    pulse_debug: bool,
}

impl InterruptController {
    pub fn new() -> InterruptController {
        return InterruptController {
            sources: Vec::new(),
            queue: BinaryHeap::new(),
            next_sequence: 0,
            pulse_debug: false,
        };
    }

    /// Remember a device that can raise interrupts. Does not affect delivery.
    pub fn register_source(&mut self, source: &dyn InterruptSource) {
        debug!(
            target: LOG_TARGET,
            "Registered {} (IRQ {}, priority {})",
            source.source_name(),
            source.irq(),
            source.priority()
        );
        self.sources.push(SourceInfo {
            irq: source.irq(),
            priority: source.priority(),
            name: source.source_name(),
        });
    }

    pub fn sources(&self) -> &[SourceInfo] {
        &self.sources
    }

    /// Queue an event.
    pub fn post(&mut self, event: Interrupt) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        trace!(
            target: LOG_TARGET,
            "{} posted interrupt #{sequence}",
            event.source_name()
        );
        self.queue.push(Pending {
            priority: event.priority(),
            sequence,
            event,
        });
    }

    /// Take the most urgent pending event, if there is one.
    pub fn next(&mut self) -> Option<Interrupt> {
        self.queue.pop().map(|pending| pending.event)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop everything pending. Registered sources stay.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn set_pulse_debug(&mut self, on: bool) {
        self.pulse_debug = on;
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockListener for InterruptController {
    fn pulse(&mut self) {
        if self.pulse_debug {
            trace!(target: LOG_TARGET, "Clock pulse received! ({} pending)", self.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: u8) -> Interrupt {
        Interrupt::Keyboard { key }
    }

    #[test]
    fn console_jumps_ahead_of_keyboard() {
        let mut icu = InterruptController::new();
        icu.post(key(b'a'));
        icu.post(Interrupt::Console {
            output: ConsoleOutput::Register(0x06),
        });
        assert_eq!(icu.len(), 2);
        assert_eq!(icu.next().unwrap().source_name(), "Console");
        assert_eq!(icu.next(), Some(key(b'a')));
        assert_eq!(icu.next(), None);
    }

    #[test]
    fn equal_priorities_come_out_in_post_order() {
        let mut icu = InterruptController::new();
        for k in b"hello" {
            icu.post(key(*k));
        }
        icu.post(Interrupt::Console {
            output: ConsoleOutput::Text("first".to_string()),
        });
        icu.post(Interrupt::Console {
            output: ConsoleOutput::Text("second".to_string()),
        });
        let order: Vec<Interrupt> = std::iter::from_fn(|| icu.next()).collect();
        assert_eq!(
            order,
            vec![
                Interrupt::Console {
                    output: ConsoleOutput::Text("first".to_string())
                },
                Interrupt::Console {
                    output: ConsoleOutput::Text("second".to_string())
                },
                key(b'h'),
                key(b'e'),
                key(b'l'),
                key(b'l'),
                key(b'o'),
            ]
        );
        assert!(icu.is_empty());
    }

    #[test]
    fn events_report_their_source() {
        let event = key(b'x');
        assert_eq!(event.irq(), 1);
        assert_eq!(event.priority(), 4);
        let event = Interrupt::Console {
            output: ConsoleOutput::Register(0),
        };
        assert_eq!(event.irq(), 2);
        assert_eq!(event.priority(), 1);
    }

    #[test]
    fn registration_is_just_bookkeeping() {
        let mut icu = InterruptController::new();
        icu.register_source(&key(0));
        assert_eq!(
            icu.sources(),
            &[SourceInfo {
                irq: 1,
                priority: 4,
                name: "Keyboard"
            }]
        );
        assert_eq!(icu.next(), None);
    }

    #[test]
    fn clear_forgets_pending_events_only() {
        let mut icu = InterruptController::new();
        icu.register_source(&key(0));
        icu.post(key(b'q'));
        icu.clear();
        assert!(icu.is_empty());
        assert_eq!(icu.sources().len(), 1);
    }
}
