use std::{cell::RefCell, rc::Rc};

use log::*;

use crate::{
    ascii,
    interrupts::{Interrupt, InterruptController, InterruptSource},
};

pub const IRQ: u8 = 1;
/// Arbitrary; every key shares it.
pub const PRIORITY: u8 = 4;
pub const NAME: &str = "Keyboard";

/// Ctrl-C, as the terminal hands it over.
pub const END_OF_TEXT: u8 = 0x03;

const LOG_TARGET: &str = "KBD";

/// The keyboard. Keystrokes show up from outside the clock (a terminal
/// thread, a test); each one is encoded and posted as its own interrupt.
pub struct Keyboard {
    interrupts: Rc<RefCell<InterruptController>>,
    device_debug: bool,
}

impl Keyboard {
    pub fn new(interrupts: Rc<RefCell<InterruptController>>) -> Keyboard {
        return Keyboard {
            interrupts,
            device_debug: false,
        };
    }

    pub fn set_device_debug(&mut self, on: bool) {
        self.device_debug = on;
    }

    /// A key was pressed. Returns the code it was posted as, or `None` if the
    /// character has no place in the table and was dropped.
    pub fn key_pressed(&mut self, key: char) -> Option<u8> {
        let Some(code) = ascii::encode(key) else {
            warn!(target: LOG_TARGET, "Dropping key {key:?}: not a 7-bit character");
            return None;
        };
        if self.device_debug {
            info!(target: LOG_TARGET, "Key pressed - {}", ascii::describe(code));
        }
        self.interrupts
            .borrow_mut()
            .post(Interrupt::Keyboard { key: code });
        Some(code)
    }
}

impl InterruptSource for Keyboard {
    fn irq(&self) -> u8 {
        IRQ
    }
    fn priority(&self) -> u8 {
        PRIORITY
    }
    fn source_name(&self) -> &'static str {
        NAME
    }
}
