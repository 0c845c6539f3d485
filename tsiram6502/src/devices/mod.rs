//! Interrupt-capable devices that sit outside the pipeline and talk to it
//! through the interrupt controller.

pub mod console;
pub mod keyboard;

pub use console::{Console, ConsoleOutput, SharedBuffer};
pub use keyboard::Keyboard;
