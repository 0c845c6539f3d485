use std::{
    cell::RefCell,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Write,
    rc::Rc,
};

use log::*;

use crate::{
    ascii,
    interrupts::{Interrupt, InterruptController, InterruptSource},
    mmu::Mmu,
};

pub const IRQ: u8 = 2;
/// Output to the console is very important.
pub const PRIORITY: u8 = 1;
pub const NAME: &str = "Console";

const LOG_TARGET: &str = "CON";
const STRING_TERMINATOR: u8 = 0x00;

/// One displayable unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleOutput {
    /// Contents of a register, shown as hex.
    Register(u8),
    /// A whole string that was assembled out of memory.
    Text(String),
}

impl Display for ConsoleOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ConsoleOutput::Register(value) => write!(f, "0x{value:02X}"),
            ConsoleOutput::Text(text) => write!(f, "{text}"),
        }
    }
}

/// The console output device. The CPU hands it things to show; it raises an
/// interrupt for each one and shows it when the CPU gets around to servicing
/// that interrupt.
pub struct Console {
    mmu: Rc<RefCell<Mmu>>,
    interrupts: Rc<RefCell<InterruptController>>,
    /// Characters of the string currently being assembled.
    string_builder: String,
    /// How far past the starting address the next string byte is.
    offset: u16,
    output: Box<dyn Write>,
}

impl Console {
    pub fn new(
        mmu: Rc<RefCell<Mmu>>,
        interrupts: Rc<RefCell<InterruptController>>,
        output: Box<dyn Write>,
    ) -> Console {
        return Console {
            mmu,
            interrupts,
            string_builder: String::new(),
            offset: 0,
            output,
        };
    }

    /// Take something to display, and raise the interrupt that will get it
    /// displayed.
    pub fn accept_output(&mut self, output: ConsoleOutput) {
        debug!(target: LOG_TARGET, "Accepted output: {output:?}");
        self.interrupts
            .borrow_mut()
            .post(Interrupt::Console { output });
    }

    /// Pull in one more byte of the NUL-terminated string at `start`. The
    /// caller keeps passing the same `start`; we track the offset ourselves.
    ///
    /// Returns true once the terminator is read, at which point the whole
    /// string has been handed to `accept_output`.
    pub fn output_string(&mut self, start: u16) -> bool {
        let address = start.wrapping_add(self.offset);
        let next_byte = self.mmu.borrow_mut().read_immediate(address);
        if next_byte == STRING_TERMINATOR {
            let text = std::mem::take(&mut self.string_builder);
            self.offset = 0;
            self.accept_output(ConsoleOutput::Text(text));
            return true;
        }
        match ascii::decode(next_byte) {
            Some(character) => self.string_builder.push(character),
            None => {
                warn!(
                    target: LOG_TARGET,
                    "Byte ${next_byte:02X} at ${address:04X} is not in the character table"
                );
                self.string_builder.push(char::REPLACEMENT_CHARACTER);
            }
        }
        self.offset = self.offset.wrapping_add(1);
        return false;
    }

    /// Drop any half-assembled string.
    pub fn reset(&mut self) {
        self.string_builder.clear();
        self.offset = 0;
    }

    /// True while a string is partway assembled.
    pub fn is_assembling(&self) -> bool {
        self.offset != 0
    }

    /// Actually put something on the screen.
    pub fn display(&mut self, output: &ConsoleOutput) {
        let result = writeln!(self.output, "{output}").and_then(|_| self.output.flush());
        if let Err(error) = result {
            warn!(target: LOG_TARGET, "Could not display {output:?}: {error}");
        }
    }
}

/// A `Write` sink that can be cloned and read back later. Lets an embedder
/// (or a test) see what the console showed.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl InterruptSource for Console {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    fn console() -> (Console, Rc<RefCell<Mmu>>, Rc<RefCell<InterruptController>>, SharedBuffer) {
        let mmu = Rc::new(RefCell::new(Mmu::new(Rc::new(RefCell::new(Memory::new())))));
        let interrupts = Rc::new(RefCell::new(InterruptController::new()));
        let screen = SharedBuffer::default();
        let console = Console::new(mmu.clone(), interrupts.clone(), Box::new(screen.clone()));
        (console, mmu, interrupts, screen)
    }

    #[test]
    fn accepting_output_raises_a_console_interrupt() {
        let (mut console, _, interrupts, _) = console();
        console.accept_output(ConsoleOutput::Register(0x2A));
        let event = interrupts.borrow_mut().next().unwrap();
        assert_eq!(event.priority(), 1);
        assert_eq!(event.source_name(), "Console");
        assert_eq!(
            event,
            Interrupt::Console {
                output: ConsoleOutput::Register(0x2A)
            }
        );
    }

    #[test]
    fn strings_come_in_one_byte_per_call() {
        let (mut console, mmu, interrupts, _) = console();
        mmu.borrow_mut()
            .load_program(b"Hi!\0junk", 0x0040)
            .unwrap();
        assert!(!console.output_string(0x0040));
        assert!(!console.output_string(0x0040));
        assert!(!console.output_string(0x0040));
        assert!(console.is_assembling());
        assert!(interrupts.borrow().is_empty());
        assert!(console.output_string(0x0040));
        assert!(!console.is_assembling());

        let mut interrupts = interrupts.borrow_mut();
        assert_eq!(
            interrupts.next(),
            Some(Interrupt::Console {
                output: ConsoleOutput::Text("Hi!".to_string())
            })
        );
        assert_eq!(interrupts.next(), None);
    }

    #[test]
    fn reset_abandons_a_partial_string() {
        let (mut console, mmu, interrupts, _) = console();
        mmu.borrow_mut().load_program(b"stale\0", 0x0040).unwrap();
        mmu.borrow_mut().load_program(b"new\0", 0x0080).unwrap();
        console.output_string(0x0040);
        console.output_string(0x0040);
        console.reset();
        assert!(!console.is_assembling());
        while !console.output_string(0x0080) {}
        assert_eq!(
            interrupts.borrow_mut().next(),
            Some(Interrupt::Console {
                output: ConsoleOutput::Text("new".to_string())
            })
        );
    }

    #[test]
    fn empty_string_finishes_immediately() {
        let (mut console, _, interrupts, _) = console();
        assert!(console.output_string(0x1000));
        assert_eq!(
            interrupts.borrow_mut().next(),
            Some(Interrupt::Console {
                output: ConsoleOutput::Text(String::new())
            })
        );
    }

    #[test]
    fn display_formats_registers_as_hex() {
        let (mut console, _, _, screen) = console();
        console.display(&ConsoleOutput::Register(0x06));
        console.display(&ConsoleOutput::Text("6502".to_string()));
        assert_eq!(screen.contents(), "0x06\n6502\n");
    }
}
