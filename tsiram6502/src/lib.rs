use std::{
    cell::{Ref, RefCell, RefMut},
    io::Write,
    rc::Rc,
    time::Duration,
};

use log::*;
use thiserror::Error;

pub mod ascii;
pub mod clock;
pub mod cpu;
pub mod devices;
pub mod image;
pub mod interrupts;
pub mod memory;
pub mod mmu;

use clock::{Clock, ClockStop, HaltHandle};
use cpu::Cpu;
use devices::{Console, Keyboard};
use interrupts::InterruptController;
use memory::Memory;
use mmu::Mmu;

const LOG_TARGET: &str = "SYS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    #[error("address {address:#06X} is outside the address space")]
    AddressOutOfRange { address: usize },
    #[error("address bytes not both set (HOB {hob:02X?}, LOB {lob:02X?})")]
    AddressNotComposed { hob: Option<u8>, lob: Option<u8> },
    #[error("program of {length} bytes at {start:#06X} runs past the end of memory")]
    ProgramOverrun { start: u16, length: usize },
    #[error("invalid opcode {opcode:#04X}")]
    InvalidInstruction { opcode: u8 },
    #[error("no system call {x:#04X}")]
    UnknownSystemCall { x: u8 },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Which diagnostic output is switched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Diagnostics {
    /// Log the CPU status line every pulse.
    pub status: bool,
    /// Log discarded instructions.
    pub errors: bool,
    /// Log every serviced interrupt.
    pub interrupts: bool,
    /// Every listener logs each pulse it gets.
    pub pulses: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            status: false,
            errors: true,
            interrupts: false,
            pulses: false,
        }
    }
}

/// The whole machine, wired up. Memory sits behind the MMU; the console and
/// CPU share the MMU and the interrupt controller.
pub struct Computer {
    memory: Rc<RefCell<Memory>>,
    mmu: Rc<RefCell<Mmu>>,
    interrupts: Rc<RefCell<InterruptController>>,
    console: Rc<RefCell<Console>>,
    keyboard: Keyboard,
    cpu: Rc<RefCell<Cpu>>,
    clock: Clock,
}

impl Computer {
    /// Build every component and hook them up. Console output goes to
    /// `screen`.
    pub fn new(screen: Box<dyn Write>, diagnostics: Diagnostics) -> Computer {
        let memory = Rc::new(RefCell::new(Memory::new()));
        memory.borrow_mut().init();
        debug!(target: LOG_TARGET, "Memory created");
        let mmu = Rc::new(RefCell::new(Mmu::new(memory.clone())));
        debug!(target: LOG_TARGET, "MMU created");
        let interrupts = Rc::new(RefCell::new(InterruptController::new()));
        debug!(target: LOG_TARGET, "Interrupt controller created");
        let console = Rc::new(RefCell::new(Console::new(
            mmu.clone(),
            interrupts.clone(),
            screen,
        )));
        let keyboard = Keyboard::new(interrupts.clone());
        {
            let mut interrupts = interrupts.borrow_mut();
            interrupts.register_source(&*console.borrow());
            interrupts.register_source(&keyboard);
        }
        let mut clock = Clock::new();
        let cpu = Rc::new(RefCell::new(Cpu::new(
            mmu.clone(),
            console.clone(),
            interrupts.clone(),
            clock.halt_handle(),
            diagnostics,
        )));
        debug!(target: LOG_TARGET, "CPU created");
        // The CPU goes last so it sees this tick's state from everyone else.
        clock.register_listener(memory.clone());
        clock.register_listener(mmu.clone());
        clock.register_listener(interrupts.clone());
        clock.register_listener(cpu.clone());
        let mut computer = Computer {
            memory,
            mmu,
            interrupts,
            console,
            keyboard,
            cpu,
            clock,
        };
        computer.set_pulse_debug(diagnostics.pulses);
        return computer;
    }

    /// One clock tick.
    pub fn tick(&mut self) {
        self.clock.tick();
    }

    /// Run the clock until something halts it or `limit` ticks go by.
    /// `between_ticks` gets the keyboard before every tick, which is where
    /// typed keys are supposed to come in.
    pub fn run<F: FnMut(&mut Keyboard)>(
        &mut self,
        interval: Duration,
        limit: Option<u64>,
        mut between_ticks: F,
    ) -> ClockStop {
        let keyboard = &mut self.keyboard;
        self.clock
            .run(interval, limit, || between_ticks(&mut *keyboard))
    }

    /// As fast as possible, no input.
    pub fn run_until_halt(&mut self, max_ticks: u64) -> ClockStop {
        self.run(Duration::ZERO, Some(max_ticks), |_| ())
    }

    pub fn load_program(&mut self, program: &[u8], start: u16) -> Result<()> {
        self.cpu.borrow_mut().load_static_program(program, start)
    }

    /// Wipe memory, zero the registers, and let the clock run again.
    pub fn reset(&mut self) {
        self.mmu.borrow_mut().reset();
        self.cpu.borrow_mut().reset();
        self.console.borrow_mut().reset();
        self.interrupts.borrow_mut().clear();
        self.clock.resume();
    }

    pub fn set_pulse_debug(&mut self, on: bool) {
        self.memory.borrow_mut().set_pulse_debug(on);
        self.mmu.borrow_mut().set_pulse_debug(on);
        self.interrupts.borrow_mut().set_pulse_debug(on);
        self.clock.set_pulse_debug(on);
        let mut cpu = self.cpu.borrow_mut();
        let mut diagnostics = cpu.get_diagnostics();
        diagnostics.pulses = on;
        cpu.set_diagnostics(diagnostics);
    }

    /// Lets something outside the clock (a terminal reader) stop the
    /// machine.
    pub fn halt_handle(&self) -> HaltHandle {
        self.clock.halt_handle()
    }

    pub fn is_halted(&self) -> bool {
        self.clock.is_halted()
    }

    pub fn get_ticks(&self) -> u64 {
        self.clock.get_ticks()
    }

    pub fn get_cpu(&self) -> Ref<'_, Cpu> {
        self.cpu.borrow()
    }
    pub fn get_cpu_mut(&self) -> RefMut<'_, Cpu> {
        self.cpu.borrow_mut()
    }
    pub fn get_mmu(&self) -> Ref<'_, Mmu> {
        self.mmu.borrow()
    }
    pub fn get_mmu_mut(&self) -> RefMut<'_, Mmu> {
        self.mmu.borrow_mut()
    }
    pub fn get_interrupts(&self) -> Ref<'_, InterruptController> {
        self.interrupts.borrow()
    }
    pub fn get_console(&self) -> Ref<'_, Console> {
        self.console.borrow()
    }
    pub fn get_keyboard(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }
    pub fn get_clock(&self) -> &Clock {
        &self.clock
    }
}
