use std::{
    cell::RefCell,
    fmt::{Debug, Formatter, Result as FmtResult},
    rc::Rc,
};

use log::*;

use crate::{
    ascii,
    clock::{ClockListener, HaltHandle},
    devices::{Console, ConsoleOutput},
    interrupts::{Interrupt, InterruptController, InterruptSource},
    mmu::Mmu,
    Diagnostics, HardwareError, Result,
};

mod instructions;
pub use instructions::*;

const LOG_TARGET: &str = "CPU";

/// Range the `m` key dumps.
const KEY_DUMP_START: usize = 0x0000;
const KEY_DUMP_END: usize = 0x0020;

const KEY_TOGGLE_DEBUG: u8 = b'd';
const KEY_HELLO: u8 = b'h';
const KEY_MEMORY_DUMP: u8 = b'm';

/// Where the pipeline is. One pulse moves it at most one phase (except that
/// an implied instruction's decode-1 runs its execute-1 on the same pulse).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Step {
    Fetch = 0,
    Decode1 = 1,
    Decode2 = 2,
    Execute1 = 3,
    Execute2 = 4,
    WriteBack = 5,
    InterruptCheck = 6,
}

impl Step {
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Which half of a two-pulse decode or execute we're in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    First,
    Second,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Running instructions.
    Normal = 0,
    /// Servicing an interrupt.
    Kernel = 1,
}

pub struct Cpu {
    /// The accumulator. Where math operations can happen.
    a: u8,
    /// Index register #1. Also picks which system call runs.
    x: u8,
    /// Index register #2.
    y: u8,
    /// The program counter.
    pc: u16,
    /// The instruction register: opcode currently in flight.
    ir: u8,
    /// What `ir` decoded to, looked up once at fetch.
    instruction: Option<Instruction>,
    /// Set by compare when the operands matched.
    z_flag: bool,
    step: Step,
    mode: Mode,
    /// Scratch space to carry an operand from decode into execute.
    temp_store: u8,
    cycle_count: u64,
    mmu: Rc<RefCell<Mmu>>,
    console: Rc<RefCell<Console>>,
    interrupts: Rc<RefCell<InterruptController>>,
    halt: HaltHandle,
    diagnostics: Diagnostics,
}

impl Debug for Cpu {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "Mode:{mode} PC:{pc:04X} IR:{ir:02X} A:{a:02X} X:{x:02X} Y:{y:02X} Z:{z} Step:{step}",
            mode = self.mode as u8,
            pc = self.pc,
            ir = self.ir,
            a = self.a,
            x = self.x,
            y = self.y,
            z = self.z_flag as u8,
            step = self.step.index(),
        )
    }
}

impl Cpu {
    pub fn new(
        mmu: Rc<RefCell<Mmu>>,
        console: Rc<RefCell<Console>>,
        interrupts: Rc<RefCell<InterruptController>>,
        halt: HaltHandle,
        diagnostics: Diagnostics,
    ) -> Cpu {
        return Cpu {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            ir: 0,
            instruction: None,
            z_flag: false,
            step: Step::Fetch,
            mode: Mode::Normal,
            temp_store: 0,
            cycle_count: 0,
            mmu,
            console,
            interrupts,
            halt,
            diagnostics,
        };
    }

    /// Registers back to zero, pipeline back to fetch.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.pc = 0;
        self.ir = 0;
        self.instruction = None;
        self.z_flag = false;
        self.step = Step::Fetch;
        self.mode = Mode::Normal;
        self.temp_store = 0;
    }

    /// Flash a program into memory through the MMU.
    pub fn load_static_program(&mut self, program: &[u8], start: u16) -> Result<()> {
        self.mmu.borrow_mut().load_program(program, start)
    }

    fn read_pc_and_post_inc(&mut self) -> u8 {
        let value = self.mmu.borrow_mut().read_immediate(self.pc);
        self.pc = self.pc.wrapping_add(1);
        return value;
    }

    /// Register-mediated read of whatever address decode set up.
    fn read_operand(&mut self) -> Result<u8> {
        self.mmu.borrow_mut().read_from_memory()
    }

    /// Advance the pipeline by one phase.
    fn pipeline(&mut self) {
        let result = match self.step {
            Step::Fetch => {
                self.fetch();
                Ok(())
            }
            Step::Decode1 => self.decode(Phase::First),
            Step::Decode2 => self.decode(Phase::Second),
            Step::Execute1 => self.execute(Phase::First),
            Step::Execute2 => self.execute(Phase::Second),
            Step::WriteBack => self.write_back(),
            Step::InterruptCheck => {
                self.interrupt_check();
                Ok(())
            }
        };
        if let Err(error) = result {
            // Throw the instruction away and carry on.
            if self.diagnostics.errors {
                error!(
                    target: LOG_TARGET,
                    "ERROR: {error} (IR {:02X}, PC {:04X})", self.ir, self.pc
                );
            }
            self.step = Step::InterruptCheck;
        }
    }

    /// IR := mem[PC], PC += 1. Every instruction needs decode-1 next.
    fn fetch(&mut self) {
        let address = self.pc;
        self.ir = self.read_pc_and_post_inc();
        self.instruction = Instruction::from_opcode(self.ir);
        if let Some(instruction) = self.instruction {
            trace!(
                target: LOG_TARGET,
                "{address:04X}: {:02X} {}",
                self.ir,
                instruction.mnemonic()
            );
        }
        self.step = Step::Decode1;
    }

    fn current_instruction(&self) -> Result<Instruction> {
        self.instruction
            .ok_or(HardwareError::InvalidInstruction { opcode: self.ir })
    }

    fn decode(&mut self, phase: Phase) -> Result<()> {
        let instruction = self.current_instruction()?;
        match instruction.decode_shape(self.x) {
            DecodeShape::Constant => {
                self.temp_store = self.read_pc_and_post_inc();
                // decode-2 not needed
                self.step = Step::Execute1;
            }
            DecodeShape::Address => {
                let byte = self.read_pc_and_post_inc();
                let mut mmu = self.mmu.borrow_mut();
                match phase {
                    Phase::First => {
                        mmu.set_lob(byte);
                        self.step = Step::Decode2;
                    }
                    Phase::Second => {
                        mmu.set_hob(byte);
                        self.step = Step::Execute1;
                    }
                }
            }
            DecodeShape::Implied => {
                // Don't waste a pulse on a decode that has nothing to do.
                self.step = Step::Execute1;
                return self.execute(Phase::First);
            }
        }
        Ok(())
    }

    fn execute(&mut self, phase: Phase) -> Result<()> {
        use Instruction::*;
        let instruction = self.current_instruction()?;
        match (instruction, phase) {
            (LoadAccumulatorConstant, _) => {
                self.a = self.temp_store;
                self.step = Step::InterruptCheck;
            }
            (LoadAccumulatorMemory, _) => {
                self.a = self.read_operand()?;
                self.step = Step::InterruptCheck;
            }
            (StoreAccumulator, _) => {
                // the write itself happens in write-back
                self.step = Step::WriteBack;
            }
            (TransferXToAccumulator, _) => {
                self.a = self.x;
                self.step = Step::InterruptCheck;
            }
            (TransferYToAccumulator, _) => {
                self.a = self.y;
                self.step = Step::InterruptCheck;
            }
            (AddWithCarry, Phase::First) => {
                self.temp_store = self.read_operand()?;
                self.step = Step::Execute2;
            }
            (AddWithCarry, Phase::Second) => {
                // Anything past 8 bits just falls off. There is no carry flag
                // to put it in.
                self.a = self.a.wrapping_add(self.temp_store);
                self.step = Step::InterruptCheck;
            }
            (LoadXConstant, _) => {
                self.x = self.temp_store;
                self.step = Step::InterruptCheck;
            }
            (LoadXMemory, _) => {
                self.x = self.read_operand()?;
                self.step = Step::InterruptCheck;
            }
            (TransferAccumulatorToX, _) => {
                self.x = self.a;
                self.step = Step::InterruptCheck;
            }
            (LoadYConstant, _) => {
                self.y = self.temp_store;
                self.step = Step::InterruptCheck;
            }
            (LoadYMemory, _) => {
                self.y = self.read_operand()?;
                self.step = Step::InterruptCheck;
            }
            (TransferAccumulatorToY, _) => {
                self.y = self.a;
                self.step = Step::InterruptCheck;
            }
            (NoOperation, _) => {
                self.step = Step::InterruptCheck;
            }
            (Break, _) => {
                info!(
                    target: LOG_TARGET,
                    "Executed a BRK instruction at {:04X}, halting",
                    self.pc.wrapping_sub(1)
                );
                self.halt.request();
            }
            (CompareX, Phase::First) => {
                self.temp_store = self.read_operand()?;
                self.step = Step::Execute2;
            }
            (CompareX, Phase::Second) => {
                self.z_flag = self.temp_store == self.x;
                self.step = Step::InterruptCheck;
            }
            (BranchNotEqual, _) => {
                if !self.z_flag {
                    // casting it to a signed 8-bit integer first means that,
                    // when we go to cast it to a u16 below, Rust will "sign
                    // extend" it
                    // offset 0x7F -> PC + 127
                    // offset 0x80 -> PC - 128
                    // offset 0xFE -> PC - 2
                    let offset = self.temp_store as i8;
                    self.pc = self.pc.wrapping_add(offset as u16);
                }
                self.step = Step::InterruptCheck;
            }
            (Increment, Phase::First) => {
                // staged through the accumulator
                self.a = self.read_operand()?;
                self.step = Step::Execute2;
            }
            (Increment, Phase::Second) => {
                self.a = self.a.wrapping_add(1);
                self.step = Step::WriteBack;
            }
            (SystemCall, phase) => self.system_call(phase)?,
        }
        Ok(())
    }

    fn system_call(&mut self, phase: Phase) -> Result<()> {
        match (self.x, phase) {
            (SYSCALL_PRINT_Y, _) => {
                self.console
                    .borrow_mut()
                    .accept_output(ConsoleOutput::Register(self.y));
                self.step = Step::InterruptCheck;
            }
            (SYSCALL_PRINT_STRING_IN_PAGE, Phase::First) => {
                // The page comes from wherever we're running.
                let [_, page] = self.pc.to_le_bytes();
                self.mmu.borrow_mut().set_hob(page);
                self.step = Step::Execute2;
            }
            (SYSCALL_PRINT_STRING_IN_PAGE, Phase::Second) => {
                let start = {
                    let mut mmu = self.mmu.borrow_mut();
                    mmu.set_lob(self.y);
                    mmu.compose_address()?
                };
                self.continue_string_output(start);
            }
            (SYSCALL_PRINT_STRING_AT_ADDRESS, _) => {
                let start = self.mmu.borrow().compose_address()?;
                self.continue_string_output(start);
            }
            (x, _) => return Err(HardwareError::UnknownSystemCall { x }),
        }
        Ok(())
    }

    /// One byte of string output. We stay on this step until the console says
    /// the terminator went by.
    fn continue_string_output(&mut self, start: u16) {
        let finished = self.console.borrow_mut().output_string(start);
        if finished {
            self.mmu.borrow_mut().clear_address_bytes();
            self.step = Step::InterruptCheck;
        }
    }

    /// Commit the accumulator to the address the instruction already set up.
    fn write_back(&mut self) -> Result<()> {
        let mut mmu = self.mmu.borrow_mut();
        mmu.set_mdr(self.a);
        mmu.write_to_memory()?;
        self.step = Step::InterruptCheck;
        Ok(())
    }

    /// Service one pending interrupt per pulse. Only go back to fetch once the
    /// queue is empty.
    fn interrupt_check(&mut self) {
        let pending = self.interrupts.borrow_mut().next();
        let Some(interrupt) = pending else {
            self.mode = Mode::Normal;
            self.step = Step::Fetch;
            return;
        };
        self.mode = Mode::Kernel;
        if self.diagnostics.interrupts {
            info!(
                target: LOG_TARGET,
                "Interrupt received from {} (IRQ {})",
                interrupt.source_name(),
                interrupt.irq()
            );
        }
        match interrupt {
            Interrupt::Keyboard { key } => {
                if self.diagnostics.interrupts {
                    info!(target: LOG_TARGET, "Key: {}", ascii::describe(key));
                }
                self.manage_key_input(key);
            }
            Interrupt::Console { output } => self.console.borrow_mut().display(&output),
        }
    }

    /// Do something about a key the user pressed.
    fn manage_key_input(&mut self, key: u8) {
        match key {
            KEY_TOGGLE_DEBUG => {
                self.diagnostics.status = !self.diagnostics.status;
                info!(
                    target: LOG_TARGET,
                    "Debug Mode toggled to {}", self.diagnostics.status
                );
            }
            KEY_HELLO => info!(target: LOG_TARGET, "Hello! (Input Test)"),
            KEY_MEMORY_DUMP => self.mmu.borrow().memory_dump(KEY_DUMP_START, KEY_DUMP_END),
            _ => (),
        }
    }

    // Ways to inspect the state of the CPU, for debugging and visualization
    // purposes.
    pub fn get_pc(&self) -> u16 {
        self.pc
    }
    pub fn get_a(&self) -> u8 {
        self.a
    }
    pub fn get_x(&self) -> u8 {
        self.x
    }
    pub fn get_y(&self) -> u8 {
        self.y
    }
    pub fn get_ir(&self) -> u8 {
        self.ir
    }
    pub fn get_z_flag(&self) -> bool {
        self.z_flag
    }
    pub fn get_step(&self) -> Step {
        self.step
    }
    pub fn get_mode(&self) -> Mode {
        self.mode
    }
    pub fn get_cycle_count(&self) -> u64 {
        self.cycle_count
    }
    pub fn get_diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }
    pub fn set_diagnostics(&mut self, diagnostics: Diagnostics) {
        self.diagnostics = diagnostics;
    }
    // Real CPUs don't have these capabilities, so we'll feature gate them.
    #[cfg(feature = "override-registers")]
    pub fn set_pc(&mut self, nu: u16) {
        self.pc = nu
    }
    #[cfg(feature = "override-registers")]
    pub fn set_a(&mut self, nu: u8) {
        self.a = nu
    }
    #[cfg(feature = "override-registers")]
    pub fn set_x(&mut self, nu: u8) {
        self.x = nu
    }
    #[cfg(feature = "override-registers")]
    pub fn set_y(&mut self, nu: u8) {
        self.y = nu
    }
    #[cfg(feature = "override-registers")]
    pub fn set_z_flag(&mut self, nu: bool) {
        self.z_flag = nu
    }
}

impl ClockListener for Cpu {
    fn pulse(&mut self) {
        self.cycle_count += 1;
        if self.diagnostics.pulses {
            trace!(
                target: LOG_TARGET,
                "Received clock pulse - CPU Clock Count: {}",
                self.cycle_count
            );
        }
        if self.diagnostics.status {
            info!(target: LOG_TARGET, "CPU State | {self:?}");
        }
        self.pipeline();
    }
}
