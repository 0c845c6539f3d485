/// How an instruction gets its operand during decode. Every instruction has
/// exactly one of these, and it never depends on what the operand turns out
/// to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeShape {
    /// One byte at PC goes into the temp store; decode-2 is skipped.
    Constant,
    /// LOB on decode-1, HOB on decode-2.
    Address,
    /// Nothing to decode; execute runs on the same pulse decode-1 would have.
    Implied,
}

/// System call selectors, picked by the X register.
pub const SYSCALL_PRINT_Y: u8 = 0x01;
pub const SYSCALL_PRINT_STRING_IN_PAGE: u8 = 0x02;
pub const SYSCALL_PRINT_STRING_AT_ADDRESS: u8 = 0x03;

macro_rules! instruction_set {
    (
        $(
            $(#[$doc:meta])*
            $opcode:literal => $name:ident, $mnemonic:literal, $shape:ident;
        )*
    ) => {
        /// Every instruction this CPU knows. Anything else is an invalid
        /// opcode.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name,
            )*
        }

        impl Instruction {
            pub fn from_opcode(opcode: u8) -> Option<Instruction> {
                match opcode {
                    $($opcode => Some(Instruction::$name),)*
                    _ => None,
                }
            }
            pub fn opcode(self) -> u8 {
                match self {
                    $(Instruction::$name => $opcode,)*
                }
            }
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Instruction::$name => $mnemonic,)*
                }
            }
            fn base_shape(self) -> DecodeShape {
                match self {
                    $(Instruction::$name => DecodeShape::$shape,)*
                }
            }
        }
    };
}

instruction_set! {
    /// LoaD Accumulator with a constant
    0xA9 => LoadAccumulatorConstant, "LDA #", Constant;
    /// LoaD Accumulator from memory
    0xAD => LoadAccumulatorMemory, "LDA abs", Address;
    /// STore Accumulator to memory
    0x8D => StoreAccumulator, "STA abs", Address;
    /// Transfer X to Accumulator
    0x8A => TransferXToAccumulator, "TXA", Implied;
    /// Transfer Y to Accumulator
    0x98 => TransferYToAccumulator, "TYA", Implied;
    /// ADd with Carry (no carry is actually kept)
    0x6D => AddWithCarry, "ADC abs", Address;
    /// LoaD X with a constant
    0xA2 => LoadXConstant, "LDX #", Constant;
    /// LoaD X from memory
    0xAE => LoadXMemory, "LDX abs", Address;
    /// Transfer Accumulator to X
    0xAA => TransferAccumulatorToX, "TAX", Implied;
    /// LoaD Y with a constant
    0xA0 => LoadYConstant, "LDY #", Constant;
    /// LoaD Y from memory
    0xAC => LoadYMemory, "LDY abs", Address;
    /// Transfer Accumulator to Y
    0xA8 => TransferAccumulatorToY, "TAY", Implied;
    /// No OPeration
    0xEA => NoOperation, "NOP", Implied;
    /// BReaK: halts the whole machine
    0x00 => Break, "BRK", Implied;
    /// ComPare memory with X, setting Z if equal
    0xEC => CompareX, "CPX abs", Address;
    /// Branch if Not Equal (Z is clear)
    0xD0 => BranchNotEqual, "BNE", Constant;
    /// INCrement a byte in memory
    0xEE => Increment, "INC abs", Address;
    /// SYStem call, dispatched on X
    0xFF => SystemCall, "SYS", Implied;
}

impl Instruction {
    /// The decode shape, given the X register at decode time. Only the system
    /// call looks at X: the print-string-at-address call carries a two-byte
    /// address, the others carry nothing.
    pub fn decode_shape(self, x: u8) -> DecodeShape {
        match self {
            Instruction::SystemCall if x == SYSCALL_PRINT_STRING_AT_ADDRESS => {
                DecodeShape::Address
            }
            _ => self.base_shape(),
        }
    }
}
