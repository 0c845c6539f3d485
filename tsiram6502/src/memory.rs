use log::*;

use crate::{clock::ClockListener, HardwareError, Result};

/// 64 KiB, one byte per address.
pub const ADDRESS_SPACE: usize = 0x10000;

const LOG_TARGET: &str = "RAM";

/// Most invalid-address rows a dump will print past the end of the space.
pub const DUMP_OVERRUN_ROWS: usize = 0x10;

/// The RAM chip. Nothing touches a cell except through the MAR/MDR pair.
pub struct Memory {
    cells: Box<[u8; ADDRESS_SPACE]>,
    /// Memory Address Register
    mar: u16,
    /// Memory Data Register
    mdr: u8,
    pulse_debug: bool,
}

impl Memory {
    pub fn new() -> Memory {
        return Memory {
            cells: Box::new([0; ADDRESS_SPACE]),
            mar: 0x0000,
            mdr: 0x00,
            pulse_debug: false,
        };
    }

    /// Power-on: every cell and both registers zeroed.
    pub fn init(&mut self) {
        self.cells.fill(0x00);
        self.mar = 0x0000;
        self.mdr = 0x00;
    }

    /// Same wipe as `init`.
    pub fn reset(&mut self) {
        self.init();
    }

    /// MDR := cells[MAR]
    pub fn read(&mut self) {
        self.mdr = self.cells[self.mar as usize];
    }

    /// cells[MAR] := MDR
    pub fn write(&mut self) {
        self.cells[self.mar as usize] = self.mdr;
    }

    pub fn set_mar(&mut self, address: u16) {
        self.mar = address;
    }
    pub fn get_mar(&self) -> u16 {
        self.mar
    }
    pub fn set_mdr(&mut self, data: u8) {
        self.mdr = data;
    }
    pub fn get_mdr(&self) -> u8 {
        self.mdr
    }

    pub fn address_space(&self) -> usize {
        self.cells.len()
    }

    pub fn set_pulse_debug(&mut self, on: bool) {
        self.pulse_debug = on;
    }

    /// Look at a cell without going through MAR/MDR. This is for the display
    /// and dump paths only; the pipeline never calls it.
    pub fn peek(&self, address: usize) -> Result<u8> {
        self.cells
            .get(address)
            .copied()
            .ok_or(HardwareError::AddressOutOfRange { address })
    }

    /// One-line description of a single cell.
    pub fn display_memory(&self, address: usize) -> String {
        match self.peek(address) {
            Ok(value) => format!("Address: 0x{address:04X} Contains Value: 0x{value:02X}"),
            Err(_) => format!(
                "Address: 0x{address:04X} Contains Value: ERR [Memory Access]: Address Invalid"
            ),
        }
    }

    /// The dump table, one line per address from `start` to `end` inclusive.
    /// Addresses past the end of the space get an error row instead of a
    /// value, but only up to `DUMP_OVERRUN_ROWS` of them.
    pub fn dump_lines(&self, start: usize, end: usize) -> Vec<String> {
        let end = end.min(ADDRESS_SPACE - 1 + DUMP_OVERRUN_ROWS);
        let start = start.min(end.saturating_add(1));
        let mut lines = Vec::with_capacity(end + 1 - start + 4);
        lines.push("Memory Dump: Debug".to_string());
        lines.push("------------------------".to_string());
        for address in start..=end {
            lines.push(match self.peek(address) {
                Ok(value) => format!("Addr {address:04X}:    | {value:02X}"),
                Err(_) => format!("Addr {address:04X}:    | ERR [Memory Access]: Address Invalid"),
            });
        }
        lines.push("------------------------".to_string());
        lines.push("Memory Dump: Complete".to_string());
        lines
    }

    /// Print the dump table to the log.
    pub fn memory_dump(&self, start: usize, end: usize) {
        for line in self.dump_lines(start, end) {
            info!(target: LOG_TARGET, "{line}");
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockListener for Memory {
    fn pulse(&mut self) {
        if self.pulse_debug {
            trace!(target: LOG_TARGET, "Received clock pulse");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_only_move_through_the_registers() {
        let mut memory = Memory::new();
        memory.set_mar(0x1234);
        memory.set_mdr(0xAB);
        memory.write();
        assert_eq!(memory.peek(0x1234).unwrap(), 0xAB);

        memory.set_mdr(0x00);
        memory.read();
        assert_eq!(memory.get_mdr(), 0xAB);
    }

    #[test]
    fn reset_wipes_cells_and_registers() {
        let mut memory = Memory::new();
        memory.set_mar(0xFFFF);
        memory.set_mdr(0x42);
        memory.write();
        memory.reset();
        assert_eq!(memory.get_mar(), 0);
        assert_eq!(memory.get_mdr(), 0);
        assert_eq!(memory.peek(0xFFFF).unwrap(), 0);
    }

    #[test]
    fn peek_past_the_end_is_an_error() {
        let memory = Memory::new();
        assert_eq!(memory.address_space(), 65536);
        assert!(matches!(
            memory.peek(0x10000),
            Err(HardwareError::AddressOutOfRange { address: 0x10000 })
        ));
    }

    #[test]
    fn dumping_does_not_disturb_mar_or_mdr() {
        let mut memory = Memory::new();
        memory.set_mar(0x0003);
        memory.set_mdr(0x99);
        memory.write();
        memory.set_mar(0x0777);
        memory.set_mdr(0x11);
        let lines = memory.dump_lines(0x0000, 0x0004);
        assert_eq!(lines.len(), 5 + 4);
        assert_eq!(lines[2], "Addr 0000:    | 00");
        assert_eq!(lines[5], "Addr 0003:    | 99");
        assert_eq!(memory.get_mar(), 0x0777);
        assert_eq!(memory.get_mdr(), 0x11);
    }

    #[test]
    fn init_zeroes_the_registers_too() {
        let mut memory = Memory::new();
        memory.set_mar(0x0100);
        memory.set_mdr(0x5A);
        memory.write();
        memory.init();
        assert_eq!(memory.get_mar(), 0);
        assert_eq!(memory.get_mdr(), 0);
        assert_eq!(memory.peek(0x0100).unwrap(), 0);
    }

    #[test]
    fn dumps_past_the_end_are_clamped() {
        let memory = Memory::new();
        let lines = memory.dump_lines(0xFFFE, usize::MAX);
        // 0xFFFE and 0xFFFF, then the overrun rows, plus header and footer
        assert_eq!(lines.len(), 2 + DUMP_OVERRUN_ROWS + 4);
        assert_eq!(lines[3], "Addr FFFF:    | 00");
        assert!(lines[4].ends_with("ERR [Memory Access]: Address Invalid"));

        let lines = memory.dump_lines(usize::MAX, usize::MAX);
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn display_reports_invalid_addresses() {
        let memory = Memory::new();
        assert_eq!(
            memory.display_memory(0x0010),
            "Address: 0x0010 Contains Value: 0x00"
        );
        assert!(memory
            .display_memory(0x12345)
            .ends_with("ERR [Memory Access]: Address Invalid"));
    }
}
