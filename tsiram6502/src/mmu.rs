use std::{cell::RefCell, rc::Rc};

use log::*;

use crate::{clock::ClockListener, memory::Memory, HardwareError, Result};

const LOG_TARGET: &str = "MMU";

/// The address unit. Builds 16-bit addresses out of two bytes that arrive on
/// separate pulses, and is the only thing allowed to drive Memory's MAR/MDR.
pub struct Mmu {
    memory: Rc<RefCell<Memory>>,
    /// High Order Byte. `None` means "not specified yet", not zero.
    hob: Option<u8>,
    /// Low Order Byte.
    lob: Option<u8>,
    pulse_debug: bool,
}

impl Mmu {
    pub fn new(memory: Rc<RefCell<Memory>>) -> Mmu {
        return Mmu {
            memory,
            hob: None,
            lob: None,
            pulse_debug: false,
        };
    }

    pub fn set_lob(&mut self, data: u8) {
        self.lob = Some(data);
    }
    pub fn set_hob(&mut self, data: u8) {
        self.hob = Some(data);
    }
    pub fn get_lob(&self) -> Option<u8> {
        self.lob
    }
    pub fn get_hob(&self) -> Option<u8> {
        self.hob
    }

    /// Forget both halves of the pending address.
    pub fn clear_address_bytes(&mut self) {
        self.hob = None;
        self.lob = None;
    }

    /// (HOB << 8) | LOB. Both halves have to be there.
    pub fn compose_address(&self) -> Result<u16> {
        match (self.hob, self.lob) {
            (Some(hob), Some(lob)) => Ok(u16::from_be_bytes([hob, lob])),
            (hob, lob) => Err(HardwareError::AddressNotComposed { hob, lob }),
        }
    }

    /// Where a register-mediated access should land: the composed address if
    /// one was specified, or `None` to reuse whatever is already in the MAR.
    fn pending_address(&self) -> Result<Option<u16>> {
        if self.hob.is_none() && self.lob.is_none() {
            return Ok(None);
        }
        self.compose_address().map(Some)
    }

    /// Read from the composed address (clearing LOB/HOB afterwards), or from
    /// the current MAR if no address was specified.
    pub fn read_from_memory(&mut self) -> Result<u8> {
        let target = self.pending_address()?;
        let mut memory = self.memory.borrow_mut();
        if let Some(address) = target {
            memory.set_mar(address);
        }
        memory.read();
        if target.is_some() {
            self.hob = None;
            self.lob = None;
        }
        Ok(memory.get_mdr())
    }

    /// Write the MDR to the composed address (clearing LOB/HOB afterwards), or
    /// to the current MAR if no address was specified.
    pub fn write_to_memory(&mut self) -> Result<()> {
        let target = self.pending_address()?;
        let mut memory = self.memory.borrow_mut();
        if let Some(address) = target {
            memory.set_mar(address);
        }
        memory.write();
        if target.is_some() {
            self.hob = None;
            self.lob = None;
        }
        Ok(())
    }

    /// Single-shot read from a fully specified address. LOB/HOB are left
    /// alone.
    pub fn read_immediate(&mut self, address: u16) -> u8 {
        let mut memory = self.memory.borrow_mut();
        memory.set_mar(address);
        memory.read();
        memory.get_mdr()
    }

    /// Single-shot write to a fully specified address. LOB/HOB are left
    /// alone.
    pub fn write_immediate(&mut self, address: u16, data: u8) {
        let mut memory = self.memory.borrow_mut();
        memory.set_mar(address);
        memory.set_mdr(data);
        memory.write();
    }

    /// Flash a program into memory starting at `start`.
    pub fn load_program(&mut self, program: &[u8], start: u16) -> Result<()> {
        if start as usize + program.len() > crate::memory::ADDRESS_SPACE {
            return Err(HardwareError::ProgramOverrun {
                start,
                length: program.len(),
            });
        }
        for (offset, byte) in program.iter().enumerate() {
            self.write_immediate(start + offset as u16, *byte);
        }
        debug!(
            target: LOG_TARGET,
            "Program loaded: {} bytes at ${start:04X}",
            program.len()
        );
        Ok(())
    }

    pub fn set_mar(&mut self, address: u16) {
        self.memory.borrow_mut().set_mar(address);
    }
    pub fn get_mar(&self) -> u16 {
        self.memory.borrow().get_mar()
    }
    pub fn set_mdr(&mut self, data: u8) {
        self.memory.borrow_mut().set_mdr(data);
    }
    pub fn get_mdr(&self) -> u8 {
        self.memory.borrow().get_mdr()
    }

    pub fn reset(&mut self) {
        self.memory.borrow_mut().reset();
        self.clear_address_bytes();
    }

    pub fn memory_dump(&self, start: usize, end: usize) {
        self.memory.borrow().memory_dump(start, end);
    }

    pub fn dump_lines(&self, start: usize, end: usize) -> Vec<String> {
        self.memory.borrow().dump_lines(start, end)
    }

    pub fn display_memory(&self, address: usize) -> String {
        self.memory.borrow().display_memory(address)
    }

    pub fn set_pulse_debug(&mut self, on: bool) {
        self.pulse_debug = on;
    }
}

impl ClockListener for Mmu {
    fn pulse(&mut self) {
        if self.pulse_debug {
            trace!(target: LOG_TARGET, "Received clock pulse");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mmu() -> Mmu {
        Mmu::new(Rc::new(RefCell::new(Memory::new())))
    }

    proptest! {
        #[test]
        fn composed_address_is_hob_then_lob(hob in any::<u8>(), lob in any::<u8>()) {
            let mut mmu = mmu();
            mmu.set_hob(hob);
            mmu.set_lob(lob);
            prop_assert_eq!(mmu.compose_address().unwrap(), hob as u16 * 256 + lob as u16);
            mmu.read_from_memory().unwrap();
            prop_assert!(mmu.compose_address().is_err());
        }
    }

    #[test]
    fn half_an_address_does_not_compose() {
        let mut mmu = mmu();
        assert!(mmu.compose_address().is_err());
        mmu.set_lob(0x10);
        assert!(matches!(
            mmu.compose_address(),
            Err(HardwareError::AddressNotComposed {
                hob: None,
                lob: Some(0x10)
            })
        ));
        // Zero is a real value, not "unset".
        mmu.set_hob(0x00);
        assert_eq!(mmu.compose_address().unwrap(), 0x0010);
    }

    #[test]
    fn register_mediated_write_then_read_round_trips() {
        let mut mmu = mmu();
        mmu.set_lob(0x34);
        mmu.set_hob(0x12);
        mmu.set_mdr(0x5A);
        mmu.write_to_memory().unwrap();
        assert_eq!(mmu.get_lob(), None);
        assert_eq!(mmu.get_hob(), None);
        assert_eq!(mmu.get_mar(), 0x1234);

        mmu.set_mdr(0);
        mmu.set_lob(0x34);
        mmu.set_hob(0x12);
        assert_eq!(mmu.read_from_memory().unwrap(), 0x5A);
    }

    #[test]
    fn unset_address_reuses_the_mar() {
        let mut mmu = mmu();
        mmu.write_immediate(0x0200, 0x07);
        mmu.set_mdr(0x08);
        mmu.write_to_memory().unwrap();
        assert_eq!(mmu.read_immediate(0x0200), 0x08);
        assert_eq!(mmu.read_from_memory().unwrap(), 0x08);
    }

    #[test]
    fn half_set_address_is_refused_without_touching_memory() {
        let mut mmu = mmu();
        mmu.set_mar(0x0042);
        mmu.set_hob(0x01);
        assert!(mmu.read_from_memory().is_err());
        assert!(mmu.write_to_memory().is_err());
        assert_eq!(mmu.get_mar(), 0x0042);
        assert_eq!(mmu.get_hob(), Some(0x01));
    }

    #[test]
    fn immediate_access_leaves_pending_bytes_alone() {
        let mut mmu = mmu();
        mmu.set_lob(0x01);
        mmu.write_immediate(0x0300, 0xEE);
        assert_eq!(mmu.read_immediate(0x0300), 0xEE);
        assert_eq!(mmu.get_lob(), Some(0x01));
    }

    #[test]
    fn load_program_copies_bytes_in_order() {
        let mut mmu = mmu();
        mmu.load_program(&[0xA9, 0x01, 0x00], 0x8000).unwrap();
        assert_eq!(mmu.read_immediate(0x8000), 0xA9);
        assert_eq!(mmu.read_immediate(0x8001), 0x01);
        assert_eq!(mmu.read_immediate(0x8002), 0x00);
        // runs right up to the last byte
        mmu.load_program(&[0x11, 0x22], 0xFFFE).unwrap();
        assert_eq!(mmu.read_immediate(0xFFFF), 0x22);
    }

    #[test]
    fn load_program_refuses_to_run_off_the_end() {
        let mut mmu = mmu();
        assert!(matches!(
            mmu.load_program(&[1, 2, 3], 0xFFFE),
            Err(HardwareError::ProgramOverrun {
                start: 0xFFFE,
                length: 3
            })
        ));
        assert_eq!(mmu.read_immediate(0xFFFE), 0);
    }

    #[test]
    fn reset_forwards_to_memory() {
        let mut mmu = mmu();
        mmu.write_immediate(0x0010, 0x77);
        mmu.set_hob(0x00);
        mmu.reset();
        assert_eq!(mmu.read_immediate(0x0010), 0);
        assert_eq!(mmu.get_hob(), None);
    }
}
