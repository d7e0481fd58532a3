//! RAM-backed NOR flash simulator for tests.
//!
//! Models the semantics the log depends on: erase resets whole aligned units
//! to all-ones, and programming can only clear bits, so writes apply a
//! bitwise AND. Operations are counted and single faults can be injected to
//! exercise error paths.

use alloc::vec;
use alloc::vec::Vec;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

/// Which operation the next injected fault should hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Read,
    Write,
    Erase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFlashError {
    OutOfBounds,
    NotAligned,
    /// Fault requested through [`MemFlash::fail_next`].
    Injected,
}

impl NorFlashError for MemFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            MemFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            MemFlashError::NotAligned => NorFlashErrorKind::NotAligned,
            MemFlashError::Injected => NorFlashErrorKind::Other,
        }
    }
}

/// In-memory flash with byte reads, 4-byte write words and 4096-byte erase
/// units, the geometry of an ESP32-class NOR device.
#[derive(Debug)]
pub struct MemFlash {
    data: Vec<u8>,
    fail_next: Option<FaultOp>,
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
}

impl MemFlash {
    /// A fully erased flash of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            fail_next: None,
            reads: 0,
            writes: 0,
            erases: 0,
        }
    }

    /// Make the next operation of the given kind fail once.
    pub fn fail_next(&mut self, op: FaultOp) {
        self.fail_next = Some(op);
    }

    /// Raw flash contents, for asserting on-flash layout.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw mutable contents; a backdoor past the NOR programming rules for
    /// staging test fixtures such as partition tables.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn take_fault(&mut self, op: FaultOp) -> Result<(), MemFlashError> {
        if self.fail_next == Some(op) {
            self.fail_next = None;
            return Err(MemFlashError::Injected);
        }
        Ok(())
    }

    fn check_range(&self, offset: u32, len: usize, align: usize) -> Result<(), MemFlashError> {
        let offset = offset as usize;
        if offset % align != 0 || len % align != 0 {
            return Err(MemFlashError::NotAligned);
        }
        if offset + len > self.data.len() {
            return Err(MemFlashError::OutOfBounds);
        }
        Ok(())
    }
}

impl ErrorType for MemFlash {
    type Error = MemFlashError;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.take_fault(FaultOp::Read)?;
        self.check_range(offset, bytes.len(), Self::READ_SIZE)?;
        self.reads += 1;

        let offset = offset as usize;
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.take_fault(FaultOp::Write)?;
        self.check_range(offset, bytes.len(), Self::WRITE_SIZE)?;
        self.writes += 1;

        let offset = offset as usize;
        for (cell, byte) in self.data[offset..offset + bytes.len()].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.take_fault(FaultOp::Erase)?;
        if from % Self::ERASE_SIZE as u32 != 0 || to % Self::ERASE_SIZE as u32 != 0 {
            return Err(MemFlashError::NotAligned);
        }
        if from > to || to as usize > self.data.len() {
            return Err(MemFlashError::OutOfBounds);
        }
        self.erases += 1;

        for cell in &mut self.data[from as usize..to as usize] {
            *cell = 0xFF;
        }
        Ok(())
    }
}
