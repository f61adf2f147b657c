#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use sha2::{Digest, Sha256};

pub const FLASH_SIZE: usize = 0x100_0000;
pub const WORD_SIZE: usize = 4;

pub const STAGE_BLOCK_SIZE: usize = 0x1000;
pub const APP_BLOCK_SIZE: usize = 0x1_0000;
pub const PAGE_SIZE: usize = 0x1000;
pub const SPIFFS_START: usize = 0xD0_0000;

pub const BASE_ENTRY_ID: u32 = 0x5aa5_d0c0;

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
}

impl Flash {
    /// `len` erased bytes.
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![0xffu8; len],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    /// A fully erased 16 MiB flash.
    pub fn blank() -> Self {
        Self::new(FLASH_SIZE)
    }

    pub fn new_with_fault(len: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; len],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn place(&mut self, address: usize, bytes: &[u8]) -> &mut Self {
        self.buf[address..address + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn reads(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Read { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }
}

#[derive(Debug)]
pub struct FlashError(NorFlashErrorKind);

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        self.0
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::READ_SIZE));

        if self.operations.len() >= self.fail_after_operation {
            println!("    flash: FAULT");
            return Err(FlashError(NorFlashErrorKind::Other));
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        let src = self
            .buf
            .get(offset..offset + bytes.len())
            .ok_or(FlashError(NorFlashErrorKind::OutOfBounds))?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl k210_flash::platform::Crc for Flash {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        unsafe { libz_sys::crc32(init as _, data.as_ptr(), data.len() as _) as u32 }
    }
}

pub fn zlib_crc32(data: &[u8]) -> u32 {
    <Flash as k210_flash::platform::Crc>::crc32(0, data)
}

/// `0x00`, the little-endian size, the payload, the sha256 of all that and
/// null padding to the block boundary.
pub fn sector_image(payload: &[u8], block_size: usize) -> Vec<u8> {
    let mut image = vec![0x00];
    image.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    image.extend_from_slice(payload);
    let digest = Sha256::digest(&image);
    image.extend_from_slice(&digest);
    let padded = image.len().div_ceil(block_size) * block_size;
    image.resize(padded, 0x00);
    image
}

/// A deterministic, non-constant payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

pub fn entry_bytes(flags: u32, address: u32, size: u32, crc32: u32, name: &[u8]) -> [u8; 32] {
    let mut raw = [0u8; 32];
    raw[0..4].copy_from_slice(&(BASE_ENTRY_ID | flags).to_be_bytes());
    raw[4..8].copy_from_slice(&address.to_be_bytes());
    raw[8..12].copy_from_slice(&size.to_be_bytes());
    raw[12..16].copy_from_slice(&crc32.to_be_bytes());
    raw[16..16 + name.len()].copy_from_slice(name);
    raw
}

/// A config sector with the given entries in the given slots.
pub fn config_bytes(entries: &[(usize, [u8; 32])], config_flags: u32) -> Vec<u8> {
    let mut raw = vec![0u8; 4096];
    for (slot, entry) in entries {
        raw[slot * 32..(slot + 1) * 32].copy_from_slice(entry);
    }
    raw[256..260].copy_from_slice(&config_flags.to_be_bytes());
    raw
}

pub fn header_page(object_id: u8, status: u8, data_size: u16, name: &str) -> Vec<u8> {
    let mut page = vec![0xffu8; PAGE_SIZE];
    page[..5].copy_from_slice(&[object_id, 0x80, 0x00, 0x00, status]);
    page[8..10].copy_from_slice(&data_size.to_le_bytes());
    page[13..13 + 128].fill(0);
    page[13..13 + name.len()].copy_from_slice(name.as_bytes());
    page
}

pub fn data_page(object_id: u8, status: u8, data: &[u8]) -> Vec<u8> {
    let mut page = vec![0xffu8; PAGE_SIZE];
    page[..5].copy_from_slice(&[object_id, 0x00, 0x00, 0x00, status]);
    page[5..5 + data.len()].copy_from_slice(data);
    page
}

/// Erased apart from the three byte trailer.
pub fn trailer_page() -> Vec<u8> {
    let mut page = vec![0xffu8; PAGE_SIZE];
    page[PAGE_SIZE - 3..].copy_from_slice(&[0x15, 0x00, 0x00]);
    page
}
