//! Streaming validation of Kboot/ktool application images.
//!
//! An image is a 5-byte header (`0x00` aes byte, little-endian payload size),
//! the payload, the sha256 of header and payload, and null bytes up to the
//! next block boundary. Bootloader stages use 4096-byte blocks, firmware
//! slots 65536-byte blocks.
//!
//! The image is read one block at a time; the digest suffix may straddle a
//! block boundary, in which case the following block is fetched before the
//! comparison.

use log::{
    debug,
    warn,
};
use sha2::{
    Digest,
    Sha256,
};

use crate::error::{
    Error,
    Mismatch,
};
use crate::platform::{
    read_bytes,
    Platform,
    FLASH_SIZE,
};
use crate::profile::Profile;
use crate::sector::KnownSector;

pub const STAGE_BLOCK_SIZE: u32 = 0x1000;
pub const APP_BLOCK_SIZE: u32 = 0x1_0000;

pub(crate) const HEADER_SIZE: u32 = 5;
pub(crate) const DIGEST_SIZE: u32 = 32;

/// A walked application image.
///
/// Digest and padding problems do not abort the walk; they are reported in
/// [`AppSector::mismatch`] next to everything that was computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSector {
    pub address: u32,
    pub block_size: u32,
    /// Payload size from the header.
    pub declared_size: u32,
    /// Header, payload, digest and padding; a whole number of blocks.
    pub total_size: u32,
    pub header_payload_sha256: [u8; 32],
    /// The digest suffix as found in flash.
    pub stored_sha256: [u8; 32],
    pub payload_sha256: [u8; 32],
    pub payload_crc32: u32,
    pub mismatch: Option<Mismatch>,
}

impl AppSector {
    /// Walk the image at `address`.
    ///
    /// The two bootloader stage addresses use 4096-byte blocks; any
    /// sector-aligned address inside the profile's app address range uses
    /// 65536-byte blocks.
    pub fn validate<T: Platform>(flash: &mut T, address: u32, profile: Profile) -> Result<Self, Error> {
        if address % STAGE_BLOCK_SIZE != 0 {
            return Err(Error::UnalignedAddress(address));
        }

        let block_size = match KnownSector::from_address(address) {
            Some(sector) => sector.block_size(),
            None if profile.app_address_range().contains(&address) => APP_BLOCK_SIZE,
            None => return Err(Error::UnknownAppAddress(address)),
        };

        Self::walk(flash, address, block_size, FLASH_SIZE)
    }

    pub fn is_valid(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Walk an image with the given block size that must end before `limit`.
    pub(crate) fn walk<T: Platform>(
        flash: &mut T,
        address: u32,
        block_size: u32,
        limit: u32,
    ) -> Result<Self, Error> {
        let bs = block_size as usize;
        let mut block = read_bytes(flash, address, bs)?;

        if block[0] != 0x00 {
            return Err(Error::InvalidAesMarker {
                address,
                value: block[0],
            });
        }

        let declared_size = u32::from_le_bytes([block[1], block[2], block[3], block[4]]);
        let max = limit.saturating_sub(address).saturating_sub(HEADER_SIZE + DIGEST_SIZE);
        if declared_size > max {
            return Err(Error::ImplausibleSize {
                address,
                declared: declared_size,
                max,
            });
        }

        debug!("app at 0x{address:06x}: {declared_size} bytes in blocks of 0x{block_size:x}");

        let mut header_payload = Sha256::new();
        let mut payload = Sha256::new();
        let mut crc = 0u32;

        let mut block_start = address;
        let mut begin = HEADER_SIZE as usize;
        let mut remaining = declared_size as usize;

        let end = loop {
            let end = bs.min(begin + remaining);
            header_payload.update(&block[..end]);
            payload.update(&block[begin..end]);
            crc = T::crc32(crc, &block[begin..end]);
            remaining -= end - begin;

            if remaining == 0 {
                break end;
            }

            block_start += block_size;
            block = read_bytes(flash, block_start, bs)?;
            begin = 0;
        };

        let mut stored = [0u8; 32];
        let in_block = (bs - end).min(DIGEST_SIZE as usize);
        stored[..in_block].copy_from_slice(&block[end..end + in_block]);

        // The suffix continues in the next block; padding then starts after it.
        let padding_from = if in_block < stored.len() {
            block_start += block_size;
            block = read_bytes(flash, block_start, bs)?;
            let rest = DIGEST_SIZE as usize - in_block;
            stored[in_block..].copy_from_slice(&block[..rest]);
            rest
        } else {
            end + stored.len()
        };

        let computed: [u8; 32] = header_payload.finalize().into();

        let mismatch = if stored != computed {
            warn!("app at 0x{address:06x}: calculated sha256 does not match suffix");
            Some(Mismatch::DigestMismatch { stored, computed })
        } else if let Some(pos) = block[padding_from..].iter().position(|&b| b != 0) {
            let at = block_start + (padding_from + pos) as u32;
            warn!("app at 0x{address:06x}: padding is not null at 0x{at:06x}");
            Some(Mismatch::MissingPadding { address: at })
        } else {
            None
        };

        Ok(Self {
            address,
            block_size,
            declared_size,
            total_size: block_start + block_size - address,
            header_payload_sha256: computed,
            stored_sha256: stored,
            payload_sha256: payload.finalize().into(),
            payload_crc32: crc,
            mismatch,
        })
    }
}
