//! Whole-range helpers over the flash: digests and fill checks.

use log::trace;
use sha2::{
    Digest,
    Sha256,
};

use crate::error::Error;
use crate::platform::{
    read_bytes,
    Platform,
};

/// Granularity of the range helpers' reads.
pub const REGION_BLOCK_SIZE: u32 = 0x1000;

/// sha256 of `length` bytes starting at `begin`.
pub fn hash_region<T: Platform>(flash: &mut T, begin: u32, length: u32) -> Result<[u8; 32], Error> {
    let mut hasher = Sha256::new();
    for (address, len) in blocks(begin, length) {
        hasher.update(read_bytes(flash, address, len)?);
    }
    Ok(hasher.finalize().into())
}

/// CRC32 of `length` bytes starting at `begin`.
pub fn crc32_region<T: Platform>(flash: &mut T, begin: u32, length: u32) -> Result<u32, Error> {
    let mut crc = 0;
    for (address, len) in blocks(begin, length) {
        crc = T::crc32(crc, &read_bytes(flash, address, len)?);
    }
    Ok(crc)
}

/// The first address in the range whose byte differs from `value`, with the
/// byte found there.
pub fn first_deviation<T: Platform>(
    flash: &mut T,
    value: u8,
    begin: u32,
    length: u32,
) -> Result<Option<(u32, u8)>, Error> {
    for (address, len) in blocks(begin, length) {
        let block = read_bytes(flash, address, len)?;
        if let Some(pos) = block.iter().position(|&b| b != value) {
            trace!("0x{:06x}: 0x{:02x} != 0x{value:02x}", address + pos as u32, block[pos]);
            return Ok(Some((address + pos as u32, block[pos])));
        }
    }
    Ok(None)
}

pub fn all_bytes_are<T: Platform>(flash: &mut T, value: u8, begin: u32, length: u32) -> Result<bool, Error> {
    Ok(first_deviation(flash, value, begin, length)?.is_none())
}

fn blocks(begin: u32, length: u32) -> impl Iterator<Item = (u32, usize)> {
    (0..length)
        .step_by(REGION_BLOCK_SIZE as usize)
        .map(move |offset| (begin.saturating_add(offset), (length - offset).min(REGION_BLOCK_SIZE) as usize))
}
