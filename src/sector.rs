//! Validation of the "aes + size + app + sha + null padding" sectors at the
//! fixed bootloader and firmware addresses.

use log::{
    debug,
    warn,
};

use crate::app::{
    AppSector,
    APP_BLOCK_SIZE,
    DIGEST_SIZE,
    HEADER_SIZE,
    STAGE_BLOCK_SIZE,
};
use crate::config::MAIN_CONFIG_ADDRESS;
use crate::error::{
    Error,
    Mismatch,
};
use crate::platform::{
    align_ceil,
    read_bytes,
    Platform,
};
use crate::profile::APP_SIZE_RANGE;

/// The sectors whose address, block size and name are fixed by the layout.
#[derive(strum::FromRepr, strum::Display, strum::IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum KnownSector {
    #[strum(to_string = "Kboot stage-0")]
    Stage0 = 0x0,
    #[strum(to_string = "Kboot stage-1")]
    Stage1 = 0x1000,
    #[strum(to_string = "firmware slot1")]
    FirmwareSlot1 = 0x8_0000,
    #[strum(to_string = "firmware slot2")]
    FirmwareSlot2 = 0x28_0000,
}

impl KnownSector {
    pub fn from_address(address: u32) -> Option<Self> {
        Self::from_repr(address)
    }

    pub const fn address(self) -> u32 {
        self as u32
    }

    pub const fn block_size(self) -> u32 {
        match self {
            Self::Stage0 | Self::Stage1 => STAGE_BLOCK_SIZE,
            Self::FirmwareSlot1 | Self::FirmwareSlot2 => APP_BLOCK_SIZE,
        }
    }

    /// First address the sector can never reach.
    ///
    /// Bootloader stages end before the main config. Firmware slots hold at
    /// most the largest app size with header, digest and block padding.
    pub fn limit(self) -> u32 {
        match self {
            Self::Stage0 | Self::Stage1 => MAIN_CONFIG_ADDRESS,
            Self::FirmwareSlot1 | Self::FirmwareSlot2 => {
                let max_sector = HEADER_SIZE + *APP_SIZE_RANGE.end() + DIGEST_SIZE;
                self.address() + align_ceil(max_sector as usize, APP_BLOCK_SIZE as usize) as u32
            }
        }
    }
}

/// Outcome of [`validate_sector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorCheck {
    pub address: u32,
    /// Bytes accounted for. For a valid sector this is the whole sector up to
    /// its block boundary; otherwise it stops where the problem was found.
    pub bytes_read: u32,
    pub mismatch: Option<Mismatch>,
    /// Digests and sizes, present once the header was plausible.
    pub app: Option<AppSector>,
}

impl SectorCheck {
    fn invalid(address: u32, bytes_read: u32, mismatch: Mismatch) -> Self {
        Self {
            address,
            bytes_read,
            mismatch: Some(mismatch),
            app: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Check the sector at one of the [`KnownSector`] addresses.
///
/// A sector that is merely wrong (unknown address, bad header, digest or
/// padding mismatch) is an `Ok` result carrying the [`Mismatch`]; only read
/// failures are errors. Unknown addresses are rejected without reading.
pub fn validate_sector<T: Platform>(flash: &mut T, address: u32) -> Result<SectorCheck, Error> {
    let Some(sector) = KnownSector::from_address(address) else {
        debug!("0x{address:x} is not a known sector");
        return Ok(SectorCheck::invalid(address, 0, Mismatch::UnknownSector(address)));
    };

    debug!(
        "validating \"{sector}\" at 0x{address:06x} with block size 0x{:x}",
        sector.block_size()
    );

    let header = read_bytes(flash, address, HEADER_SIZE as usize)?;
    if header[0] != 0x00 {
        debug!("\"{sector}\": aes byte is 0x{:02x}", header[0]);
        return Ok(SectorCheck::invalid(
            address,
            HEADER_SIZE,
            Mismatch::InvalidHeader { value: header[0] },
        ));
    }

    let declared = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    let max = sector.limit() - address - HEADER_SIZE - DIGEST_SIZE;
    if declared > max {
        warn!("\"{sector}\": declared size {declared} exceeds {max}");
        return Ok(SectorCheck::invalid(
            address,
            HEADER_SIZE,
            Mismatch::ImplausibleSize { declared, max },
        ));
    }

    let app = AppSector::walk(flash, address, sector.block_size(), sector.limit())?;
    let bytes_read = match app.mismatch {
        None => app.total_size,
        Some(_) => HEADER_SIZE + declared + DIGEST_SIZE,
    };

    Ok(SectorCheck {
        address,
        bytes_read,
        mismatch: app.mismatch.clone(),
        app: Some(app),
    })
}
