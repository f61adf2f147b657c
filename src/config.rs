//! Kboot configuration sectors.
//!
//! A config sector is 4096 bytes at 0x4000 (main) or 0x5000 (backup):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 256  | 8 entry slots of 32 bytes               |
//! | 256    | 4    | config flags (big-endian)               |
//! | 260    | 4    | reserved                                |
//! | 264    | 24   | undocumented, must be zero              |
//! | 288    | 4    | user data                               |
//! | 292    | 3804 | padding, must be zero                   |
//!
//! Entry slots that do not parse are treated as blank and dropped, matching
//! the bootloader's tolerance of erased slots. The zero-filled fields on the
//! other hand are hard errors: something that should not be there has been
//! written to the sector.

use core::fmt;

use log::{
    debug,
    trace,
};
use sha2::{
    Digest,
    Sha256,
};

use crate::app::AppSector;
use crate::error::{
    Error,
    Mismatch,
};
use crate::platform::{
    read_bytes,
    Platform,
};
use crate::profile::Profile;

pub const CONFIG_SECTOR_SIZE: usize = 4096;
pub const ENTRY_SIZE: usize = 32;
pub const ENTRY_SLOTS: usize = 8;

pub const MAIN_CONFIG_ADDRESS: u32 = 0x4000;
pub const BACKUP_CONFIG_ADDRESS: u32 = 0x5000;

/// Marker in the upper 28 bits of every entry's id/flags word. The same value
/// in the config flags field disables the interactive boot menu.
pub const BASE_ENTRY_ID: u32 = 0x5aa5_d0c0;

const FLAGS_MASK: u32 = 0xf;
const FLAG_ACTIVE: u32 = 1 << 0;
const FLAG_CHECK_CRC32: u32 = 1 << 1;
const FLAG_CHECK_SHA256: u32 = 1 << 2;
const FLAG_CHECK_SIZE: u32 = 1 << 3;

const APP_NAME_LEN: usize = 16;

const CONFIG_FLAGS_OFFSET: usize = ENTRY_SIZE * ENTRY_SLOTS;
const RESERVED_OFFSET: usize = CONFIG_FLAGS_OFFSET + 4;
const UNDOCUMENTED_OFFSET: usize = RESERVED_OFFSET + 4;
const USER_DATA_OFFSET: usize = UNDOCUMENTED_OFFSET + 24;
const PADDING_OFFSET: usize = USER_DATA_OFFSET + 4;

/// One 32-byte entry describing a firmware slot. All integers are big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub is_active: bool,
    pub check_crc32: bool,
    pub check_sha256: bool,
    pub check_size: bool,
    pub app_address: u32,
    pub app_size: u32,
    /// Stored as found so that serialization is byte exact.
    pub app_crc32: [u8; 4],
    /// Trailing null bytes are not part of the name.
    pub app_name: String,
}

impl ConfigEntry {
    /// Create an active entry for an app at `app_address` with no checks
    /// enabled, a zero CRC and the name `firmware`.
    pub fn new(profile: Profile, app_address: u32, app_size: u32) -> Result<Self, Error> {
        check_app_address(profile, app_address)?;
        check_app_size(profile, app_size)?;

        Ok(Self {
            is_active: true,
            check_crc32: false,
            check_sha256: false,
            check_size: false,
            app_address,
            app_size,
            app_crc32: [0; 4],
            app_name: "firmware".to_string(),
        })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.app_name = name.to_string();
        self
    }

    pub fn with_crc32(mut self, crc: u32) -> Self {
        self.app_crc32 = crc.to_be_bytes();
        self
    }

    /// Parse a 32-byte entry, validating the marker and both ranges against
    /// `profile`.
    pub fn parse(raw: &[u8], profile: Profile) -> Result<Self, Error> {
        if raw.len() != ENTRY_SIZE {
            return Err(Error::InvalidLength {
                expected: ENTRY_SIZE,
                actual: raw.len(),
            });
        }

        let id_flags = read_u32(raw, 0);
        // Only the low nibble holds flags, so base+16 is not a valid id.
        if id_flags & !FLAGS_MASK != BASE_ENTRY_ID {
            return Err(Error::EntryMarker(id_flags));
        }

        let app_address = read_u32(raw, 4);
        check_app_address(profile, app_address)?;

        let app_size = read_u32(raw, 8);
        check_app_size(profile, app_size)?;

        let name = &raw[16..16 + APP_NAME_LEN];
        let name_len = name.iter().rposition(|&b| b != 0).map_or(0, |idx| idx + 1);
        let app_name = std::str::from_utf8(&name[..name_len])
            .map_err(|_| Error::EntryName)?
            .to_string();

        Ok(Self {
            is_active: id_flags & FLAG_ACTIVE != 0,
            check_crc32: id_flags & FLAG_CHECK_CRC32 != 0,
            check_sha256: id_flags & FLAG_CHECK_SHA256 != 0,
            check_size: id_flags & FLAG_CHECK_SIZE != 0,
            app_address,
            app_size,
            app_crc32: read_array(raw, 12),
            app_name,
        })
    }

    /// The id/flags word: the entry marker with the four flag bits.
    pub fn id_flags(&self) -> u32 {
        let mut id = BASE_ENTRY_ID;
        if self.is_active {
            id |= FLAG_ACTIVE;
        }
        if self.check_crc32 {
            id |= FLAG_CHECK_CRC32;
        }
        if self.check_sha256 {
            id |= FLAG_CHECK_SHA256;
        }
        if self.check_size {
            id |= FLAG_CHECK_SIZE;
        }
        id
    }

    pub fn app_crc32(&self) -> u32 {
        u32::from_be_bytes(self.app_crc32)
    }

    /// Serialize to 32 bytes. Names longer than 16 bytes are truncated.
    pub fn serialize(&self) -> [u8; ENTRY_SIZE] {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[0..4].copy_from_slice(&self.id_flags().to_be_bytes());
        raw[4..8].copy_from_slice(&self.app_address.to_be_bytes());
        raw[8..12].copy_from_slice(&self.app_size.to_be_bytes());
        raw[12..16].copy_from_slice(&self.app_crc32);

        let name = self.app_name.as_bytes();
        let len = name.len().min(APP_NAME_LEN);
        raw[16..16 + len].copy_from_slice(&name[..len]);
        raw
    }

    /// Compare the entry against the image it points at, for each check the
    /// entry enables that can be decided from the image alone.
    ///
    /// The sha256 check is the image's own digest suffix and is reported by
    /// [`AppSector`] itself.
    pub fn verify(&self, app: &AppSector) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        if self.check_size && self.app_size != app.declared_size {
            mismatches.push(Mismatch::EntrySize {
                entry: self.app_size,
                image: app.declared_size,
            });
        }
        if self.check_crc32 && self.app_crc32() != app.payload_crc32 {
            mismatches.push(Mismatch::EntryCrc32 {
                entry: self.app_crc32(),
                image: app.payload_crc32,
            });
        }
        mismatches
    }
}

impl fmt::Display for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "raw_bytes: {}", hex::encode(self.serialize()))?;
        writeln!(
            f,
            "is_active: {}, ck_crc32: {}, ck_sha256: {}, ck_size: {}",
            self.is_active, self.check_crc32, self.check_sha256, self.check_size
        )?;
        writeln!(f, "app_address: {0} 0x{0:x}", self.app_address)?;
        writeln!(f, "app_size: {0} 0x{0:x}", self.app_size)?;
        writeln!(f, "app_crc32: {}", hex::encode(self.app_crc32))?;
        write!(f, "app_name: {}", self.app_name)
    }
}

/// The 4096-byte configuration sector.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigSector {
    /// Entries by slot; `None` for slots that did not parse.
    pub slots: [Option<ConfigEntry>; ENTRY_SLOTS],
    pub config_flags: u32,
    pub reserved: [u8; 4],
    pub user_data: [u8; 4],
}

impl ConfigSector {
    /// Read and parse the sector at `address` (normally
    /// [`MAIN_CONFIG_ADDRESS`] or [`BACKUP_CONFIG_ADDRESS`]).
    pub fn read<T: Platform>(flash: &mut T, address: u32, profile: Profile) -> Result<Self, Error> {
        let raw = read_bytes(flash, address, CONFIG_SECTOR_SIZE)?;
        Self::parse(&raw, profile)
    }

    pub fn parse(raw: &[u8], profile: Profile) -> Result<Self, Error> {
        if raw.len() != CONFIG_SECTOR_SIZE {
            return Err(Error::InvalidLength {
                expected: CONFIG_SECTOR_SIZE,
                actual: raw.len(),
            });
        }

        let slots = core::array::from_fn(|idx| {
            let slot = &raw[idx * ENTRY_SIZE..(idx + 1) * ENTRY_SIZE];
            match ConfigEntry::parse(slot, profile) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    if slot.iter().all(|&b| b == 0) {
                        trace!("config slot {idx}: blank");
                    } else {
                        debug!("config slot {idx}: dropped, {e}");
                    }
                    None
                }
            }
        });

        let config_flags = read_u32(raw, CONFIG_FLAGS_OFFSET);
        let reserved = read_array(raw, RESERVED_OFFSET);

        if raw[UNDOCUMENTED_OFFSET..USER_DATA_OFFSET].iter().any(|&b| b != 0) {
            return Err(Error::ConfigUndocumented);
        }

        let user_data = read_array(raw, USER_DATA_OFFSET);

        if let Some(pos) = raw[PADDING_OFFSET..].iter().position(|&b| b != 0) {
            let offset = PADDING_OFFSET + pos;
            return Err(Error::ConfigPadding {
                offset,
                value: raw[offset],
            });
        }

        Ok(Self {
            slots,
            config_flags,
            reserved,
            user_data,
        })
    }

    /// Serialize to exactly 4096 bytes. Slots without an entry are zero
    /// filled.
    pub fn serialize(&self) -> Vec<u8> {
        let mut raw = vec![0u8; CONFIG_SECTOR_SIZE];
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = slot {
                raw[idx * ENTRY_SIZE..(idx + 1) * ENTRY_SIZE].copy_from_slice(&entry.serialize());
            }
        }
        raw[CONFIG_FLAGS_OFFSET..RESERVED_OFFSET].copy_from_slice(&self.config_flags.to_be_bytes());
        raw[RESERVED_OFFSET..UNDOCUMENTED_OFFSET].copy_from_slice(&self.reserved);
        raw[USER_DATA_OFFSET..PADDING_OFFSET].copy_from_slice(&self.user_data);
        raw
    }

    /// The parsed entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.slots.iter().flatten()
    }

    pub fn interactive_disabled(&self) -> bool {
        self.config_flags == BASE_ENTRY_ID
    }

    pub fn sha256(&self) -> [u8; 32] {
        Sha256::digest(self.serialize()).into()
    }
}

impl fmt::Display for ConfigSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.serialize();
        writeln!(
            f,
            "raw_bytes: {} (null padding trimmed)",
            hex::encode(&raw[..PADDING_OFFSET])
        )?;
        writeln!(f, "sha256: {}", hex::encode(self.sha256()))?;
        writeln!(f, "num entries: {}", self.entries().count())?;
        writeln!(
            f,
            "config_flags: {:08x}, interactive_disabled: {}",
            self.config_flags,
            self.interactive_disabled()
        )?;
        writeln!(f, "reserved: {}", hex::encode(self.reserved))?;
        write!(f, "user_data: {}", hex::encode(self.user_data))?;

        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = slot {
                write!(f, "\n\nentry #{idx}")?;
                for line in entry.to_string().lines() {
                    write!(f, "\n  {line}")?;
                }
            }
        }
        Ok(())
    }
}

fn check_app_address(profile: Profile, address: u32) -> Result<(), Error> {
    let range = profile.app_address_range();
    if range.contains(&address) {
        Ok(())
    } else {
        Err(Error::EntryAddress {
            address,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn check_app_size(profile: Profile, size: u32) -> Result<(), Error> {
    let range = profile.app_size_range();
    if range.contains(&size) {
        Ok(())
    } else {
        Err(Error::EntrySize {
            size,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(read_array(data, offset))
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}
