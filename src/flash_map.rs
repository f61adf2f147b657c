//! The fixed layout of a 16 MiB K210 flash and a walk over it.
//!
//! ```text
//! 0x000000  Kboot stage-0          4096-byte blocks
//! 0x001000  Kboot stage-1          4096-byte blocks, ends before 0x4000
//! 0x004000  main config            4096 bytes
//! 0x005000  backup config          4096 bytes
//! 0x006000  reserved               40960 bytes of 0xff
//! 0x010000  unused app/user        0xff
//! 0x080000  firmware slot1         65536-byte blocks, then 0xff
//! 0x280000  firmware slot2         65536-byte blocks, then 0xff
//! 0xd00000  SPI Flash Filing System to the end
//! ```

use core::fmt;
use std::collections::BTreeMap;

use log::{
    info,
    warn,
};

use crate::app::AppSector;
use crate::config::{
    ConfigEntry,
    ConfigSector,
    BACKUP_CONFIG_ADDRESS,
    CONFIG_SECTOR_SIZE,
    MAIN_CONFIG_ADDRESS,
};
use crate::error::{
    Error,
    Mismatch,
};
use crate::platform::{
    Platform,
    FLASH_SIZE,
};
use crate::profile::Profile;
use crate::region::{
    first_deviation,
    hash_region,
};
use crate::sector::{
    validate_sector,
    KnownSector,
    SectorCheck,
};
use crate::spiffs::{
    FileSystem,
    Geometry,
};

pub const RESERVED_ADDRESS: u32 = 0x6000;
pub const RESERVED_SIZE: u32 = 0xA000;
pub const UNUSED_ADDRESS: u32 = 0x1_0000;

/// Result of checking one range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// The range holds what it should.
    Valid,
    /// The range is all 0xff.
    Erased,
    Invalid(Mismatch),
    Failed(Error),
    /// Not checked: where it starts depends on an invalid region before it.
    Skipped,
    /// Not checked: a valid region before it extends past its start.
    Covered,
}

impl Check {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Valid | Self::Erased | Self::Covered)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Erased => f.write_str("all 0xff"),
            Self::Invalid(m) => write!(f, "INVALID: {m}"),
            Self::Failed(e) => write!(f, "FAILED: {e}"),
            Self::Skipped => f.write_str("skipped"),
            Self::Covered => f.write_str("inside the previous region"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub start: u32,
    pub length: u32,
    pub check: Check,
    /// Payload digest for sectors, digest of the whole range for configs and
    /// the filing system.
    pub sha256: Option<[u8; 32]>,
}

impl Region {
    fn new(name: &'static str, start: u32, length: u32, check: Check) -> Self {
        Self {
            name,
            start,
            length,
            check,
            sha256: None,
        }
    }

    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:06x}..0x{:06x} {}: {}",
            self.start,
            self.end(),
            self.name,
            self.check
        )?;
        if let Some(sha256) = self.sha256 {
            write!(f, "\n  sha256: {}", hex::encode(sha256))?;
        }
        Ok(())
    }
}

/// A config entry compared against the image at its app address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCheck {
    pub config: &'static str,
    pub slot: usize,
    pub entry: ConfigEntry,
    /// Image and entry mismatches, or why the image could not be walked.
    pub outcome: Result<Vec<Mismatch>, Error>,
}

impl EntryCheck {
    pub fn is_valid(&self) -> bool {
        matches!(&self.outcome, Ok(m) if m.is_empty())
    }
}

impl fmt::Display for EntryCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slot {} \"{}\" at 0x{:x}: ",
            self.config, self.slot, self.entry.app_name, self.entry.app_address
        )?;
        match &self.outcome {
            Ok(m) if m.is_empty() => f.write_str("valid"),
            Ok(m) => {
                f.write_str("INVALID")?;
                for mismatch in m {
                    write!(f, "\n  {mismatch}")?;
                }
                Ok(())
            }
            Err(e) => write!(f, "FAILED: {e}"),
        }
    }
}

/// Everything [`analyze`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    pub profile: Profile,
    /// Checked ranges in address order.
    pub regions: Vec<Region>,
    /// Sector checks by address.
    pub sectors: BTreeMap<u32, SectorCheck>,
    pub main_config: Option<ConfigSector>,
    pub backup_config: Option<ConfigSector>,
    pub entries: Vec<EntryCheck>,
    pub filesystem: Option<FileSystem>,
    pub flash_sha256: [u8; 32],
}

impl FlashReport {
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn is_valid(&self) -> bool {
        self.regions.iter().all(|r| r.check.is_ok()) && self.entries.iter().all(EntryCheck::is_valid)
    }
}

impl fmt::Display for FlashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for region in &self.regions {
            writeln!(f, "{region}")?;
            if let Some(app) = self.sectors.get(&region.start).and_then(|s| s.app.as_ref()) {
                writeln!(
                    f,
                    "  app: {} bytes, crc32 0x{:08x}",
                    app.declared_size, app.payload_crc32
                )?;
            }
        }
        for (name, config) in [("main config", &self.main_config), ("backup config", &self.backup_config)] {
            if let Some(config) = config {
                writeln!(f, "\n{name}:\n{config}")?;
            }
        }
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        if let Some(fs) = &self.filesystem {
            writeln!(f, "\n{fs}")?;
        }
        write!(f, "\nsha256 of 16MB SPI flash: {}", hex::encode(self.flash_sha256))
    }
}

/// Walk the whole layout.
///
/// Every region is checked even when one before it is not valid. Only a
/// failure to hash the whole flash aborts the walk.
pub fn analyze<T: Platform>(flash: &mut T, profile: Profile) -> Result<FlashReport, Error> {
    let mut walk = Walk {
        flash,
        regions: Vec::new(),
        sectors: BTreeMap::new(),
    };

    walk.sector(KnownSector::Stage0, "Kboot stage-0 tail", KnownSector::Stage1.address());
    walk.sector(KnownSector::Stage1, "Kboot stage-1 tail", MAIN_CONFIG_ADDRESS);
    let main_config = walk.config("main config", MAIN_CONFIG_ADDRESS, profile);
    let backup_config = walk.config("backup config", BACKUP_CONFIG_ADDRESS, profile);
    walk.erased("reserved", RESERVED_ADDRESS, RESERVED_SIZE);
    walk.erased(
        "unused app/user",
        UNUSED_ADDRESS,
        KnownSector::FirmwareSlot1.address() - UNUSED_ADDRESS,
    );
    walk.sector(
        KnownSector::FirmwareSlot1,
        "unused app/user",
        KnownSector::FirmwareSlot2.address(),
    );
    let geometry = Geometry::default();
    walk.sector(KnownSector::FirmwareSlot2, "unused app/user", geometry.start);
    let filesystem = walk.filesystem(&geometry);

    let mut entries = Vec::new();
    for (name, config) in [("main config", &main_config), ("backup config", &backup_config)] {
        let Some(config) = config else {
            continue;
        };
        for (slot, entry) in config.slots.iter().enumerate() {
            if let Some(entry) = entry {
                entries.push(walk.entry(name, slot, entry, profile));
            }
        }
    }

    info!("hashing the whole flash");
    let flash_sha256 = hash_region(walk.flash, 0, FLASH_SIZE)?;

    Ok(FlashReport {
        profile,
        regions: walk.regions,
        sectors: walk.sectors,
        main_config,
        backup_config,
        entries,
        filesystem,
        flash_sha256,
    })
}

struct Walk<'a, T> {
    flash: &'a mut T,
    regions: Vec<Region>,
    sectors: BTreeMap<u32, SectorCheck>,
}

impl<T: Platform> Walk<'_, T> {
    /// Check a sector and the range after it up to `gap_end`.
    fn sector(&mut self, sector: KnownSector, gap_name: &'static str, gap_end: u32) {
        let name: &'static str = sector.into();
        let address = sector.address();

        // Stage-0 may run into stage-1, slot1 into slot2.
        if let Some(previous) = self.regions.last().filter(|r| r.end() > address) {
            let covered_to = previous.end();
            let trusted = previous.check == Check::Valid;
            info!("\"{name}\" at 0x{address:06x} lies inside \"{}\"", previous.name);
            self.regions.push(Region::new(name, address, 0, Check::Covered));
            if covered_to < gap_end {
                if trusted {
                    self.erased(gap_name, covered_to, gap_end - covered_to);
                } else {
                    self.regions
                        .push(Region::new(gap_name, covered_to, gap_end - covered_to, Check::Skipped));
                }
            }
            return;
        }

        info!("checking \"{name}\" at 0x{address:06x}");

        let check = match validate_sector(self.flash, address) {
            Ok(check) => check,
            Err(e) => {
                warn!("\"{name}\": {e}");
                self.regions.push(Region::new(name, address, 0, Check::Failed(e)));
                self.regions
                    .push(Region::new(gap_name, address, gap_end - address, Check::Skipped));
                return;
            }
        };

        let end = address + check.bytes_read;
        match &check.mismatch {
            None => {
                let mut region = Region::new(name, address, check.bytes_read, Check::Valid);
                region.sha256 = check.app.as_ref().map(|app| app.payload_sha256);
                self.regions.push(region);
                if end < gap_end {
                    self.erased(gap_name, end, gap_end - end);
                }
            }
            // No header, so nothing was written here.
            Some(Mismatch::InvalidHeader { .. }) => {
                self.erased(name, address, gap_end - address);
            }
            Some(mismatch) => {
                warn!("\"{name}\": {mismatch}");
                self.regions
                    .push(Region::new(name, address, check.bytes_read, Check::Invalid(mismatch.clone())));
                if end < gap_end {
                    self.regions
                        .push(Region::new(gap_name, end, gap_end - end, Check::Skipped));
                }
            }
        }

        self.sectors.insert(address, check);
    }

    fn config(&mut self, name: &'static str, address: u32, profile: Profile) -> Option<ConfigSector> {
        info!("checking \"{name}\" at 0x{address:06x}");

        let length = CONFIG_SECTOR_SIZE as u32;
        let sha256 = match hash_region(self.flash, address, length) {
            Ok(sha256) => sha256,
            Err(e) => {
                self.regions.push(Region::new(name, address, length, Check::Failed(e)));
                return None;
            }
        };

        let (check, config) = match ConfigSector::read(self.flash, address, profile) {
            Ok(config) => (Check::Valid, Some(config)),
            Err(e) => {
                warn!("\"{name}\": {e}");
                (Check::Failed(e), None)
            }
        };

        let mut region = Region::new(name, address, length, check);
        region.sha256 = Some(sha256);
        self.regions.push(region);
        config
    }

    fn erased(&mut self, name: &'static str, start: u32, length: u32) {
        let check = match first_deviation(self.flash, 0xff, start, length) {
            Ok(None) => Check::Erased,
            Ok(Some((address, value))) => {
                warn!("\"{name}\": not erased at 0x{address:06x}");
                Check::Invalid(Mismatch::NotErased { address, value })
            }
            Err(e) => Check::Failed(e),
        };
        self.regions.push(Region::new(name, start, length, check));
    }

    fn filesystem(&mut self, geometry: &Geometry) -> Option<FileSystem> {
        let name = "SPI Flash Filing System";
        info!("checking \"{name}\" at 0x{:06x}", geometry.start);

        let (check, filesystem) = match FileSystem::scan(self.flash, geometry) {
            Ok(fs) => (Check::Valid, Some(fs)),
            Err(e) => {
                warn!("\"{name}\": {e}");
                (Check::Failed(e), None)
            }
        };

        let mut region = Region::new(name, geometry.start, geometry.size, check);
        region.sha256 = hash_region(self.flash, geometry.start, geometry.size).ok();
        self.regions.push(region);
        filesystem
    }

    fn entry(&mut self, config: &'static str, slot: usize, entry: &ConfigEntry, profile: Profile) -> EntryCheck {
        let walked = self
            .sectors
            .get(&entry.app_address)
            .and_then(|check| check.app.clone());
        let app = match walked {
            Some(app) => Ok(app),
            None => AppSector::validate(self.flash, entry.app_address, profile),
        };

        let outcome = app.map(|app| {
            let mut mismatches: Vec<Mismatch> = app.mismatch.iter().cloned().collect();
            mismatches.extend(entry.verify(&app));
            mismatches
        });

        EntryCheck {
            config,
            slot,
            entry: entry.clone(),
            outcome,
        }
    }
}
