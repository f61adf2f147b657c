#![doc = include_str!("../README.md")]

pub mod app;
pub mod config;
pub mod crc;
pub mod error;
pub mod flash_map;
pub mod logger;
pub mod platform;
pub mod profile;
pub mod region;
pub mod sector;
pub mod spiffs;

pub use app::AppSector;
pub use config::{
    ConfigEntry,
    ConfigSector,
};
pub use error::{
    Error,
    Mismatch,
};
pub use flash_map::{
    analyze,
    Check,
    FlashReport,
    Region,
};
pub use platform::{
    Crc,
    DumpFile,
    MemFlash,
    Platform,
    FLASH_SIZE,
};
pub use profile::Profile;
pub use sector::{
    validate_sector,
    KnownSector,
    SectorCheck,
};
pub use spiffs::{
    FileSystem,
    Geometry,
};
