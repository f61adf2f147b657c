use embedded_storage::nor_flash::NorFlashErrorKind;
use thiserror::Error;

/// Fatal errors: the bytes are structurally not what the layout requires, or
/// the flash source could not deliver them. A parse that returns one of these
/// produced nothing usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The upper 28 bits of the id/flags word must equal the entry marker.
    #[error("entry id 0x{0:08x}: first 28 bits must be 0x5aa5d0c")]
    EntryMarker(u32),

    #[error("app address 0x{address:x} outside valid range 0x{min:x} to 0x{max:x}")]
    EntryAddress { address: u32, min: u32, max: u32 },

    #[error("app size {size} outside valid range {min} to {max} bytes")]
    EntrySize { size: u32, min: u32, max: u32 },

    #[error("app name is not valid UTF-8")]
    EntryName,

    #[error("24 undocumented bytes between reserved and user_data must be null")]
    ConfigUndocumented,

    #[error("padding to end of config sector must be null, found 0x{value:02x} at offset {offset}")]
    ConfigPadding { offset: usize, value: u8 },

    #[error("unknown page kind 0x{value:02x} in page at 0x{address:x}")]
    PageKind { address: u32, value: u8 },

    #[error("reserved bytes 2..4 of page at 0x{address:x} must be zero")]
    PageReserved { address: u32 },

    #[error("unknown page status 0x{value:02x} in page at 0x{address:x}")]
    PageStatus { address: u32, value: u8 },

    #[error("non-empty page at 0x{address:x} has object id 0xff")]
    PageObjectId { address: u32 },

    #[error("aes byte of header at 0x{address:x} must be 0x00, found 0x{value:02x}")]
    InvalidAesMarker { address: u32, value: u8 },

    #[error("address 0x{0:x} is not aligned to a 4096-byte sector")]
    UnalignedAddress(u32),

    #[error("address 0x{0:x} is neither a bootloader stage nor inside the app address range")]
    UnknownAppAddress(u32),

    #[error("sector at 0x{address:x} declares {declared} bytes, at most {max} fit")]
    ImplausibleSize { address: u32, declared: u32, max: u32 },

    #[error("invalid filing system geometry: {0}")]
    Geometry(&'static str),

    #[error("read of {length} bytes at 0x{address:x} exceeds the flash")]
    OutOfBounds { address: u32, length: usize },

    /// The flash source failed; the kind is reported as-is.
    #[error("flash read at 0x{address:x} failed: {kind:?}")]
    Flash {
        address: u32,
        kind: NorFlashErrorKind,
    },
}

/// Non-fatal validation outcomes. These describe a region that was read
/// successfully but does not hold what it should; the caller decides whether
/// that is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Mismatch {
    #[error("0x{0:x} is not a known sector address")]
    UnknownSector(u32),

    #[error("first (aes) byte of header is 0x{value:02x}, not 0x00")]
    InvalidHeader { value: u8 },

    #[error("declared size {declared} leaves the sector, at most {max} bytes fit")]
    ImplausibleSize { declared: u32, max: u32 },

    #[error(
        "sha256 of header+data does not match suffix: stored {}, computed {}",
        hex::encode(stored),
        hex::encode(computed)
    )]
    DigestMismatch {
        stored: [u8; 32],
        computed: [u8; 32],
    },

    #[error("padding to end of sector is not null at 0x{address:x}")]
    MissingPadding { address: u32 },

    #[error("expected erased (0xff) flash, found 0x{value:02x} at 0x{address:x}")]
    NotErased { address: u32, value: u8 },

    #[error("config entry declares app size {entry}, image holds {image}")]
    EntrySize { entry: u32, image: u32 },

    #[error("config entry declares crc32 0x{entry:08x}, image payload has 0x{image:08x}")]
    EntryCrc32 { entry: u32, image: u32 },
}
