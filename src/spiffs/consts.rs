// Filing system placement in the K210 flash
pub const START_ADDRESS: u32 = 0xD0_0000;
pub const SIZE: u32 = 0x30_0000; // to the end of 16 MiB

// Block and page sizes
pub const PHYS_BLOCK_SIZE: u32 = 0x1000;
pub const LOG_BLOCK_SIZE: u32 = 0x2_0000;
pub const LOG_PAGE_SIZE: u32 = 0x1000;
pub const OBJ_NAME_LEN: usize = 128;

// Page header layout
pub const PAGE_HEADER_SIZE: usize = 5;
pub const OBJECT_ID_OFFSET: usize = 0;
pub const KIND_OFFSET: usize = 1;
pub const RESERVED_OFFSET: usize = 2;
pub const STATUS_OFFSET: usize = 4;
pub const DATA_SIZE_OFFSET: usize = 8; // header pages only, little-endian u16
pub const NAME_OFFSET: usize = 13; // header pages only

// Page kinds
pub const KIND_DATA: u8 = 0x00;
pub const KIND_INDEX: u8 = 0x01;
pub const KIND_HEADER: u8 = 0x80;

// Page status
pub const STATUS_NONE: u8 = 0x00;
pub const STATUS_DELETED: u8 = 0x7e;
pub const STATUS_USED: [u8; 2] = [0xf8, 0xfc];
pub const STATUS_OTHER: [u8; 2] = [0x7c, 0xfe];

/// Erased page whose last three bytes were written with this trailer.
pub const EMPTY_TRAILER: [u8; 3] = [0x15, 0x00, 0x00];

pub const NO_OBJECT_ID: u8 = 0xff;
