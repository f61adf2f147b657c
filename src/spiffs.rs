//! Reconstruction of the SPI flash filing system at the end of the flash.
//!
//! The region is scanned once, page by page, front to back. Each page is
//! classified on its own except for data pages, whose payload length comes
//! from the header page directly before them. Object names and contents are
//! taken from the last used page of each object in physical order; the
//! filing system's own sequencing is not consulted.

pub mod consts;
mod object;
mod page;

use core::fmt;
use std::collections::BTreeMap;

use log::debug;

pub use object::SpiffsObject;
pub use page::{
    PageStatus,
    SizeHint,
    SpiffsPage,
};

use crate::error::Error;
use crate::platform::{
    Platform,
    FLASH_SIZE,
};

/// Placement and sizes of the filing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub start: u32,
    pub size: u32,
    pub phys_block_size: u32,
    pub log_block_size: u32,
    pub log_page_size: u32,
    pub obj_name_len: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            start: consts::START_ADDRESS,
            size: consts::SIZE,
            phys_block_size: consts::PHYS_BLOCK_SIZE,
            log_block_size: consts::LOG_BLOCK_SIZE,
            log_page_size: consts::LOG_PAGE_SIZE,
            obj_name_len: consts::OBJ_NAME_LEN,
        }
    }
}

impl Geometry {
    pub fn validate(&self) -> Result<(), Error> {
        if self.size == 0 || self.phys_block_size == 0 || self.log_block_size == 0 {
            return Err(Error::Geometry("sizes must not be zero"));
        }
        if self.log_page_size as usize <= consts::PAGE_HEADER_SIZE {
            return Err(Error::Geometry("logical page too small for its header"));
        }
        if self.start.checked_add(self.size).is_none_or(|end| end > FLASH_SIZE) {
            return Err(Error::Geometry("filing system overflows the end of flash"));
        }
        if self.size % self.log_block_size != 0 {
            return Err(Error::Geometry("size must align with the logical block size"));
        }
        if self.log_block_size % self.phys_block_size != 0 {
            return Err(Error::Geometry("logical block size must align with the physical block size"));
        }
        if self.log_block_size % self.log_page_size != 0 {
            return Err(Error::Geometry("logical block size must align with the logical page size"));
        }
        Ok(())
    }

    pub fn end(&self) -> u32 {
        self.start + self.size
    }
}

/// The reconstructed filing system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystem {
    pub geometry: Geometry,
    pub pages: usize,
    pub empty: usize,
    pub objects: BTreeMap<u8, SpiffsObject>,
}

impl FileSystem {
    pub fn scan<T: Platform>(flash: &mut T, geometry: &Geometry) -> Result<Self, Error> {
        geometry.validate()?;

        let mut fs = Self {
            geometry: *geometry,
            pages: 0,
            empty: 0,
            objects: BTreeMap::new(),
        };

        for page in scan_pages(flash, geometry, geometry.start, geometry.size)? {
            fs.pages += 1;
            if page.empty {
                fs.empty += 1;
            }
            if let Some(object_id) = page.object_id {
                fs.objects
                    .entry(object_id)
                    .or_insert_with(|| SpiffsObject::new(object_id))
                    .add_page(page);
            }
        }

        debug!(
            "filing system: {} pages, {} empty, {} objects",
            fs.pages,
            fs.empty,
            fs.objects.len()
        );

        Ok(fs)
    }

    pub fn object(&self, object_id: u8) -> Option<&SpiffsObject> {
        self.objects.get(&object_id)
    }
}

impl fmt::Display for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SPI Flash File System: {}MB at 0x{:x}",
            self.geometry.size / 1024 / 1024,
            self.geometry.start
        )?;
        write!(
            f,
            "\n  {}-byte pages: {}, non-empty: {}",
            self.geometry.log_page_size,
            self.pages,
            self.pages - self.empty
        )?;
        for object in self.objects.values() {
            write!(f, "\n  {object}")?;
        }
        Ok(())
    }
}

/// The pages of one logical block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiffsBlock {
    pub address: u32,
    pub pages: Vec<SpiffsPage>,
}

impl SpiffsBlock {
    /// Classify the pages of the logical block at `address`. The size hint
    /// starts empty at the block boundary.
    pub fn parse<T: Platform>(flash: &mut T, geometry: &Geometry, address: u32) -> Result<Self, Error> {
        geometry.validate()?;

        let in_region = address >= geometry.start && address <= geometry.end() - geometry.log_block_size;
        if !in_region || (address - geometry.start) % geometry.log_block_size != 0 {
            return Err(Error::UnalignedAddress(address));
        }

        Ok(Self {
            address,
            pages: scan_pages(flash, geometry, address, geometry.log_block_size)?,
        })
    }
}

fn scan_pages<T: Platform>(
    flash: &mut T,
    geometry: &Geometry,
    begin: u32,
    length: u32,
) -> Result<Vec<SpiffsPage>, Error> {
    let mut pages = Vec::with_capacity((length / geometry.log_page_size) as usize);
    let mut hint = None;
    for address in (begin..begin + length).step_by(geometry.log_page_size as usize) {
        let page = SpiffsPage::read(flash, geometry, address, hint)?;
        hint = page.hint();
        pages.push(page);
    }
    Ok(pages)
}
