use core::fmt;

use log::trace;

use super::consts::*;
use super::Geometry;
use crate::error::Error;
use crate::platform::{
    read_bytes,
    Platform,
};

#[derive(strum::FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum PageKind {
    Data = KIND_DATA,
    // Intermediate pages; their payload is not reconstructed.
    Index = KIND_INDEX,
    Header = KIND_HEADER,
}

/// Lifecycle status from byte 4 of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    None,
    Used,
    Deleted,
    /// A known code without an interpretation, kept raw.
    Other(u8),
}

impl PageStatus {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            STATUS_NONE => Some(Self::None),
            STATUS_DELETED => Some(Self::Deleted),
            v if STATUS_USED.contains(&v) => Some(Self::Used),
            v if STATUS_OTHER.contains(&v) => Some(Self::Other(v)),
            _ => None,
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Used => f.write_str("used"),
            Self::Deleted => f.write_str("deleted"),
            Self::Other(v) => write!(f, "0x{v:02x}"),
        }
    }
}

/// Object id and data size announced by a header page, applied to the page
/// directly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHint {
    pub object_id: u8,
    pub data_size: u16,
}

/// One classified filing-system page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiffsPage {
    pub address: u32,
    pub empty: bool,
    pub object_id: Option<u8>,
    /// `Some(true)` for header pages, `Some(false)` for data pages, `None`
    /// for intermediate pages and pages that were not decoded.
    pub is_header: Option<bool>,
    pub status: PageStatus,
    /// Object data size, header pages only.
    pub declared_data_size: Option<u16>,
    /// The name field of header pages, the payload of data pages.
    pub contents: Option<Vec<u8>>,
}

impl SpiffsPage {
    /// Read and classify the page at `address`.
    ///
    /// The first page of the region holds the object lookup table and is
    /// returned undecoded without being read.
    pub fn read<T: Platform>(
        flash: &mut T,
        geometry: &Geometry,
        address: u32,
        hint: Option<SizeHint>,
    ) -> Result<Self, Error> {
        if address == geometry.start {
            trace!("page 0x{address:06x}: lookup page, skipped");
            return Ok(Self::undecoded(address, false));
        }

        let raw = read_bytes(flash, address, geometry.log_page_size as usize)?;
        Self::parse(geometry, address, &raw, hint)
    }

    /// Classify a raw page.
    ///
    /// A data page's payload length comes from `hint` when the hint names the
    /// page's object; otherwise the payload runs to the end of the page.
    pub fn parse(
        geometry: &Geometry,
        address: u32,
        raw: &[u8],
        hint: Option<SizeHint>,
    ) -> Result<Self, Error> {
        let page_size = geometry.log_page_size as usize;
        if raw.len() != page_size {
            return Err(Error::InvalidLength {
                expected: page_size,
                actual: raw.len(),
            });
        }

        if is_erased(raw) {
            return Ok(Self::undecoded(address, true));
        }

        let object_id = raw[OBJECT_ID_OFFSET];
        if object_id == NO_OBJECT_ID {
            return Err(Error::PageObjectId { address });
        }

        let kind = PageKind::from_repr(raw[KIND_OFFSET]).ok_or(Error::PageKind {
            address,
            value: raw[KIND_OFFSET],
        })?;
        let is_header = match kind {
            PageKind::Header => Some(true),
            PageKind::Data => Some(false),
            PageKind::Index => None,
        };

        if is_header.is_some() && raw[RESERVED_OFFSET..STATUS_OFFSET] != [0, 0] {
            return Err(Error::PageReserved { address });
        }

        let status = PageStatus::from_byte(raw[STATUS_OFFSET]).ok_or(Error::PageStatus {
            address,
            value: raw[STATUS_OFFSET],
        })?;

        let mut declared_data_size = None;
        let contents = match kind {
            PageKind::Header => {
                declared_data_size = Some(u16::from_le_bytes([
                    raw[DATA_SIZE_OFFSET],
                    raw[DATA_SIZE_OFFSET + 1],
                ]));
                let end = (NAME_OFFSET + geometry.obj_name_len).min(page_size);
                Some(raw[NAME_OFFSET..end].to_vec())
            }
            PageKind::Data => {
                let size = match hint {
                    Some(hint) if hint.object_id == object_id => hint.data_size as usize,
                    _ => page_size - PAGE_HEADER_SIZE,
                };
                let end = (PAGE_HEADER_SIZE + size).min(page_size);
                Some(raw[PAGE_HEADER_SIZE..end].to_vec())
            }
            PageKind::Index => None,
        };

        trace!(
            "page 0x{address:06x}: object {object_id} {kind:?} {status}, {} bytes",
            contents.as_ref().map_or(0, Vec::len)
        );

        Ok(Self {
            address,
            empty: false,
            object_id: Some(object_id),
            is_header,
            status,
            declared_data_size,
            contents,
        })
    }

    fn undecoded(address: u32, empty: bool) -> Self {
        Self {
            address,
            empty,
            object_id: None,
            is_header: None,
            status: PageStatus::None,
            declared_data_size: None,
            contents: None,
        }
    }

    /// The hint this page passes to the page after it: only header pages
    /// with a non-zero size announce one.
    pub fn hint(&self) -> Option<SizeHint> {
        match (self.is_header, self.object_id, self.declared_data_size) {
            (Some(true), Some(object_id), Some(data_size)) if data_size != 0 => Some(SizeHint {
                object_id,
                data_size,
            }),
            _ => None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.status == PageStatus::Used
    }

    /// The object name of a header page, up to the first null byte.
    pub fn name(&self) -> Option<String> {
        if self.is_header != Some(true) {
            return None;
        }
        self.contents.as_ref().map(|raw| {
            let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            String::from_utf8_lossy(&raw[..len]).into_owned()
        })
    }
}

/// All 0xff, or all 0xff up to a trailer in the last three bytes.
fn is_erased(raw: &[u8]) -> bool {
    if raw.iter().all(|&b| b == 0xff) {
        return true;
    }
    // The byte before the trailer is not constrained.
    let len = raw.len();
    len > EMPTY_TRAILER.len() + 1
        && raw[..len - EMPTY_TRAILER.len() - 1].iter().all(|&b| b == 0xff)
        && raw[len - EMPTY_TRAILER.len()..] == EMPTY_TRAILER
}
