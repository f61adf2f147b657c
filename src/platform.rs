use embedded_storage::nor_flash::{
    NorFlashError,
    ReadNorFlash,
};
use log::trace;

use crate::error::Error;

/// Size of the K210 SPI flash address space (16 MiB).
pub const FLASH_SIZE: u32 = 0x100_0000;

/// A readable flash together with the CRC routine used for checksums.
///
/// See [`MemFlash`] and [`DumpFile`] for the host implementations.
pub trait Platform: Crc + ReadNorFlash {}

impl<T: Crc + ReadNorFlash> Platform for T {}

pub trait Crc {
    /// Continue a CRC32 over `data` starting from the finished checksum
    /// `init` (0 for an empty prefix).
    fn crc32(init: u32, data: &[u8]) -> u32;
}

impl<T: Crc> Crc for &mut T {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        T::crc32(init, data)
    }
}

pub trait AlignedOps: Platform {
    fn align_read_floor(offset: usize) -> usize {
        align_floor(offset, Self::READ_SIZE)
    }

    fn align_read_ceil(size: usize) -> usize {
        align_ceil(size, Self::READ_SIZE)
    }
}

impl<T: Platform> AlignedOps for T {}

#[inline(always)]
pub(crate) const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

#[inline(always)]
pub(crate) const fn align_floor(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size & !(alignment - 1)
    } else {
        size / alignment * alignment
    }
}

/// Read exactly `length` bytes starting at `address`.
///
/// Ranges reaching past the 16 MiB flash are rejected before the device is
/// touched. The request is widened to the source's `READ_SIZE` and sliced
/// back, so callers may read at any byte offset.
pub fn read_bytes<T: Platform>(flash: &mut T, address: u32, length: usize) -> Result<Vec<u8>, Error> {
    let end = address as u64 + length as u64;
    if end > FLASH_SIZE as u64 {
        return Err(Error::OutOfBounds { address, length });
    }

    let start = T::align_read_floor(address as usize);
    let stop = T::align_read_ceil(end as usize);

    trace!("read: 0x{address:06x}[0x{length:x}]");

    let mut buf = vec![0u8; stop - start];
    flash
        .read(start as u32, &mut buf)
        .map_err(|e| Error::Flash {
            address,
            kind: e.kind(),
        })?;

    buf.rotate_left(address as usize - start);
    buf.truncate(length);
    Ok(buf)
}

mod host {
    use std::fs::File;
    use std::io::{
        self,
        Read,
        Seek,
        SeekFrom,
    };
    use std::path::Path;

    use embedded_storage::nor_flash::{
        ErrorType,
        NorFlashError,
        NorFlashErrorKind,
        ReadNorFlash,
    };
    use log::error;

    use crate::crc::crc32_update;
    use crate::platform::Crc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceError(NorFlashErrorKind);

    impl NorFlashError for SourceError {
        fn kind(&self) -> NorFlashErrorKind {
            self.0
        }
    }

    /// A flash image held in memory.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MemFlash {
        buf: Vec<u8>,
    }

    impl MemFlash {
        pub fn new(buf: Vec<u8>) -> Self {
            Self { buf }
        }

        /// An image of `len` bytes in the erased state (all 0xff).
        pub fn erased(len: usize) -> Self {
            Self {
                buf: vec![0xff; len],
            }
        }

        pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
            Ok(Self::new(std::fs::read(path)?))
        }

        pub fn as_bytes(&self) -> &[u8] {
            &self.buf
        }

        pub fn as_bytes_mut(&mut self) -> &mut [u8] {
            &mut self.buf
        }
    }

    impl ErrorType for MemFlash {
        type Error = SourceError;
    }

    impl ReadNorFlash for MemFlash {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let offset = offset as usize;
            let src = self
                .buf
                .get(offset..offset + bytes.len())
                .ok_or(SourceError(NorFlashErrorKind::OutOfBounds))?;
            bytes.copy_from_slice(src);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.buf.len()
        }
    }

    impl Crc for MemFlash {
        fn crc32(init: u32, data: &[u8]) -> u32 {
            crc32_update(init, data)
        }
    }

    /// A flash dump on disk, read on demand with one seek per request.
    #[derive(Debug)]
    pub struct DumpFile {
        file: File,
        len: usize,
    }

    impl DumpFile {
        pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
            let file = File::open(path)?;
            let len = file.metadata()?.len() as usize;
            Ok(Self { file, len })
        }
    }

    impl ErrorType for DumpFile {
        type Error = SourceError;
    }

    impl ReadNorFlash for DumpFile {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            if offset as usize + bytes.len() > self.len {
                return Err(SourceError(NorFlashErrorKind::OutOfBounds));
            }
            self.file
                .seek(SeekFrom::Start(offset as u64))
                .and_then(|_| self.file.read_exact(bytes))
                .map_err(|e| {
                    error!("dump read at 0x{offset:06x} failed: {e}");
                    SourceError(NorFlashErrorKind::Other)
                })
        }

        fn capacity(&self) -> usize {
            self.len
        }
    }

    impl Crc for DumpFile {
        fn crc32(init: u32, data: &[u8]) -> u32 {
            crc32_update(init, data)
        }
    }
}

pub use host::*;
