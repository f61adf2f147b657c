/// CRC32 using the IEEE 802.3 polynomial (0xEDB88320, bit-reversed 0x04C11DB7).
///
/// Equivalent to `crc32_update(0, data)`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}

/// Continue a CRC32 computation over `data`, starting from a previously
/// returned checksum.
///
/// `init` is the finished CRC of everything hashed so far (0 for nothing), so
/// `crc32_update(crc32(a), b) == crc32(a ++ b)`. This matches zlib's and the
/// Kboot tooling's running checksum.
pub fn crc32_update(init: u32, data: &[u8]) -> u32 {
    let mut crc: u32 = !init;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}
