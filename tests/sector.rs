mod common;

use common::{
    payload, sector_image, zlib_crc32, Flash, Operation, APP_BLOCK_SIZE, STAGE_BLOCK_SIZE,
};
use embedded_storage::nor_flash::NorFlashErrorKind;
use k210_flash::{
    validate_sector, AppSector, Error, KnownSector, Mismatch, Profile, FLASH_SIZE,
};
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Payload size that makes header, payload and digest fill one block.
const STAGE_FIT: usize = STAGE_BLOCK_SIZE - 5 - 32;

#[test]
fn stage_sector_that_fills_a_block_is_valid() {
    let data = payload(STAGE_FIT);
    let image = sector_image(&data, STAGE_BLOCK_SIZE);
    assert_eq!(image.len(), STAGE_BLOCK_SIZE);

    let mut flash = Flash::new(0x4000);
    flash.place(0, &image);

    let check = validate_sector(&mut flash, 0x0).unwrap();
    assert!(check.is_valid());
    assert_eq!(check.bytes_read, 0x1000);

    let app = check.app.unwrap();
    assert_eq!(app.declared_size, STAGE_FIT as u32);
    assert_eq!(app.block_size, 0x1000);
    assert_eq!(app.total_size, 0x1000);
    assert_eq!(app.payload_sha256, sha256(&data));
    assert_eq!(app.payload_crc32, zlib_crc32(&data));
    assert_eq!(app.header_payload_sha256, sha256(&image[..5 + STAGE_FIT]));
    assert_eq!(app.stored_sha256, app.header_payload_sha256);
}

#[test]
fn sector_is_rounded_up_to_its_block() {
    let data = payload(100);
    let mut flash = Flash::new(0x4000);
    flash.place(0x1000, &sector_image(&data, STAGE_BLOCK_SIZE));

    let check = validate_sector(&mut flash, 0x1000).unwrap();
    assert!(check.is_valid());
    assert_eq!(check.bytes_read, 0x1000);
}

#[test]
fn digest_spanning_into_the_next_block() {
    // header and payload end 10 bytes before the block boundary
    let data = payload(STAGE_BLOCK_SIZE - 5 - 10);
    let image = sector_image(&data, STAGE_BLOCK_SIZE);
    assert_eq!(image.len(), 2 * STAGE_BLOCK_SIZE);

    let mut flash = Flash::new(0x4000);
    flash.place(0, &image);

    let check = validate_sector(&mut flash, 0x0).unwrap();
    assert!(check.is_valid(), "{:?}", check.mismatch);
    assert_eq!(check.bytes_read, 0x2000);
    assert_eq!(check.app.unwrap().payload_sha256, sha256(&data));
}

#[test]
fn payload_spanning_several_blocks() {
    let data = payload(3 * APP_BLOCK_SIZE + 1234);
    let image = sector_image(&data, APP_BLOCK_SIZE);

    let mut flash = Flash::new(0x80000 + image.len());
    flash.place(0x80000, &image);

    let check = validate_sector(&mut flash, 0x80000).unwrap();
    assert!(check.is_valid());
    assert_eq!(check.bytes_read, 4 * APP_BLOCK_SIZE as u32);

    let app = check.app.unwrap();
    assert_eq!(app.block_size, 0x10000);
    assert_eq!(app.payload_sha256, sha256(&data));
    assert_eq!(app.payload_crc32, zlib_crc32(&data));
}

#[test]
fn flipped_payload_byte_fails_the_digest() {
    let data = payload(5000);
    let mut image = sector_image(&data, APP_BLOCK_SIZE);
    image[5 + 1234] ^= 0x01;

    let mut flash = Flash::new(0x290000);
    flash.place(0x280000, &image);

    let check = validate_sector(&mut flash, 0x280000).unwrap();
    assert!(!check.is_valid());
    assert!(matches!(check.mismatch, Some(Mismatch::DigestMismatch { .. })));
    assert_eq!(check.bytes_read, 5 + 5000 + 32);

    let app = check.app.unwrap();
    assert_ne!(app.stored_sha256, app.header_payload_sha256);
    assert_eq!(
        check.mismatch,
        Some(Mismatch::DigestMismatch {
            stored: app.stored_sha256,
            computed: app.header_payload_sha256,
        })
    );
}

#[test]
fn non_zero_padding_is_not_a_digest_failure() {
    let data = payload(200);
    let mut image = sector_image(&data, STAGE_BLOCK_SIZE);
    image[4000] = 0x01;

    let mut flash = Flash::new(0x4000);
    flash.place(0, &image);

    let check = validate_sector(&mut flash, 0x0).unwrap();
    assert_eq!(check.mismatch, Some(Mismatch::MissingPadding { address: 4000 }));
}

#[test]
fn padding_address_is_absolute_after_a_spanning_digest() {
    let data = payload(STAGE_BLOCK_SIZE - 5 - 10);
    let mut image = sector_image(&data, STAGE_BLOCK_SIZE);
    image[0x1000 + 22 + 3] = 0x01;

    let mut flash = Flash::new(0x4000);
    flash.place(0x1000, &image);

    let check = validate_sector(&mut flash, 0x1000).unwrap();
    assert_eq!(
        check.mismatch,
        Some(Mismatch::MissingPadding {
            address: 0x2000 + 22 + 3
        })
    );
}

#[test]
fn unknown_sector_is_rejected_without_reading() {
    let mut flash = Flash::new(0x20000);
    let check = validate_sector(&mut flash, 0x12345).unwrap();
    assert_eq!(check.mismatch, Some(Mismatch::UnknownSector(0x12345)));
    assert_eq!(check.bytes_read, 0);
    assert!(check.app.is_none());
    assert!(flash.operations.is_empty());
}

#[test]
fn erased_sector_has_an_invalid_header() {
    let mut flash = Flash::new(0x4000);
    let check = validate_sector(&mut flash, 0x1000).unwrap();
    assert_eq!(check.mismatch, Some(Mismatch::InvalidHeader { value: 0xff }));
    assert_eq!(check.bytes_read, 5);
    assert_eq!(flash.reads(), 1);
}

#[test]
fn implausible_size_is_bounded() {
    let mut flash = Flash::new(0x4000);
    let mut header = vec![0x00];
    header.extend_from_slice(&0x8000u32.to_le_bytes());
    flash.place(0x0, &header);

    let check = validate_sector(&mut flash, 0x0).unwrap();
    assert_eq!(
        check.mismatch,
        Some(Mismatch::ImplausibleSize {
            declared: 0x8000,
            max: 0x4000 - 5 - 32
        })
    );
    // only the header was read
    assert_eq!(flash.reads(), 1);
}

#[test]
fn firmware_slot_bound() {
    let max = (5 + 0x300000 + 32usize).div_ceil(APP_BLOCK_SIZE) * APP_BLOCK_SIZE;
    assert_eq!(KnownSector::FirmwareSlot1.limit(), 0x80000 + max as u32);

    let mut flash = Flash::new(0x90000);
    let mut header = vec![0x00];
    header.extend_from_slice(&u32::MAX.to_le_bytes());
    flash.place(0x80000, &header);

    let check = validate_sector(&mut flash, 0x80000).unwrap();
    assert!(matches!(check.mismatch, Some(Mismatch::ImplausibleSize { .. })));
}

#[test]
fn read_fault_is_an_error() {
    let mut flash = Flash::new_with_fault(0x4000, 1);
    flash.place(0, &sector_image(&payload(STAGE_FIT), STAGE_BLOCK_SIZE));

    assert_eq!(
        validate_sector(&mut flash, 0x0),
        Err(Error::Flash {
            address: 0,
            kind: NorFlashErrorKind::Other
        })
    );
    assert_eq!(
        flash.operations,
        vec![Operation::Read { offset: 0, len: 8 }]
    );
}

#[test]
fn known_sectors() {
    assert_eq!(KnownSector::from_address(0x0), Some(KnownSector::Stage0));
    assert_eq!(KnownSector::from_address(0x1000), Some(KnownSector::Stage1));
    assert_eq!(KnownSector::from_address(0x80000), Some(KnownSector::FirmwareSlot1));
    assert_eq!(KnownSector::from_address(0x280000), Some(KnownSector::FirmwareSlot2));
    assert_eq!(KnownSector::from_address(0x2000), None);

    assert_eq!(KnownSector::Stage1.block_size(), 0x1000);
    assert_eq!(KnownSector::FirmwareSlot2.block_size(), 0x10000);
    assert_eq!(KnownSector::Stage0.to_string(), "Kboot stage-0");
}

#[test]
fn app_at_arbitrary_address_in_range() {
    let data = payload(0x4000);
    let mut flash = Flash::new(0x820000);
    flash.place(0x800000, &sector_image(&data, APP_BLOCK_SIZE));

    let app = AppSector::validate(&mut flash, 0x800000, Profile::Kboot).unwrap();
    assert!(app.is_valid());
    assert_eq!(app.block_size, 0x10000);
    assert_eq!(app.declared_size, 0x4000);
    assert_eq!(app.total_size, 0x10000);
    assert_eq!(app.payload_crc32, zlib_crc32(&data));
}

#[test]
fn app_address_checks() {
    let mut flash = Flash::new(0x20000);
    assert_eq!(
        AppSector::validate(&mut flash, 0x10001, Profile::Kboot),
        Err(Error::UnalignedAddress(0x10001))
    );
    assert_eq!(
        AppSector::validate(&mut flash, 0x2000, Profile::Kboot),
        Err(Error::UnknownAppAddress(0x2000))
    );
    assert_eq!(
        AppSector::validate(&mut flash, 0x900000, Profile::Kboot),
        Err(Error::UnknownAppAddress(0x900000))
    );
    assert_eq!(flash.reads(), 0);

    assert_eq!(
        AppSector::validate(&mut flash, 0x10000, Profile::Kboot),
        Err(Error::InvalidAesMarker {
            address: 0x10000,
            value: 0xff
        })
    );
}

#[test]
fn app_near_the_end_of_flash_is_bounded() {
    let address = FLASH_SIZE - 0x10000;
    let mut flash = Flash::new(FLASH_SIZE as usize);
    let mut header = vec![0x00];
    header.extend_from_slice(&0x10000u32.to_le_bytes());
    flash.place(address as usize, &header);

    assert_eq!(
        AppSector::validate(&mut flash, address, Profile::Ktool),
        Err(Error::ImplausibleSize {
            address,
            declared: 0x10000,
            max: 0x10000 - 37
        })
    );
}
