use core::ops::RangeInclusive;

/// Valid app sizes for a config entry, in bytes.
pub const APP_SIZE_RANGE: RangeInclusive<u32> = 0x4000..=0x30_0000;

/// Schema variant of the Kboot configuration layout.
///
/// Firmware generations disagree on the upper bound of the app address
/// range. The variant is chosen explicitly; it is never guessed from the
/// flash contents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[strum(serialize_all = "lowercase")]
pub enum Profile {
    /// Apps between 0x10000 and 0x800000 (the 8 MiB bound used by kboot).
    #[default]
    Kboot,
    /// Apps between 0x10000 and 0x8000000 (the bound used by ktool).
    Ktool,
}

impl Profile {
    /// Addresses a config entry may point an app at.
    pub const fn app_address_range(self) -> RangeInclusive<u32> {
        match self {
            Self::Kboot => 0x1_0000..=0x80_0000,
            Self::Ktool => 0x1_0000..=0x800_0000,
        }
    }

    pub const fn app_size_range(self) -> RangeInclusive<u32> {
        APP_SIZE_RANGE
    }
}
