//! Alignment helpers and size constants

/// Memory size constants
pub mod size {
    /// 1 Kilobyte
    pub const KB: u64 = 1024;

    /// 1 Megabyte
    pub const MB: u64 = 1024 * KB;

    /// 1 Gigabyte
    pub const GB: u64 = 1024 * MB;
}

/// Round `value` up to the next multiple of `align`.
///
/// `align` must be a non-zero power of two; device-reported alignments
/// (uniform offset, storage offset, copy granularity) always are.
#[inline(always)]
#[must_use]
pub const fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// True if `value` is a multiple of `align` (power of two).
#[inline(always)]
#[must_use]
pub const fn is_aligned(value: u64, align: u64) -> bool {
    debug_assert!(align.is_power_of_two());
    value & (align - 1) == 0
}
