//! Alignment helpers.

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of zero or one leaves the value unchanged.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    ((value + alignment - 1) / alignment) * alignment
}

/// Smallest power of two that is greater than or equal to `value`.
#[inline]
pub const fn next_pow2(value: u32) -> u32 {
    if value <= 1 {
        1
    } else {
        value.next_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(80, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(3202, 4), 3204);
    }

    #[test]
    fn align_up_ignores_trivial_alignment() {
        assert_eq!(align_up(13, 0), 13);
        assert_eq!(align_up(13, 1), 13);
    }

    #[test]
    fn next_pow2_values() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(64), 64);
        assert_eq!(next_pow2(65), 128);
    }
}
