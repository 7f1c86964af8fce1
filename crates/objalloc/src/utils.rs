//! Size and alignment helpers shared by the layout and page code

/// Size of a machine word; also the size of every intrusive link
pub const WORD: usize = size_of::<usize>();

/// Rounds `n` up to the next multiple of `alignment`
///
/// Unlike [`usize::next_multiple_of`] an alignment of zero means "no
/// alignment" and returns `n` unchanged. Alignments need not be powers of two.
/// Returns `None` on overflow.
///
/// # Examples
/// ```
/// use objalloc::utils::align;
///
/// assert_eq!(align(13, 8), Some(16));
/// assert_eq!(align(16, 8), Some(16));
/// assert_eq!(align(7, 6), Some(12));
/// assert_eq!(align(7, 0), Some(7));
/// ```
#[inline]
#[must_use]
pub const fn align(n: usize, alignment: usize) -> Option<usize> {
    if alignment == 0 {
        return Some(n);
    }
    n.checked_next_multiple_of(alignment)
}

/// Number of bytes needed to pad `n` up to `alignment`
#[inline]
#[must_use]
pub const fn padding_needed(n: usize, alignment: usize) -> usize {
    match align(n, alignment) {
        Some(aligned) => aligned - n,
        None => 0,
    }
}

/// Largest power of two that divides `n` (`n == 0` yields 1)
///
/// # Examples
/// ```
/// use objalloc::utils::largest_pow2_dividing;
///
/// assert_eq!(largest_pow2_dividing(24), 8);
/// assert_eq!(largest_pow2_dividing(7), 1);
/// ```
#[inline]
#[must_use]
pub const fn largest_pow2_dividing(n: usize) -> usize {
    if n == 0 { 1 } else { 1 << n.trailing_zeros() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_powers_of_two() {
        assert_eq!(align(0, 8), Some(0));
        assert_eq!(align(1, 8), Some(8));
        assert_eq!(align(17, 16), Some(32));
    }

    #[test]
    fn test_align_odd_values() {
        assert_eq!(align(10, 3), Some(12));
        assert_eq!(align(12, 3), Some(12));
        assert_eq!(padding_needed(10, 3), 2);
    }

    #[test]
    fn test_align_overflow() {
        assert_eq!(align(usize::MAX, 8), None);
    }

    #[test]
    fn test_largest_pow2_dividing() {
        assert_eq!(largest_pow2_dividing(0), 1);
        assert_eq!(largest_pow2_dividing(12), 4);
        assert_eq!(largest_pow2_dividing(64), 64);
    }
}
