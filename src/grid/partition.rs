//! Balanced block partition of `[0, n)` over `parts` processes.
//!
//! Process `c` owns `[n*c/parts, n*(c+1)/parts)`. The ranges tile `[0, n)`
//! exactly; their lengths differ by at most one and may be zero when
//! `parts > n`. Intermediate products use 128-bit arithmetic.

use std::ops::Range;

#[inline]
fn scaled(n: usize, c: usize, parts: usize) -> usize {
    debug_assert!(parts > 0, "partition over zero parts");
    ((n as u128 * c as u128) / parts as u128) as usize
}

/// First index owned by coordinate `c`.
#[inline]
pub fn global_begin(n: usize, parts: usize, c: usize) -> usize {
    scaled(n, c, parts)
}

/// One past the last index owned by coordinate `c`.
#[inline]
pub fn global_end(n: usize, parts: usize, c: usize) -> usize {
    scaled(n, c + 1, parts)
}

pub fn local_range(n: usize, parts: usize, c: usize) -> Range<usize> {
    global_begin(n, parts, c)..global_end(n, parts, c)
}

/// All `parts` ranges in coordinate order.
pub fn partition_ranges(n: usize, parts: usize) -> Vec<Range<usize>> {
    (0..parts).map(|c| local_range(n, parts, c)).collect()
}

/// Coordinate whose range contains `index`; `None` if `index >= n`.
pub fn owner_of(n: usize, parts: usize, index: usize) -> Option<usize> {
    if index >= n || parts == 0 {
        return None;
    }
    let c = ((index as u128 + 1) * parts as u128 - 1) / n as u128;
    Some(c as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_one_over_four() {
        let lens: Vec<usize> = partition_ranges(31, 4).iter().map(|r| r.len()).collect();
        assert_eq!(lens, vec![7, 8, 8, 8]);
        assert_eq!(owner_of(31, 4, 6), Some(0));
        assert_eq!(owner_of(31, 4, 7), Some(1));
        assert_eq!(owner_of(31, 4, 31), None);
    }

    #[test]
    fn more_parts_than_points() {
        let r = partition_ranges(2, 4);
        assert_eq!(r, vec![0..0, 0..1, 1..1, 1..2]);
        assert_eq!(owner_of(2, 4, 0), Some(1));
        assert_eq!(owner_of(2, 4, 1), Some(3));
    }
}
