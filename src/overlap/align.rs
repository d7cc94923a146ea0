/*!
Unit-cost alignment primitives used to verify seeded overlaps and to
compare bubble branches.
*/

const INF: usize = usize::MAX / 2;

/// Edit distance between `a` and `b`, restricted to a band of
/// `band` cells around the main diagonal (widened to always contain
/// the length difference). With `band >= max(len)` this is the exact
/// edit distance.
pub fn banded_edit_distance(a: &[u8], b: &[u8], band: usize) -> usize {
    let (n, m) = (a.len(), b.len());
    let diff = m as isize - n as isize;
    let lo_off = diff.min(0) - band as isize;
    let hi_off = diff.max(0) + band as isize;

    let mut prev = vec![INF; m + 1];
    let mut cur = vec![INF; m + 1];

    let mut plo = 0usize;
    let mut phi = (hi_off as usize).min(m);
    for (j, cell) in prev.iter_mut().enumerate().take(phi + 1) {
        *cell = j;
    }

    for i in 1..=n {
        let lo = (i as isize + lo_off).max(0) as usize;
        let hi = ((i as isize + hi_off) as usize).min(m);

        for j in lo..=hi {
            let mut best = INF;
            if j == 0 {
                best = i;
            } else {
                if j - 1 >= plo && j - 1 <= phi {
                    let mismatch = (a[i - 1] != b[j - 1]) as usize;
                    best = prev[j - 1] + mismatch;
                }
                if j - 1 >= lo {
                    best = best.min(cur[j - 1] + 1);
                }
            }
            if j >= plo && j <= phi {
                best = best.min(prev[j] + 1);
            }
            cur[j] = best;
        }

        std::mem::swap(&mut prev, &mut cur);
        plo = lo;
        phi = hi;
    }

    prev[m]
}

/// Exact edit distance.
#[inline]
pub fn edit_distance(a: &[u8], b: &[u8]) -> usize {
    banded_edit_distance(a, b, a.len().max(b.len()))
}

/// Edit distance normalized by the longer sequence, in `[0, 1]`.
pub fn sequence_divergence(a: &[u8], b: &[u8], band: usize) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    banded_edit_distance(a, b, band) as f64 / longest as f64
}

/// Number of edits implied between two colinear k-mer anchors
/// `(query_pos, target_pos)`, aligning the unmatched gap sequences
/// where both are non-empty.
pub fn anchor_gap_edits(
    query: &[u8],
    target: &[u8],
    k: usize,
    from: (usize, usize),
    to: (usize, usize),
) -> usize {
    let gap_q = to.0 as isize - (from.0 + k) as isize;
    let gap_t = to.1 as isize - (from.1 + k) as isize;

    if gap_q > 0 && gap_t > 0 {
        let q = &query[from.0 + k..to.0];
        let t = &target[from.1 + k..to.1];
        edit_distance(q, t)
    } else {
        (gap_q - gap_t).unsigned_abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_distances() {
        assert_eq!(edit_distance(b"", b""), 0);
        assert_eq!(edit_distance(b"ACGT", b""), 4);
        assert_eq!(edit_distance(b"", b"AC"), 2);
        assert_eq!(edit_distance(b"ACGT", b"ACGT"), 0);
        assert_eq!(edit_distance(b"ACGT", b"AGGT"), 1);
        assert_eq!(edit_distance(b"ACGT", b"ACT"), 1);
        assert_eq!(edit_distance(b"kitten", b"sitting"), 3);
    }

    #[test]
    fn band_matches_exact_when_wide_enough() {
        let a = b"ACGTTGCAACGTAGCTAGCTAGGATCCA";
        let b = b"ACGTTGAACGTAGCTTAGCTAGGATCA";
        let exact = edit_distance(a, b);
        assert_eq!(banded_edit_distance(a, b, 3), exact);
        assert!(banded_edit_distance(a, b, 0) >= exact);
    }

    #[test]
    fn anchor_gaps() {
        let q = b"AAAACCCCGGGGTTTT";
        let t = b"AAAACCACGGGGTTTT";
        // adjacent anchors, no gap
        assert_eq!(anchor_gap_edits(q, t, 4, (0, 0), (1, 1)), 0);
        // gap with one mismatch
        assert_eq!(anchor_gap_edits(q, t, 4, (0, 0), (8, 8)), 1);
        // shifted diagonal means an indel
        assert_eq!(anchor_gap_edits(q, t, 4, (0, 0), (2, 3)), 1);
    }
}
