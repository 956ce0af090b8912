//! Ratcliff/Obershelp string similarity.
//!
//! The ratio is `2 * M / T`, where `T` is the total number of characters in
//! both strings and `M` the number of characters covered by the matching
//! blocks: the longest common run is found first, then the same search
//! recurses into the pieces left and right of it.
//!
//! Matching runs over Unicode scalar values, not bytes.

use rustc_hash::FxHashMap;

/// Sequences at least this long get the popular-element heuristic.
const POPULAR_MIN_LEN: usize = 200;

// ============================================================================
// Sequence Matcher
// ============================================================================

struct SequenceMatcher {
    a: Vec<char>,
    b: Vec<char>,
    /// Positions of every char of `b`, ascending. Popular chars are removed.
    b2j: FxHashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    fn new(a: &str, b: &str) -> Self {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();

        let mut b2j: FxHashMap<char, Vec<usize>> = FxHashMap::default();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }

        // Chars making up more than 1% of a long `b` are not used to seed
        // matches (they can still extend one).
        let n = b.len();
        if n >= POPULAR_MIN_LEN {
            let ntest = n / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= ntest);
        }

        Self { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` / `b[blo..bhi]`.
    ///
    /// Ties go to the block starting earliest in `a`, then earliest in `b`.
    /// Returns `(i, j, size)`.
    fn find_longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);

        // j2len[j] = length of the longest match ending with a[i-1] and b[j]
        let mut j2len: FxHashMap<usize, usize> = FxHashMap::default();
        for i in alo..ahi {
            let mut newj2len: FxHashMap<usize, usize> = FxHashMap::default();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    newj2len.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = newj2len;
        }

        // Popular chars never seed a match; grow the block over them here.
        while besti > alo && bestj > blo && self.a[besti - 1] == self.b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi
            && bestj + bestsize < bhi
            && self.a[besti + bestsize] == self.b[bestj + bestsize]
        {
            bestsize += 1;
        }

        (besti, bestj, bestsize)
    }

    /// Total size of all matching blocks.
    fn matching_chars(&self) -> usize {
        let mut matched = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            matched += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        matched
    }

    fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * self.matching_chars() as f64 / total as f64
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Ratio for the ordered pair `(a, b)`.
///
/// Longest-match tie-breaking depends on argument order, so on rare inputs
/// `sequence_ratio(a, b) != sequence_ratio(b, a)`.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(a, b).ratio()
}

/// Symmetric similarity in `[0, 1]`.
///
/// The pair is put in a canonical order before matching, so swapping the
/// arguments never changes the result. 1.0 for identical strings (including
/// two empty strings), 0.0 when no character is shared.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a <= b {
        sequence_ratio(a, b)
    } else {
        sequence_ratio(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_identical_and_disjoint() {
        assert!(approx(similarity_ratio("midnight drive", "midnight drive"), 1.0));
        assert!(approx(similarity_ratio("abc", "xyz"), 0.0));
        assert!(approx(similarity_ratio("", ""), 1.0));
        assert!(approx(similarity_ratio("abc", ""), 0.0));
    }

    #[test]
    fn test_known_ratios() {
        // "abcd" / "bcde": one block "bcd" -> 2*3/8
        assert!(approx(sequence_ratio("abcd", "bcde"), 0.75));
        // Blocks "a", "b" ... -> classic example from the algorithm's description
        assert!(approx(sequence_ratio("abxcd", "abcd"), 2.0 * 4.0 / 9.0));
        // "private Thread currentThread;" vs "private volatile Thread currentThread;"
        let r = sequence_ratio(
            "private Thread currentThread;",
            "private volatile Thread currentThread;",
        );
        assert!(approx(r, 2.0 * 29.0 / 67.0));
    }

    #[test]
    fn test_recurses_left_and_right() {
        // longest block "drive", then "m" on the left and "s" on the right
        let r = sequence_ratio("mdrives", "m drive s");
        assert!(approx(r, 2.0 * 7.0 / 16.0));
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("summer nights", "completely unrelated song"),
            ("dj nova", "nobody"),
            ("abab", "baba"),
            ("tide", "diet"),
            ("midnight drive club mix", "midnight drive"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity_ratio(a, b), similarity_ratio(b, a), "{:?}/{:?}", a, b);
        }
    }

    #[test]
    fn test_unicode_counts_chars_not_bytes() {
        assert!(approx(sequence_ratio("été", "ete"), 2.0 * 1.0 / 6.0));
    }

    #[test]
    fn test_popular_elements_still_extend_matches() {
        // 'a' fills most of the long sequence, so it cannot seed a match
        let long: String = std::iter::repeat('a').take(250).collect::<String>() + "xyz";
        let r = sequence_ratio("axyz", &long);
        // "xyz" seeds the block, extension backwards picks up one 'a'
        assert!(approx(r, 2.0 * 4.0 / (4.0 + 253.0)));
    }

    #[test]
    fn test_ratio_bounds() {
        let r = similarity_ratio("sunset groove", "summer nights");
        assert!((0.0..=1.0).contains(&r));
    }
}
