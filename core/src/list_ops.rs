//! Set operations over ascending, duplicate-free integer lists.
//!
//! `intersect` and `subtract` probe the other list through skip pointers placed
//! every `floor(sqrt(len))` elements; between two skip targets the remaining
//! window is binary searched.

use std::cmp::Ordering;

/// Skip pointer indices for `len` elements.
fn skip_pointers(len: usize) -> Vec<usize> {
    let stride = ((len as f64).sqrt().floor() as usize).max(1);
    (0..len).step_by(stride).collect()
}

/// Forward-only membership probe over a sorted list.
///
/// Probes must be issued in ascending order. Every element before `ptr` is
/// smaller than the last probed value.
struct SkipCursor<'a> {
    list: &'a [u32],
    skips: Vec<usize>,
    ptr: usize,
    skip: usize,
}

impl<'a> SkipCursor<'a> {
    fn new(list: &'a [u32]) -> Self {
        Self { list, skips: skip_pointers(list.len()), ptr: 0, skip: 0 }
    }

    fn contains(&mut self, target: u32) -> bool {
        if self.ptr >= self.list.len() {
            return false;
        }
        while self.skip < self.skips.len() && self.list[self.skips[self.skip]] < target {
            self.ptr = self.ptr.max(self.skips[self.skip]);
            self.skip += 1;
        }
        let end = match self.skips.get(self.skip) {
            Some(&s) => s + 1,
            None => self.list.len(),
        };
        match self.list[self.ptr..end].binary_search(&target) {
            Ok(i) => {
                self.ptr += i;
                true
            }
            Err(i) => {
                self.ptr += i;
                false
            }
        }
    }
}

/// Elements present in both lists.
pub fn intersect(a: &[u32], b: &[u32]) -> Vec<u32> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let (scan, probe) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut cursor = SkipCursor::new(probe);
    scan.iter().copied().filter(|&v| cursor.contains(v)).collect()
}

/// Merge of both lists with equal elements kept once.
pub fn union(a: &[u32], b: &[u32]) -> Vec<u32> {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() {
        return a.to_vec();
    }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Elements of `a` that are not in `b`.
pub fn subtract(a: &[u32], b: &[u32]) -> Vec<u32> {
    if a.is_empty() {
        return Vec::new();
    }
    if b.is_empty() {
        return a.to_vec();
    }
    let mut cursor = SkipCursor::new(b);
    a.iter().copied().filter(|&v| !cursor.contains(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn sorted_set() -> impl Strategy<Value = Vec<u32>> {
        proptest::collection::btree_set(0u32..500, 0..120).prop_map(|s| s.into_iter().collect())
    }

    #[test]
    fn skip_stride_is_sqrt() {
        assert_eq!(skip_pointers(16), vec![0, 4, 8, 12]);
        assert_eq!(skip_pointers(10), vec![0, 3, 6, 9]);
        assert_eq!(skip_pointers(1), vec![0]);
        assert!(skip_pointers(0).is_empty());
    }

    #[test]
    fn intersect_basic() {
        assert_eq!(intersect(&[1, 3, 5], &[3, 5, 7]), vec![3, 5]);
        assert_eq!(intersect(&[2], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]), vec![2]);
        assert_eq!(intersect(&[10], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]), vec![10]);
        assert!(intersect(&[], &[1, 2]).is_empty());
        assert!(intersect(&[1, 2], &[]).is_empty());
    }

    #[test]
    fn union_basic() {
        assert_eq!(union(&[1, 3, 5], &[3, 5, 7]), vec![1, 3, 5, 7]);
        assert_eq!(union(&[], &[4, 9]), vec![4, 9]);
        assert_eq!(union(&[4, 9], &[]), vec![4, 9]);
    }

    #[test]
    fn subtract_basic() {
        assert_eq!(subtract(&[1, 3, 5, 7], &[3, 7]), vec![1, 5]);
        assert_eq!(subtract(&[1, 3], &[]), vec![1, 3]);
        assert!(subtract(&[], &[1]).is_empty());
    }

    proptest! {
        #[test]
        fn intersect_matches_set_semantics(a in sorted_set(), b in sorted_set()) {
            let expected: Vec<u32> = a.iter().filter(|v| b.contains(v)).copied().collect();
            prop_assert_eq!(intersect(&a, &b), expected.clone());
            prop_assert_eq!(intersect(&b, &a), expected);
        }

        #[test]
        fn union_matches_set_semantics(a in sorted_set(), b in sorted_set()) {
            let merged: BTreeSet<u32> = a.iter().chain(b.iter()).copied().collect();
            let expected: Vec<u32> = merged.into_iter().collect();
            prop_assert_eq!(union(&a, &b), expected);
        }

        #[test]
        fn subtract_matches_set_semantics(a in sorted_set(), b in sorted_set()) {
            let expected: Vec<u32> = a.iter().filter(|v| !b.contains(v)).copied().collect();
            prop_assert_eq!(subtract(&a, &b), expected);
        }
    }
}
