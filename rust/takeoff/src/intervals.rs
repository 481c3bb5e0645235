// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 1D interval sets along a line direction.
//!
//! A set is a `Vec<(start, end)>` sorted by start with disjoint members.

pub type Interval = (f64, f64);

/// Sort and fuse intervals whose gap is at most `max_gap`
pub fn merge_intervals(mut intervals: Vec<Interval>, max_gap: f64) -> Vec<Interval> {
    intervals.retain(|(s, e)| e > s);
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if start <= last.1 + max_gap => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Intersection of two interval sets
pub fn intersect(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].0.max(b[j].0);
        let end = a[i].1.min(b[j].1);
        if end > start {
            result.push((start, end));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

/// `a` minus `b`
pub fn subtract(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut result = Vec::new();
    for &(start, end) in a {
        let mut cursor = start;
        for &(bs, be) in b {
            if be <= cursor || bs >= end {
                continue;
            }
            if bs > cursor {
                result.push((cursor, bs));
            }
            cursor = cursor.max(be);
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            result.push((cursor, end));
        }
    }
    result
}

/// Parts of `[lo, hi]` not covered by the set
pub fn complement(set: &[Interval], lo: f64, hi: f64) -> Vec<Interval> {
    subtract(&[(lo, hi)], set)
}

pub fn clip(set: &[Interval], lo: f64, hi: f64) -> Vec<Interval> {
    intersect(set, &[(lo, hi)])
}

pub fn total_length(set: &[Interval]) -> f64 {
    set.iter().map(|(s, e)| e - s).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_with_gap() {
        let merged = merge_intervals(vec![(10.0, 20.0), (0.0, 5.0), (21.0, 30.0)], 1.5);
        assert_eq!(merged, vec![(0.0, 5.0), (10.0, 30.0)]);
    }

    #[test]
    fn test_intersect_and_subtract() {
        let a = vec![(0.0, 10.0), (20.0, 30.0)];
        let b = vec![(5.0, 25.0)];
        assert_eq!(intersect(&a, &b), vec![(5.0, 10.0), (20.0, 25.0)]);
        assert_eq!(subtract(&a, &b), vec![(0.0, 5.0), (25.0, 30.0)]);
        assert_eq!(total_length(&a), 20.0);
    }

    #[test]
    fn test_complement() {
        let gaps = complement(&[(0.0, 4.0), (6.0, 10.0)], 0.0, 10.0);
        assert_eq!(gaps, vec![(4.0, 6.0)]);
        assert_eq!(clip(&[(0.0, 4.0)], 2.0, 10.0), vec![(2.0, 4.0)]);
    }
}
