// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;
use crate::escape_codepoint;

/// Number of codepoints: a negated class is the complement of the class in `[0, CODEPOINT_END)`.
pub const CODEPOINT_END: u32 = 0x11_0000;

/// Last codepoint considered when looking for characters with a different case.
const CASE_DIFF_MAX: u32 = 0x1_6e7f;

// ---------------------------------------------------------------------------------------------
// Seg

/// Inclusive range of codepoints.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Seg(pub u32, pub u32);

impl Seg {
    #[inline]
    pub fn contains(&self, c: u32) -> bool {
        self.0 <= c && c <= self.1
    }
}

impl Display for Seg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 == self.1 {
            write!(f, "'{}'", escape_codepoint(self.0))
        } else {
            write!(f, "'{}'-'{}'", escape_codepoint(self.0), escape_codepoint(self.1))
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Segments

/// Set of codepoint ranges. The ranges are sorted; after [normalize](Segments::normalize),
/// they're also disjoint and non-contiguous.
#[derive(Clone, PartialEq, Default, PartialOrd, Eq, Ord)]
pub struct Segments(pub BTreeSet<Seg>);

impl Segments {
    #[inline]
    pub fn empty() -> Self {
        Segments(BTreeSet::new())
    }

    pub fn new(Seg(a, b): Seg) -> Self {
        let mut segments = Self::empty();
        segments.insert(Seg(a, b));
        segments
    }

    pub fn from_char(c: char) -> Self {
        Self::new(Seg(c as u32, c as u32))
    }

    pub fn insert(&mut self, seg: Seg) {
        if seg.0 <= seg.1 {
            self.0.insert(seg);
        }
    }

    pub fn contains_codepoint(&self, c: u32) -> bool {
        self.0.iter().any(|seg| seg.contains(c))
    }

    /// Merges the overlapping and contiguous segments.
    pub fn normalize(&mut self) {
        let mut segments = std::mem::take(&mut self.0).into_iter();
        if let Some(mut last) = segments.next() {
            let mut new = BTreeSet::<Seg>::new();
            for Seg(a, b) in segments {
                if a > last.1.saturating_add(1) {
                    new.insert(last);
                    last = Seg(a, b);
                } else {
                    last.1 = last.1.max(b);
                }
            }
            new.insert(last);
            self.0 = new;
        }
    }

    pub fn normalized(&self) -> Self {
        let mut n = self.clone();
        n.normalize();
        n
    }

    /// Complement in the full codepoint space `[0, CODEPOINT_END)`, surrogates included.
    pub fn negate(&self) -> Self {
        let mut inv = Segments::empty();
        let mut start = 0;
        for seg in self.normalized().iter() {
            if seg.0 > start {
                inv.insert(Seg(start, seg.0 - 1));
            }
            start = seg.1 + 1;
        }
        if start < CODEPOINT_END {
            inv.insert(Seg(start, CODEPOINT_END - 1));
        }
        inv
    }

    /// Adds the upper- and lower-case variants of each codepoint in the set, then normalizes.
    pub fn case_folded(&self) -> Self {
        let mut folded = self.normalized();
        let mut added = Vec::<u32>::new();
        for seg in self.iter() {
            added.extend(diff_points(upper_case_diffs(), *seg).filter_map(simple_upper));
            added.extend(diff_points(lower_case_diffs(), *seg).filter_map(simple_lower));
        }
        for c in added {
            folded.insert(Seg(c, c));
        }
        folded.normalize();
        folded
    }

    /// Normalized ranges of the class, with case folding and negation applied in that order.
    pub fn ordered_ranges(&self, ignore_case: bool, negated: bool) -> Vec<Seg> {
        let mut set = if ignore_case { self.case_folded() } else { self.normalized() };
        if negated {
            set = set.negate();
        }
        set.0.into_iter().collect()
    }
}

impl<const N: usize> From<[Seg; N]> for Segments {
    fn from(arr: [Seg; N]) -> Self {
        let mut segments = Segments::empty();
        for seg in arr {
            segments.insert(seg);
        }
        segments
    }
}

impl Deref for Segments {
    type Target = BTreeSet<Seg>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Segments {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Debug for Segments {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Segments({})", self.0.iter().map(|seg| format!("Seg(0x{:x}, 0x{:x})", seg.0, seg.1)).collect::<Vec<_>>().join(", "))
    }
}

impl Display for Segments {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().map(|seg| seg.to_string()).collect::<Vec<_>>().join(", "))
    }
}

// ---------------------------------------------------------------------------------------------
// Case mapping

/// Simple (single codepoint) upper-case mapping, if it differs from `c`.
pub fn simple_upper(c: u32) -> Option<u32> {
    let ch = char::from_u32(c)?;
    let mut upper = ch.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) if u != ch => Some(u as u32),
        _ => None,
    }
}

/// Simple (single codepoint) lower-case mapping, if it differs from `c`.
pub fn simple_lower(c: u32) -> Option<u32> {
    let ch = char::from_u32(c)?;
    let mut lower = ch.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) if l != ch => Some(l as u32),
        _ => None,
    }
}

fn case_diffs(map: fn(u32) -> Option<u32>) -> Vec<u32> {
    (0..=CASE_DIFF_MAX).filter(|&c| map(c).is_some()).collect()
}

/// Sorted codepoints whose upper-case form is different.
fn upper_case_diffs() -> &'static [u32] {
    static UPPER: OnceLock<Vec<u32>> = OnceLock::new();
    UPPER.get_or_init(|| case_diffs(simple_upper))
}

/// Sorted codepoints whose lower-case form is different.
fn lower_case_diffs() -> &'static [u32] {
    static LOWER: OnceLock<Vec<u32>> = OnceLock::new();
    LOWER.get_or_init(|| case_diffs(simple_lower))
}

fn diff_points(diffs: &'static [u32], Seg(a, b): Seg) -> impl Iterator<Item = u32> {
    let start = diffs.partition_point(|&c| c < a);
    diffs[start..].iter().copied().take_while(move |&c| c <= b)
}

// ---------------------------------------------------------------------------------------------
