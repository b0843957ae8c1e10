// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

// Literals of the collections used by the NFA states and the character classes

/// Generates the code to initialize a [BTreeSet](std::collections::BTreeSet).
///
/// # Example
/// ```
/// # #[macro_use] fn main() {
/// # use std::collections::BTreeSet;
/// # use parsegen_analysis::btreeset;
/// let states = btreeset![3, 1, 2];
/// assert_eq!(states, BTreeSet::from([1, 2, 3]));
/// # }
/// ```
#[macro_export(local_inner_macros)]
macro_rules! btreeset {
    () => { std::collections::BTreeSet::new() };
    ($($key:expr,)+) => { btreeset!($($key),+) };
    ($($key:expr),*) => { std::collections::BTreeSet::from([ $($key,)* ]) };
}

/// Generates a [Seg](crate::segments::Seg) from a character or a character range.
///
/// # Example
/// ```
/// # #[macro_use] fn main() {
/// # use parsegen_analysis::{seg, segments::Seg};
/// assert_eq!(seg!('a'), Seg('a' as u32, 'a' as u32));
/// assert_eq!(seg!('a' - 'z'), Seg('a' as u32, 'z' as u32));
/// # }
/// ```
#[macro_export(local_inner_macros)]
macro_rules! seg {
    ($a:literal - $b:literal) => { $crate::segments::Seg($a as u32, $b as u32) };
    ($a:literal) => { $crate::segments::Seg($a as u32, $a as u32) };
}

/// Generates a [Segments](crate::segments::Segments) from a list of characters or ranges.
///
/// # Example
/// ```
/// # #[macro_use] fn main() {
/// # use parsegen_analysis::{segments, segments::{Seg, Segments}};
/// let digits_and_x = segments!['0'-'9', 'x'];
/// assert_eq!(digits_and_x, Segments::from([Seg('0' as u32, '9' as u32), Seg('x' as u32, 'x' as u32)]));
/// # }
/// ```
#[macro_export(local_inner_macros)]
macro_rules! segments {
    () => { $crate::segments::Segments::empty() };
    ($($a:literal $(- $b:literal)?),+ $(,)?) => {
        $crate::segments::Segments::from([$(seg!($a $(- $b)?)),+])
    };
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use crate::segments::{Seg, Segments};

    #[test]
    fn sets() {
        assert_eq!(btreeset![5, 1, 3], BTreeSet::from([1, 3, 5]));
        assert_eq!(btreeset!(), BTreeSet::<u32>::new());
    }

    #[test]
    fn segs() {
        assert_eq!(seg!('a' - 'c'), Seg(97, 99));
        assert_eq!(segments!['a'-'c', 'e'], Segments::from([Seg(97, 99), Seg(101, 101)]));
    }
}
