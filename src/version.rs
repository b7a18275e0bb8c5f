// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM version string comparison.

RPM version strings are compared segment-wise: runs of digits compare
numerically, runs of letters compare lexically, and a numeric segment is
always newer than an alphabetic one. A tilde sorts before everything,
including the end of the string, which is how pre-releases are expressed
(`1.0~beta1` is older than `1.0`).
*/

use std::cmp::Ordering;

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Split the leading run of digits or letters off a string.
///
/// Returns the segment and the remainder. The segment is empty only when
/// the input is empty.
fn split_segment(s: &str) -> (&str, &str) {
    let mut chars = s.chars();

    match chars.next() {
        None => ("", ""),
        Some(first) => {
            let same_class = |c: char| {
                if first.is_ascii_digit() {
                    c.is_ascii_digit()
                } else {
                    c.is_ascii_alphabetic()
                }
            };

            let end = s
                .char_indices()
                .find(|(_, c)| !same_class(*c))
                .map(|(pos, _)| pos)
                .unwrap_or(s.len());

            (&s[..end], &s[end..])
        }
    }
}

/// Compare two all-digit segments numerically.
///
/// Leading zeroes are stripped rather than parsed so arbitrarily long
/// segments cannot overflow.
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');

    match a.len().cmp(&b.len()) {
        Ordering::Equal => a.cmp(b),
        res => res,
    }
}

/// Compare two version strings using the RPM segment rules.
pub fn compare_version(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut a_remaining = a;
    let mut b_remaining = b;

    loop {
        // Drop separator characters. Tilde is not a separator; it is
        // handled below.
        a_remaining = a_remaining.trim_start_matches(|c| !is_segment_char(c) && c != '~');
        b_remaining = b_remaining.trim_start_matches(|c| !is_segment_char(c) && c != '~');

        // A tilde sorts before anything, including end of string.
        match (
            a_remaining.starts_with('~'),
            b_remaining.starts_with('~'),
        ) {
            (true, true) => {
                a_remaining = &a_remaining[1..];
                b_remaining = &b_remaining[1..];
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        if a_remaining.is_empty() || b_remaining.is_empty() {
            return a_remaining.len().cmp(&b_remaining.len());
        }

        let (a_segment, a_rest) = split_segment(a_remaining);
        let (b_segment, b_rest) = split_segment(b_remaining);
        a_remaining = a_rest;
        b_remaining = b_rest;

        let a_numeric = a_segment.starts_with(|c: char| c.is_ascii_digit());
        let b_numeric = b_segment.starts_with(|c: char| c.is_ascii_digit());

        let res = match (a_numeric, b_numeric) {
            // A numeric segment is always newer than an alphabetic one.
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => compare_digits(a_segment, b_segment),
            (false, false) => a_segment.cmp(b_segment),
        };

        if res != Ordering::Equal {
            return res;
        }
    }
}

/// Compare `(epoch, version, release)` tuples.
///
/// The epoch compares numerically, with an empty string counting as zero.
pub fn compare_evr(a: (&str, &str, &str), b: (&str, &str, &str)) -> Ordering {
    let epoch = |s: &str| -> u64 {
        if s.is_empty() {
            0
        } else {
            s.parse().unwrap_or(0)
        }
    };

    epoch(a.0)
        .cmp(&epoch(b.0))
        .then_with(|| compare_version(a.1, b.1))
        .then_with(|| compare_version(a.2, b.2))
}
