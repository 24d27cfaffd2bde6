//! Version range matching
//!
//! `^x` matches on the major component only, `>=x.y.z`
//! compares numerically, anything else must match exactly.

use std::cmp::Ordering;

/// Check an actual version against a required range
pub fn satisfies(actual: &str, required: &str) -> bool {
    if let Some(rest) = required.strip_prefix('^') {
        let required_major = rest.split('.').next().and_then(leading_number);
        let actual_major = actual.split('.').next().and_then(leading_number);
        return match (actual_major, required_major) {
            (Some(a), Some(r)) => a == r,
            _ => false,
        };
    }
    if let Some(rest) = required.strip_prefix(">=") {
        return compare(actual, rest) != Ordering::Less;
    }
    actual == required
}

/// Compare the first three numeric components; missing ones count as 0
pub fn compare(left: &str, right: &str) -> Ordering {
    let left = components(left);
    let right = components(right);
    left.cmp(&right)
}

fn components(version: &str) -> [u64; 3] {
    let mut parts = [0u64; 3];
    for (slot, part) in parts.iter_mut().zip(version.trim().split('.')) {
        *slot = leading_number(part).unwrap_or(0);
    }
    parts
}

/// Parse the leading decimal digits of a component ("3rc1" -> 3)
fn leading_number(part: &str) -> Option<u64> {
    let part = part.trim();
    let end = part
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(part.len(), |(i, _)| i);
    part[..end].parse().ok()
}
