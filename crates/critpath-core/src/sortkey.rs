//! Fractional-index sort keys (§9 "Sort keys").
//!
//! Sibling order is a lexicographically-ordered base-62 string such that a
//! key can always be generated strictly between any two adjacent keys (or
//! before the first / after the last), so indent/outdent and drag-reorder
//! never require renumbering the rest of the list.
//!
//! Each key is read as a base-62 fraction in `[0, 1)`: digit `i` contributes
//! `value(i) * 62^-(i+1)`. Keys are generated with their final digit
//! nonzero, so string comparison and fraction-value comparison always
//! agree.

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u8 = 62;
/// Defends against malformed input keys producing a non-terminating walk.
const MAX_DEPTH: usize = 128;

fn digit_value(c: u8) -> u8 {
    DIGITS.iter().position(|&d| d == c).unwrap_or(0) as u8
}

fn to_digits(key: &str) -> Vec<u8> {
    key.bytes().map(digit_value).collect()
}

fn from_digits(digits: &[u8]) -> String {
    digits.iter().map(|&d| DIGITS[d as usize] as char).collect()
}

/// Digit at position `i` of `lo`, or `0` past its end (an absent digit is an
/// implicit trailing zero of the fraction).
fn lo_digit(lo: &[u8], i: usize) -> u8 {
    lo.get(i).copied().unwrap_or(0)
}

/// Digit at position `i` of a bounded `hi`, or `BASE` (an open/unbounded
/// upper digit) once `hi_bounded` has been cleared by the caller.
fn hi_digit(hi: Option<&[u8]>, hi_bounded: bool, i: usize) -> u8 {
    if !hi_bounded {
        return BASE;
    }
    match hi {
        Some(digits) => digits.get(i).copied().unwrap_or(0),
        None => BASE,
    }
}

/// Strict midpoint between `lo` (inclusive lower bound, `None` = 0) and
/// `hi` (exclusive upper bound, `None` = unbounded/1).
fn midpoint(lo: &[u8], hi: Option<&[u8]>) -> Vec<u8> {
    let mut result = Vec::new();
    let mut hi_bounded = hi.is_some();
    let mut i = 0;
    loop {
        if i > MAX_DEPTH {
            result.push(BASE / 2);
            break;
        }
        let d_lo = lo_digit(lo, i);
        let d_hi = hi_digit(hi, hi_bounded, i);
        if d_lo == d_hi {
            result.push(d_lo);
            i += 1;
            continue;
        }
        let gap = d_hi.saturating_sub(d_lo);
        if gap > 1 {
            result.push(d_lo + gap / 2);
            break;
        }
        // gap == 1: can't split at this digit; take lo's digit and treat
        // the remaining tail as unbounded above (anything > lo works).
        result.push(d_lo);
        hi_bounded = false;
        i += 1;
    }
    result
}

/// Generates a sort key strictly between `lo` and `hi`. `None` for `lo`
/// means "before the first sibling"; `None` for `hi` means "after the
/// last sibling"; both `None` is the key for the first task ever inserted
/// under a parent.
pub fn key_between(lo: Option<&str>, hi: Option<&str>) -> String {
    let lo_digits = lo.map(to_digits).unwrap_or_default();
    let hi_digits = hi.map(to_digits);
    let mid = midpoint(&lo_digits, hi_digits.as_deref());
    from_digits(&mid)
}
