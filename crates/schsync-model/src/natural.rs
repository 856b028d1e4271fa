//! Natural ordering for reference designators, pin numbers, and net names.
//!
//! Plain lexicographic order puts `R10` before `R2`. Every sorted surface in
//! the emitted files goes through [`compare`] instead, so counters read in
//! counting order and repeated runs produce the same layout.

use std::cmp::Ordering;

/// Compare two strings naturally (R1 < R2 < R10).
pub fn compare(a: &str, b: &str) -> Ordering {
    natord::compare(a, b)
}
