//! Integer accumulators: Min, Max, Count

use super::Slot;
use crate::utils::parse_i64_lenient;

fn int(slot: &Slot) -> i64 {
    match slot {
        Slot::Int(v) => *v,
        _ => 0,
    }
}

/* ===================== Min / Max ===================== */

/// Smallest integer seen. The first value is always adopted.
pub(super) fn min(slot: &mut Slot, field: &[u8], first: bool) {
    let v = parse_i64_lenient(field);
    if first || v < int(slot) {
        *slot = Slot::Int(v);
    }
}

/// Largest integer seen. The first value is always adopted.
pub(super) fn max(slot: &mut Slot, field: &[u8], first: bool) {
    let v = parse_i64_lenient(field);
    if first || v > int(slot) {
        *slot = Slot::Int(v);
    }
}

/* ===================== Count ===================== */

pub(super) fn count(slot: &mut Slot, first: bool) {
    *slot = Slot::Int(if first { 1 } else { int(slot).saturating_add(1) });
}

/// Sum of counts rendered by earlier runs.
pub(super) fn count_merge(slot: &mut Slot, prior: &[u8], first: bool) {
    let base = if first { 0 } else { int(slot) };
    *slot = Slot::Int(base.saturating_add(parse_i64_lenient(prior)));
}

pub(super) fn out(slot: &Slot, out: &mut Vec<u8>) {
    out.extend_from_slice(int(slot).to_string().as_bytes());
}
