//! `top20`: the first distinct values of a column, in order of appearance.
//!
//! The list is a fixed region in the arena: an 8-byte count followed by
//! [`TOP_N`] entries of 12 bytes, each the handle of one stored value.

use super::{Slot, slice_from_bytes, slice_to_bytes};
use crate::arena::Arena;
use crate::error::ArenaError;
use crate::io::csv::escape_csv_field_into;
use memchr::memchr_iter;

/// Most distinct values a `top20` column keeps.
pub const TOP_N: usize = 20;

const HEADER: usize = 8;
const ENTRY: usize = 12;
const REGION: usize = HEADER + TOP_N * ENTRY;

fn len_of(region: &[u8]) -> usize {
    let mut n = [0u8; 8];
    n.copy_from_slice(&region[..HEADER]);
    u64::from_le_bytes(n) as usize
}

fn entry(region: &[u8], i: usize) -> crate::arena::ArenaSlice {
    let at = HEADER + i * ENTRY;
    slice_from_bytes(&region[at..at + ENTRY])
}

pub(super) fn add<A: Arena + ?Sized>(
    arena: &mut A,
    slot: &mut Slot,
    value: &[u8],
) -> Result<(), ArenaError> {
    let list = match *slot {
        Slot::List(list) => list,
        _ => {
            let list = arena.alloc(REGION, 8)?;
            *slot = Slot::List(list);
            list
        }
    };

    let region = arena.get(list);
    let n = len_of(region);
    if n >= TOP_N || (0..n).any(|i| arena.get(entry(region, i)) == value) {
        return Ok(());
    }

    let stored = arena.alloc_copy(value)?;
    let region = arena.get_mut(list);
    let at = HEADER + n * ENTRY;
    slice_to_bytes(stored, &mut region[at..at + ENTRY]);
    region[..HEADER].copy_from_slice(&(n as u64 + 1).to_le_bytes());
    Ok(())
}

/// Re-split a rendered list and add each element.
pub(super) fn merge<A: Arena + ?Sized>(
    arena: &mut A,
    slot: &mut Slot,
    prior: &[u8],
) -> Result<(), ArenaError> {
    let mut start = 0;
    for comma in memchr_iter(b',', prior) {
        add(arena, slot, &prior[start..comma])?;
        start = comma + 1;
    }
    add(arena, slot, &prior[start..])
}

pub(super) fn out<A: Arena + ?Sized>(arena: &A, slot: &Slot, quote: u8, out: &mut Vec<u8>) {
    let Slot::List(list) = *slot else {
        return;
    };
    let region = arena.get(list);
    let mut joined = Vec::new();
    for i in 0..len_of(region) {
        if i > 0 {
            joined.push(b',');
        }
        joined.extend_from_slice(arena.get(entry(region, i)));
    }
    escape_csv_field_into(&joined, quote, out);
}
