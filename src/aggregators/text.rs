//! Text accumulators: first value, bytewise min and max.

use super::Slot;
use crate::arena::{Arena, ArenaSlice};
use crate::error::ArenaError;
use crate::io::csv::escape_csv_field_into;

pub(super) fn bytes<'a, A: Arena + ?Sized>(arena: &'a A, slot: &Slot) -> &'a [u8] {
    match slot {
        Slot::Text(s) => arena.get(*s),
        _ => &[],
    }
}

/// Replace the stored text, reusing its storage when the new value fits.
fn store<A: Arena + ?Sized>(arena: &mut A, slot: &mut Slot, value: &[u8]) -> Result<(), ArenaError> {
    if let Slot::Text(cur) = *slot
        && value.len() <= cur.len()
    {
        arena.get_mut(cur)[..value.len()].copy_from_slice(value);
        *slot = Slot::Text(ArenaSlice {
            len: value.len() as u32,
            ..cur
        });
        return Ok(());
    }
    *slot = Slot::Text(arena.alloc_copy(value)?);
    Ok(())
}

pub(super) fn first<A: Arena + ?Sized>(
    arena: &mut A,
    slot: &mut Slot,
    value: &[u8],
    first: bool,
) -> Result<(), ArenaError> {
    if first {
        store(arena, slot, value)?;
    }
    Ok(())
}

pub(super) fn min<A: Arena + ?Sized>(
    arena: &mut A,
    slot: &mut Slot,
    value: &[u8],
    first: bool,
) -> Result<(), ArenaError> {
    if first || value < bytes(arena, slot) {
        store(arena, slot, value)?;
    }
    Ok(())
}

pub(super) fn max<A: Arena + ?Sized>(
    arena: &mut A,
    slot: &mut Slot,
    value: &[u8],
    first: bool,
) -> Result<(), ArenaError> {
    if first || value > bytes(arena, slot) {
        store(arena, slot, value)?;
    }
    Ok(())
}

pub(super) fn out<A: Arena + ?Sized>(arena: &A, slot: &Slot, quote: u8, out: &mut Vec<u8>) {
    escape_csv_field_into(bytes(arena, slot), quote, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::BumpArena;

    #[test]
    fn shorter_values_reuse_storage() {
        let mut arena = BumpArena::default();
        let mut slot = Slot::Empty;
        max(&mut arena, &mut slot, b"apple", true).unwrap();
        let before = arena.allocated_bytes();
        min(&mut arena, &mut slot, b"ant", false).unwrap();
        assert_eq!(bytes(&arena, &slot), b"ant");
        assert_eq!(arena.allocated_bytes(), before);
        min(&mut arena, &mut slot, b"aardvark", false).unwrap();
        assert_eq!(bytes(&arena, &slot), b"aardvark");
        assert!(arena.allocated_bytes() > before);
    }
}
