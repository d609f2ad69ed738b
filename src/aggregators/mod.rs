//! Built-in aggregators for output columns.
//!
//! Each output column of an aggregation names one of these:
//!
//! - `str` -- group-by column, keeps the first value seen.
//! - `downcase` -- group-by column on the ASCII-lowercased value; the output
//!   keeps the spelling seen first.
//! - `top20` -- up to 20 distinct values, in order of first appearance,
//!   comma-joined on output.
//! - `min` / `max` -- 64-bit integer extremes.
//! - `minstr` / `maxstr` -- bytewise lexicographic extremes.
//! - `count` -- number of rows in the group.
//!
//! Every aggregator folds raw input with [`Aggregator::aggreg`] and its own
//! previous output with [`Aggregator::merge`], which is what makes a merge
//! of partial results equal to one pass over the whole input.
//!
//! Per-group state is a [`Slot`] of [`SLOT_SIZE`] bytes stored in the arena
//! next to the group's key; text and lists live elsewhere in the same arena.

mod basic;
mod text;
mod topk;

use crate::arena::{Arena, ArenaSlice};
use crate::error::ArenaError;

pub use topk::TOP_N;

/// Bytes a [`Slot`] occupies in a bucket.
pub const SLOT_SIZE: usize = 16;

const TAG_EMPTY: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_LIST: u8 = 3;

/// Accumulator state of one column in one group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Slot {
    /// Nothing folded yet.
    #[default]
    Empty,
    Int(i64),
    Text(ArenaSlice),
    /// A `top20` list region.
    List(ArenaSlice),
}

fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

pub(crate) fn slice_from_bytes(b: &[u8]) -> ArenaSlice {
    ArenaSlice {
        chunk: u32_at(b, 0),
        offset: u32_at(b, 4),
        len: u32_at(b, 8),
    }
}

pub(crate) fn slice_to_bytes(s: ArenaSlice, b: &mut [u8]) {
    b[0..4].copy_from_slice(&s.chunk.to_le_bytes());
    b[4..8].copy_from_slice(&s.offset.to_le_bytes());
    b[8..12].copy_from_slice(&s.len.to_le_bytes());
}

impl Slot {
    /// Read a slot from its [`SLOT_SIZE`] bytes. Zeroed bytes are [`Slot::Empty`].
    #[must_use]
    pub fn decode(b: &[u8]) -> Self {
        match b[0] {
            TAG_INT => {
                let mut v = [0u8; 8];
                v.copy_from_slice(&b[8..16]);
                Slot::Int(i64::from_le_bytes(v))
            }
            TAG_TEXT => Slot::Text(slice_from_bytes(&b[4..16])),
            TAG_LIST => Slot::List(slice_from_bytes(&b[4..16])),
            _ => Slot::Empty,
        }
    }

    /// Write a slot into its [`SLOT_SIZE`] bytes.
    pub fn encode(&self, b: &mut [u8]) {
        b[..SLOT_SIZE].fill(0);
        match *self {
            Slot::Empty => b[0] = TAG_EMPTY,
            Slot::Int(v) => {
                b[0] = TAG_INT;
                b[8..16].copy_from_slice(&v.to_le_bytes());
            }
            Slot::Text(s) => {
                b[0] = TAG_TEXT;
                slice_to_bytes(s, &mut b[4..16]);
            }
            Slot::List(s) => {
                b[0] = TAG_LIST;
                slice_to_bytes(s, &mut b[4..16]);
            }
        }
    }
}

/// One of the built-in accumulators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggregator {
    Str,
    Downcase,
    Top20,
    Min,
    Max,
    MinStr,
    MaxStr,
    Count,
}

impl Aggregator {
    /// Every aggregator, in the order they are listed in help output.
    pub const ALL: [Aggregator; 8] = [
        Aggregator::Str,
        Aggregator::Downcase,
        Aggregator::Top20,
        Aggregator::Min,
        Aggregator::Max,
        Aggregator::MinStr,
        Aggregator::MaxStr,
        Aggregator::Count,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Str => "str",
            Aggregator::Downcase => "downcase",
            Aggregator::Top20 => "top20",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::MinStr => "minstr",
            Aggregator::MaxStr => "maxstr",
            Aggregator::Count => "count",
        }
    }

    /// Look an aggregator up by its exact name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Whether values of this column are part of the group key.
    #[must_use]
    pub fn is_key(self) -> bool {
        matches!(self, Aggregator::Str | Aggregator::Downcase)
    }

    /// Append the key form of `field` to `key`. No-op for non-key aggregators.
    pub fn key(self, field: &[u8], key: &mut Vec<u8>) {
        match self {
            Aggregator::Str => key.extend_from_slice(field),
            Aggregator::Downcase => key.extend(field.iter().map(u8::to_ascii_lowercase)),
            _ => {}
        }
    }

    /// Fold one unescaped input value. `field` is `None` for columns bound to
    /// no input column. `first` is set exactly once per group.
    ///
    /// # Errors
    /// Returns [`ArenaError`] when text storage cannot be allocated.
    pub fn aggreg<A: Arena + ?Sized>(
        self,
        arena: &mut A,
        slot: &mut Slot,
        field: Option<&[u8]>,
        first: bool,
    ) -> Result<(), ArenaError> {
        let value = field.unwrap_or_default();
        match self {
            Aggregator::Str | Aggregator::Downcase => text::first(arena, slot, value, first),
            Aggregator::MinStr => text::min(arena, slot, value, first),
            Aggregator::MaxStr => text::max(arena, slot, value, first),
            Aggregator::Top20 => topk::add(arena, slot, value),
            Aggregator::Min => {
                basic::min(slot, value, first);
                Ok(())
            }
            Aggregator::Max => {
                basic::max(slot, value, first);
                Ok(())
            }
            Aggregator::Count => {
                basic::count(slot, first);
                Ok(())
            }
        }
    }

    /// Fold a value this aggregator rendered in an earlier run, unescaped.
    ///
    /// # Errors
    /// Returns [`ArenaError`] when text storage cannot be allocated.
    pub fn merge<A: Arena + ?Sized>(
        self,
        arena: &mut A,
        slot: &mut Slot,
        prior: &[u8],
        first: bool,
    ) -> Result<(), ArenaError> {
        match self {
            Aggregator::Top20 => topk::merge(arena, slot, prior),
            Aggregator::Count => {
                basic::count_merge(slot, prior, first);
                Ok(())
            }
            _ => self.aggreg(arena, slot, Some(prior), first),
        }
    }

    /// Render the state as one escaped CSV field appended to `out`.
    pub fn out<A: Arena + ?Sized>(self, arena: &A, slot: &Slot, quote: u8, out: &mut Vec<u8>) {
        match self {
            Aggregator::Str | Aggregator::Downcase | Aggregator::MinStr | Aggregator::MaxStr => {
                text::out(arena, slot, quote, out);
            }
            Aggregator::Top20 => topk::out(arena, slot, quote, out),
            Aggregator::Min | Aggregator::Max | Aggregator::Count => basic::out(slot, out),
        }
    }
}

impl std::fmt::Display for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
