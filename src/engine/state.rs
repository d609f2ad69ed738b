//! Column binding per input file, and the layout of per-group state.
//!
//! A group's key is the concatenation of its key columns, each as a
//! little-endian `u32` length followed by the normalized bytes, so that
//! `("ab", "c")` and `("a", "bc")` stay distinct. Its state is one
//! [`SLOT_SIZE`]-byte [`Slot`] per output column, zeroed on creation.

use super::spec::AggregSpec;
use crate::aggregators::{Aggregator, SLOT_SIZE, Slot};
use crate::arena::Arena;
use crate::error::{AggregError, ArenaError};
use crate::hashset::Bucket;

/// How the output columns map onto the fields of one input file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    /// Input field read by each output column, `None` for unbound columns.
    pub input_of: Vec<Option<usize>>,
    /// Input fields read by at least one output column.
    pub needed: Vec<bool>,
    /// Fields every row is expected to have.
    pub width: usize,
}

impl Binding {
    fn new(input_of: Vec<Option<usize>>, width: usize) -> Self {
        let mut needed = vec![false; width];
        for i in input_of.iter().flatten() {
            needed[*i] = true;
        }
        Self {
            input_of,
            needed,
            width,
        }
    }

    /// Bind by case-insensitive name. The first matching header wins.
    pub fn by_name(spec: &AggregSpec, headers: &[String]) -> Result<Self, AggregError> {
        let mut input_of = Vec::with_capacity(spec.len());
        for col in spec.columns() {
            if !col.is_bound() {
                input_of.push(None);
                continue;
            }
            let Some(i) = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(&col.colname))
            else {
                return Err(AggregError::ColumnNotFound(col.colname.clone()));
            };
            input_of.push(Some(i));
        }
        Ok(Self::new(input_of, headers.len()))
    }

    /// Bind input without a header, where columns are named `0`, `1`, ...
    pub fn by_position(spec: &AggregSpec, width: usize) -> Result<Self, AggregError> {
        let names: Vec<String> = (0..width).map(|i| i.to_string()).collect();
        Self::by_name(spec, &names)
    }

    /// Bind a previous output: its header has to be exactly the output
    /// names, in order, compared case-insensitively.
    pub fn for_merge(spec: &AggregSpec, headers: &[String]) -> Result<Self, AggregError> {
        let matches = headers.len() == spec.len()
            && spec
                .outnames()
                .zip(headers)
                .all(|(o, h)| o.eq_ignore_ascii_case(h));
        if !matches {
            return Err(AggregError::MergeSchemaMismatch {
                expected: spec.outnames().map(str::to_string).collect(),
                found: headers.to_vec(),
            });
        }
        Ok(Self::new((0..spec.len()).map(Some).collect(), spec.len()))
    }
}

/// Append one length-prefixed key part.
pub(crate) fn push_key_part(key: &mut Vec<u8>, aggregator: Aggregator, value: &[u8]) {
    let at = key.len();
    key.extend_from_slice(&[0; 4]);
    aggregator.key(value, key);
    let len = (key.len() - at - 4) as u32;
    key[at..at + 4].copy_from_slice(&len.to_le_bytes());
}

/// Copy `key` into the arena and reserve zeroed state for `columns` slots.
pub(crate) fn new_bucket<A: Arena + ?Sized>(
    arena: &mut A,
    hash: u64,
    key: &[u8],
    columns: usize,
) -> Result<Bucket, ArenaError> {
    let key = arena.alloc_copy(key)?;
    let value = arena.alloc(columns * SLOT_SIZE, 8)?;
    arena.get_mut(value).fill(0);
    Ok(Bucket { hash, key, value })
}

pub(crate) fn read_slot<A: Arena + ?Sized>(arena: &A, bucket: &Bucket, column: usize) -> Slot {
    let at = column * SLOT_SIZE;
    Slot::decode(&arena.get(bucket.value)[at..at + SLOT_SIZE])
}

pub(crate) fn write_slot<A: Arena + ?Sized>(arena: &mut A, bucket: &Bucket, column: usize, slot: &Slot) {
    let at = column * SLOT_SIZE;
    slot.encode(&mut arena.get_mut(bucket.value)[at..at + SLOT_SIZE]);
}
