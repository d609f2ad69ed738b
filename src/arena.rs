//! Grow-only memory arena for aggregation state.
//!
//! Allocations are handed out as [`ArenaSlice`] handles (chunk, offset, length)
//! rather than references, so the hash table can store them by value and the
//! arena can keep growing while they are held. Nothing is freed individually;
//! all chunks go away together when the arena is dropped.
//!
//! [`BumpArena`] backs its chunks with memory maps. Without a spill directory
//! they are anonymous; with one, each chunk is an unlinked temporary file in
//! that directory, so the operating system can page aggregation state out to
//! disk instead of running out of memory.

use crate::config::ArenaOptions;
use crate::error::ArenaError;
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;

/// Handle to bytes allocated from an [`Arena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArenaSlice {
    pub chunk: u32,
    pub offset: u32,
    pub len: u32,
}

impl ArenaSlice {
    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocation interface the hash table and the engine build on.
pub trait Arena {
    /// Allocate `size` zeroed bytes aligned to `align` (a power of two).
    ///
    /// # Errors
    /// Returns [`ArenaError`] when a new chunk cannot be obtained.
    fn alloc(&mut self, size: usize, align: usize) -> Result<ArenaSlice, ArenaError>;

    fn get(&self, slice: ArenaSlice) -> &[u8];

    fn get_mut(&mut self, slice: ArenaSlice) -> &mut [u8];

    /// Allocate room for `bytes` and copy them in.
    ///
    /// # Errors
    /// Same as [`alloc`](Self::alloc).
    fn alloc_copy(&mut self, bytes: &[u8]) -> Result<ArenaSlice, ArenaError> {
        let slice = self.alloc(bytes.len(), 1)?;
        self.get_mut(slice).copy_from_slice(bytes);
        Ok(slice)
    }

    /// Bytes handed out so far, alignment padding excluded.
    fn allocated_bytes(&self) -> u64;

    /// Bytes reserved across all chunks.
    fn reserved_bytes(&self) -> u64;

    fn chunk_count(&self) -> usize;
}

struct Chunk {
    map: MmapMut,
    used: usize,
    // keeps the spill file open for the lifetime of the map
    _file: Option<File>,
}

/// Memory-mapped bump allocator with geometric chunk growth.
pub struct BumpArena {
    opts: ArenaOptions,
    chunks: Vec<Chunk>,
    last_chunk_size: usize,
    allocated: u64,
}

impl BumpArena {
    #[must_use]
    pub fn new(opts: ArenaOptions) -> Self {
        Self {
            opts,
            chunks: Vec::new(),
            last_chunk_size: 0,
            allocated: 0,
        }
    }

    /// Whether chunks are backed by files in a spill directory.
    #[must_use]
    pub fn is_spilling(&self) -> bool {
        self.opts.spill_dir.is_some()
    }

    fn next_chunk_size(&mut self, want: usize) -> usize {
        if self.last_chunk_size < self.opts.min_chunk {
            self.last_chunk_size = self.opts.min_chunk;
        } else if self.last_chunk_size < self.opts.max_chunk {
            self.last_chunk_size = (self.last_chunk_size * 2).min(self.opts.max_chunk);
        }
        self.last_chunk_size.max(want).max(1)
    }

    fn new_chunk(&mut self, want: usize) -> Result<(), ArenaError> {
        let size = self.next_chunk_size(want);
        if u32::try_from(size).is_err() {
            return Err(ArenaError::TooLarge(size));
        }

        let chunk = match &self.opts.spill_dir {
            None => {
                let map =
                    MmapMut::map_anon(size).map_err(|source| ArenaError::Map { size, source })?;
                Chunk {
                    map,
                    used: 0,
                    _file: None,
                }
            }
            Some(dir) => {
                let file = tempfile::tempfile_in(dir).map_err(|source| ArenaError::SpillFile {
                    dir: dir.clone(),
                    source,
                })?;
                file.set_len(size as u64)
                    .map_err(|source| ArenaError::Map { size, source })?;
                // SAFETY: the file is unlinked and only reachable through this handle.
                let map = unsafe { MmapOptions::new().len(size).map_mut(&file) }
                    .map_err(|source| ArenaError::Map { size, source })?;
                Chunk {
                    map,
                    used: 0,
                    _file: Some(file),
                }
            }
        };

        log::debug!(
            "arena chunk #{} of {size} bytes ({})",
            self.chunks.len(),
            if self.is_spilling() { "file" } else { "anonymous" }
        );
        self.chunks.push(chunk);
        Ok(())
    }
}

impl Default for BumpArena {
    fn default() -> Self {
        Self::new(ArenaOptions::default())
    }
}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

impl Arena for BumpArena {
    fn alloc(&mut self, size: usize, align: usize) -> Result<ArenaSlice, ArenaError> {
        let align = align.max(1).next_power_of_two();
        let len = u32::try_from(size).map_err(|_| ArenaError::TooLarge(size))?;
        if size == 0 {
            return Ok(ArenaSlice::default());
        }

        let fits = self.chunks.last().is_some_and(|c| {
            align_up(c.used, align)
                .checked_add(size)
                .is_some_and(|end| end <= c.map.len())
        });
        if !fits {
            let want = size.checked_add(align).ok_or(ArenaError::TooLarge(size))?;
            self.new_chunk(want)?;
        }

        let index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[index];
        let offset = align_up(chunk.used, align);
        chunk.used = offset + size;
        self.allocated += size as u64;

        Ok(ArenaSlice {
            chunk: index as u32,
            offset: offset as u32,
            len,
        })
    }

    fn get(&self, slice: ArenaSlice) -> &[u8] {
        if slice.len == 0 {
            return &[];
        }
        let start = slice.offset as usize;
        &self.chunks[slice.chunk as usize].map[start..start + slice.len()]
    }

    fn get_mut(&mut self, slice: ArenaSlice) -> &mut [u8] {
        if slice.len == 0 {
            return &mut [];
        }
        let start = slice.offset as usize;
        &mut self.chunks[slice.chunk as usize].map[start..start + slice.len()]
    }

    fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    fn reserved_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.map.len() as u64).sum()
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ArenaOptions {
        ArenaOptions {
            min_chunk: 64,
            max_chunk: 256,
            spill_dir: None,
        }
    }

    #[test]
    fn chunks_double_up_to_the_ceiling() {
        let mut arena = BumpArena::new(small());
        let sizes: Vec<usize> = (0..5).map(|_| arena.next_chunk_size(1)).collect();
        assert_eq!(sizes, vec![64, 128, 256, 256, 256]);
        assert_eq!(arena.next_chunk_size(1000), 1000);
    }

    #[test]
    fn alignment_is_respected() {
        let mut arena = BumpArena::new(small());
        let a = arena.alloc(3, 1).unwrap();
        let b = arena.alloc(8, 8).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 8);
        assert_eq!(arena.allocated_bytes(), 11);
    }

    #[test]
    fn zero_length_needs_no_chunk() {
        let mut arena = BumpArena::new(small());
        let s = arena.alloc(0, 8).unwrap();
        assert!(arena.get(s).is_empty());
        assert_eq!(arena.chunk_count(), 0);
    }
}
