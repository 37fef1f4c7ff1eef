//! Disk-backed, block-cached rune sequence (component A).
//!
//! The buffer is split into fixed-capacity *blocks*; at most one block's
//! runes live in memory at a time (`Cache`). Every other block's content is
//! wherever it last landed on disk, at the fixed byte offset implied by its
//! slot number (`slot * capacity * 4`). The block list itself — which slot
//! holds which range of the logical sequence, and how many runes it
//! currently holds — is a small in-memory index; it never touches disk.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::BufferError;

/// Default block capacity `B` from spec.md §3 ("B chosen ~4096").
pub const DEFAULT_BLOCK_RUNES: usize = 4096;

/// Configuration for a [`BlockStore`] (ambient: SPEC_FULL.md §13).
#[derive(Debug, Clone, Copy)]
pub struct BlockStoreConfig {
    /// Maximum rune capacity of a single block.
    pub block_runes: usize,
}

impl Default for BlockStoreConfig {
    fn default() -> Self {
        Self {
            block_runes: DEFAULT_BLOCK_RUNES,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    /// Fixed on-disk slot; byte offset is `slot * capacity * 4`.
    slot: u64,
    /// Number of runes currently stored in this block.
    len: usize,
}

struct Cache {
    block_idx: usize,
    /// Rune offset of this block's first rune within the logical sequence.
    start: usize,
    data: Vec<char>,
    dirty: bool,
}

/// An unbounded rune sequence backed by a lazily-created file, with exactly
/// one block cached in memory.
pub struct BlockStore {
    config: BlockStoreConfig,
    path: PathBuf,
    file: Option<File>,
    blocks: Vec<BlockEntry>,
    free_slots: Vec<u64>,
    next_slot: u64,
    size: usize,
    cache: Option<Cache>,
    closed: bool,
}

impl BlockStore {
    /// Creates an empty buffer backed by `path`. The file is not created
    /// until the first byte is actually written (spec.md §3: "created
    /// lazily on first non-trivial write").
    pub fn new(path: impl Into<PathBuf>, config: BlockStoreConfig) -> Self {
        Self {
            config,
            path: path.into(),
            file: None,
            blocks: Vec::new(),
            free_slots: Vec::new(),
            next_slot: 0,
            size: 0,
            cache: None,
            closed: false,
        }
    }

    pub fn with_default_config(path: impl Into<PathBuf>) -> Self {
        Self::new(path, BlockStoreConfig::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn check_open(&self) -> Result<(), BufferError> {
        if self.closed {
            Err(BufferError::Closed)
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------
    // Locating and caching blocks
    // ---------------------------------------------------------------

    /// Finds the block containing rune offset `at` by linearly scanning the
    /// block list while maintaining a running prefix sum (spec.md §4.1).
    /// Returns `(block_idx, block_start)`. `at == size()` resolves to the
    /// last block (or `(0, 0)` if there are no blocks yet, which callers
    /// use as "allocate the first block").
    fn locate(&self, at: usize) -> Result<(usize, usize), BufferError> {
        if at > self.size {
            return Err(BufferError::OutOfRange);
        }
        let mut start = 0usize;
        for (idx, b) in self.blocks.iter().enumerate() {
            let end = start + b.len;
            if at < end || (at == end && idx == self.blocks.len() - 1) {
                return Ok((idx, start));
            }
            start = end;
        }
        if self.blocks.is_empty() {
            Ok((0, 0))
        } else {
            Ok((self.blocks.len() - 1, start - self.blocks.last().unwrap().len))
        }
    }

    fn ensure_file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let f = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            self.file = Some(f);
        }
        Ok(self.file.as_mut().unwrap())
    }

    fn slot_offset(&self, slot: u64) -> u64 {
        slot * self.config.block_runes as u64 * 4
    }

    /// Writes the cached block's runes to its disk slot, if dirty.
    fn put_cache(&mut self) -> io::Result<()> {
        let Some(cache) = self.cache.take() else {
            return Ok(());
        };
        if !cache.dirty {
            return Ok(());
        }
        let slot = self.blocks[cache.block_idx].slot;
        let offset = self.slot_offset(slot);
        trace!(slot, offset, len = cache.data.len(), "put_cache");
        let file = self.ensure_file()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(cache.data.len() * 4);
        for &r in &cache.data {
            buf.extend_from_slice(&(r as u32).to_le_bytes());
        }
        file.write_all(&buf)?;
        Ok(())
    }

    /// Loads block `idx`'s runes from disk into the cache, flushing
    /// whatever was cached before it if necessary.
    fn get_cache(&mut self, idx: usize) -> io::Result<()> {
        if let Some(c) = &self.cache {
            if c.block_idx == idx {
                return Ok(());
            }
        }
        self.put_cache()?;

        let entry = self.blocks[idx];
        let mut start = 0usize;
        for b in &self.blocks[..idx] {
            start += b.len;
        }

        let data = if entry.len == 0 {
            Vec::new()
        } else {
            let offset = self.slot_offset(entry.slot);
            trace!(slot = entry.slot, offset, len = entry.len, "get_cache");
            let file = self.ensure_file()?;
            file.seek(SeekFrom::Start(offset))?;
            let mut raw = vec![0u8; entry.len * 4];
            file.read_exact(&mut raw)?;
            raw.chunks_exact(4)
                .map(|c| {
                    let n = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                    char::from_u32(n).unwrap_or('\u{FFFD}')
                })
                .collect()
        };

        self.cache = Some(Cache {
            block_idx: idx,
            start,
            data,
            dirty: false,
        });
        Ok(())
    }

    fn alloc_slot(&mut self) -> u64 {
        if let Some(s) = self.free_slots.pop() {
            s
        } else {
            let s = self.next_slot;
            self.next_slot += 1;
            s
        }
    }

    fn free_block(&mut self, idx: usize) {
        let entry = self.blocks.remove(idx);
        self.free_slots.push(entry.slot);
        if let Some(c) = &self.cache {
            if c.block_idx == idx {
                self.cache = None;
            } else if c.block_idx > idx {
                // Shift the cached index down to track the removed entry.
                let mut c = self.cache.take().unwrap();
                c.block_idx -= 1;
                self.cache = Some(c);
            }
        }
    }

    // ---------------------------------------------------------------
    // Public read API
    // ---------------------------------------------------------------

    pub fn rune(&mut self, i: usize) -> Result<char, BufferError> {
        self.check_open()?;
        if i >= self.size {
            return Err(BufferError::OutOfRange);
        }
        let (idx, start) = self.locate(i)?;
        self.get_cache(idx).map_err(BufferError::Io)?;
        let cache = self.cache.as_ref().unwrap();
        Ok(cache.data[i - start])
    }

    pub fn read(&mut self, dst: &mut [char], at: usize) -> Result<(), BufferError> {
        self.check_open()?;
        if at > self.size || at + dst.len() > self.size {
            return Err(BufferError::OutOfRange);
        }
        for (k, slot) in dst.iter_mut().enumerate() {
            *slot = self.rune(at + k)?;
        }
        Ok(())
    }

    /// Returns a streaming forward iterator over runes starting at `at`.
    pub fn reader(&mut self, at: usize) -> Result<Reader<'_>, BufferError> {
        self.check_open()?;
        if at > self.size {
            return Err(BufferError::OutOfRange);
        }
        Ok(Reader { store: self, pos: at })
    }

    // ---------------------------------------------------------------
    // Public write API
    // ---------------------------------------------------------------

    pub fn insert(&mut self, src: &[char], at: usize) -> Result<(), BufferError> {
        self.check_open()?;
        let mut w = self.writer(at)?;
        for &r in src {
            w.push(r).map_err(BufferError::Io)?;
        }
        Ok(())
    }

    /// Inserts runes pulled lazily from `src`, streaming them through the
    /// block writer instead of buffering the whole source in memory
    /// (spec.md §9 note (c)).
    pub fn insert_reader(
        &mut self,
        at: usize,
        src: impl IntoIterator<Item = io::Result<char>>,
    ) -> Result<usize, BufferError> {
        self.check_open()?;
        let mut w = self.writer(at)?;
        let mut n = 0usize;
        for r in src {
            let r = r.map_err(BufferError::Io)?;
            w.push(r).map_err(BufferError::Io)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn delete(&mut self, n: usize, at: usize) -> Result<(), BufferError> {
        self.check_open()?;
        if at + n > self.size {
            return Err(BufferError::OutOfRange);
        }
        let mut remaining = n;
        while remaining > 0 {
            let (idx, start) = self.locate(at)?;
            self.get_cache(idx).map_err(BufferError::Io)?;
            let local = at - start;
            let cache = self.cache.as_mut().unwrap();
            let removable = remaining.min(cache.data.len() - local);
            if local == 0 && removable == cache.data.len() && removable > 0 {
                self.free_block(idx);
            } else {
                cache.data.drain(local..local + removable);
                cache.dirty = true;
                self.blocks[idx].len = cache.data.len();
            }
            self.size -= removable;
            remaining -= removable;
        }
        Ok(())
    }

    /// Returns an appender whose insertion point advances as it writes.
    pub fn writer(&mut self, at: usize) -> Result<Writer<'_>, BufferError> {
        self.check_open()?;
        if at > self.size {
            return Err(BufferError::OutOfRange);
        }
        let (idx, start) = if self.blocks.is_empty() {
            let slot = self.alloc_slot();
            self.blocks.push(BlockEntry { slot, len: 0 });
            (0, 0)
        } else {
            self.locate(at)?
        };
        self.get_cache(idx).map_err(BufferError::Io)?;
        Ok(Writer {
            store: self,
            block_idx: idx,
            local_pos: at - start,
        })
    }

    pub fn close(mut self) -> Result<(), BufferError> {
        self.put_cache().map_err(BufferError::Io)?;
        self.closed = true;
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.path);
        }
        Ok(())
    }
}

/// Forward, restartable rune iterator over a [`BlockStore`].
pub struct Reader<'a> {
    store: &'a mut BlockStore,
    pos: usize,
}

impl Iterator for Reader<'_> {
    type Item = io::Result<char>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.store.size {
            return None;
        }
        let r = self.store.rune(self.pos);
        self.pos += 1;
        match r {
            Ok(c) => Some(Ok(c)),
            Err(BufferError::Io(e)) => Some(Err(e)),
            Err(_) => None,
        }
    }
}

/// Appends runes at an insertion point that advances with every write,
/// splitting the current block once it overflows `block_runes`.
pub struct Writer<'a> {
    store: &'a mut BlockStore,
    block_idx: usize,
    local_pos: usize,
}

impl Writer<'_> {
    pub fn push(&mut self, r: char) -> io::Result<()> {
        if self.store.cache.as_ref().map(|c| c.block_idx) != Some(self.block_idx) {
            self.store.get_cache(self.block_idx)?;
        }
        {
            let cache = self.store.cache.as_mut().unwrap();
            cache.data.insert(self.local_pos, r);
            cache.dirty = true;
        }
        self.local_pos += 1;
        self.store.size += 1;
        self.store.blocks[self.block_idx].len = self.store.cache.as_ref().unwrap().data.len();

        let capacity = self.store.config.block_runes;
        if self.store.cache.as_ref().unwrap().data.len() > capacity {
            self.split()?;
        }
        Ok(())
    }

    /// Splits the overflowing cached block into three: the already-settled
    /// front (kept in the original slot, flushed immediately since nothing
    /// further will be appended to it), a fresh empty block where this
    /// writer resumes pushing, and a block holding the untouched tail —
    /// which stays as the live cache, to be materialized on the next
    /// `put_cache` (spec.md §4.1).
    fn split(&mut self) -> io::Result<()> {
        let store = &mut *self.store;
        let cache = store.cache.as_mut().unwrap();
        let tail = cache.data.split_off(self.local_pos);
        cache.dirty = true;
        store.blocks[self.block_idx].len = cache.data.len();
        store.put_cache()?;

        let empty_slot = store.alloc_slot();
        let tail_slot = store.alloc_slot();
        let empty_idx = self.block_idx + 1;
        let tail_idx = self.block_idx + 2;
        store.blocks.insert(empty_idx, BlockEntry { slot: empty_slot, len: 0 });
        store.blocks.insert(tail_idx, BlockEntry { slot: tail_slot, len: tail.len() });

        let tail_start = {
            let mut s = 0usize;
            for b in &store.blocks[..tail_idx] {
                s += b.len;
            }
            s
        };
        store.cache = Some(Cache {
            block_idx: tail_idx,
            start: tail_start,
            data: tail,
            dirty: true,
        });

        self.block_idx = empty_idx;
        self.local_pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::Strategy;
    use tempfile::NamedTempFile;

    fn store_with_capacity(cap: usize) -> BlockStore {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);
        BlockStore::new(path, BlockStoreConfig { block_runes: cap })
    }

    fn to_chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn read_all(store: &mut BlockStore) -> String {
        let n = store.size();
        let mut buf = vec!['\0'; n];
        store.read(&mut buf, 0).unwrap();
        buf.into_iter().collect()
    }

    #[test]
    fn insert_and_read_back_small() {
        let mut s = store_with_capacity(4096);
        s.insert(&to_chars("hello"), 0).unwrap();
        s.insert(&to_chars(", world"), 5).unwrap();
        assert_eq!(read_all(&mut s), "hello, world");
    }

    #[test]
    fn insert_forces_block_splits() {
        let mut s = store_with_capacity(8);
        s.insert(&to_chars("01234567abcdefghSTUVWXYZ"), 0).unwrap();
        s.insert(&to_chars("!@#"), 12).unwrap();
        assert_eq!(read_all(&mut s), "01234567abcd!@#efghSTUVWXYZ");
        assert_eq!(s.size(), 27);
    }

    #[test]
    fn delete_whole_and_partial_blocks() {
        let mut s = store_with_capacity(8);
        s.insert(&to_chars("0123456789abcdef"), 0).unwrap();
        s.delete(4, 2).unwrap();
        assert_eq!(read_all(&mut s), "01456789abcdef");
        s.delete(6, 0).unwrap();
        assert_eq!(read_all(&mut s), "89abcdef");
    }

    #[test]
    fn out_of_range_errors() {
        let mut s = store_with_capacity(8);
        s.insert(&to_chars("abc"), 0).unwrap();
        assert!(matches!(s.insert(&to_chars("x"), 10), Err(BufferError::OutOfRange)));
        assert!(matches!(s.delete(10, 0), Err(BufferError::OutOfRange)));
        assert!(matches!(s.rune(10), Err(BufferError::OutOfRange)));
    }

    #[test]
    fn insert_reader_streams_from_a_lazy_source() {
        let mut s = store_with_capacity(4);
        s.insert(&to_chars("0189"), 0).unwrap();
        let n = s.insert_reader(2, "234567".chars().map(Ok)).unwrap();
        assert_eq!(n, 6);
        assert_eq!(read_all(&mut s), "0123456789");
    }

    #[test]
    fn insert_reader_propagates_the_source_error_without_partial_writes_lost() {
        let mut s = store_with_capacity(4);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let src = vec![Ok('a'), Ok('b'), Err(err)];
        let result = s.insert_reader(0, src);
        assert!(matches!(result, Err(BufferError::Io(_))));
        assert_eq!(read_all(&mut s), "ab");
    }

    #[test]
    fn reading_zero_runes_at_end_succeeds() {
        let mut s = store_with_capacity(8);
        s.insert(&to_chars("abc"), 0).unwrap();
        let mut buf: [char; 0] = [];
        assert!(s.read(&mut buf, 3).is_ok());
    }

    #[test]
    fn closing_removes_backing_file() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);
        let mut s = BlockStore::new(path.clone(), BlockStoreConfig { block_runes: 4 });
        s.insert(&to_chars("0123456789"), 0).unwrap();
        s.close().unwrap();
        assert!(!path.exists());
    }

    proptest::proptest! {
        #[test]
        fn random_inserts_and_deletes_match_a_string(
            ops in proptest::collection::vec(
                proptest::prop_oneof![
                    (0usize..40, proptest::string::string_regex("[a-zA-Z0-9]{0,6}").unwrap())
                        .prop_map(|(at, s)| (true, at, s)),
                    (0usize..40, 0usize..6usize).prop_map(|(at, n)| (false, at, n.to_string())),
                ],
                1..30,
            )
        ) {
            let mut model = String::new();
            let mut s = store_with_capacity(8);
            for (is_insert, at, payload) in ops {
                if is_insert {
                    let at = at.min(model.chars().count());
                    let chars: Vec<char> = payload.chars().collect();
                    let byte_at = model.char_indices().nth(at).map(|(i, _)| i).unwrap_or(model.len());
                    model.insert_str(byte_at, &payload);
                    s.insert(&chars, at).unwrap();
                } else {
                    let len = model.chars().count();
                    if len == 0 { continue; }
                    let at = at.min(len - 1);
                    let n: usize = payload.parse().unwrap_or(0);
                    let n = n.min(len - at);
                    let start_byte = model.char_indices().nth(at).map(|(i, _)| i).unwrap_or(model.len());
                    let end_byte = model.char_indices().nth(at + n).map(|(i, _)| i).unwrap_or(model.len());
                    model.replace_range(start_byte..end_byte, "");
                    s.delete(n, at).unwrap();
                }
            }
            proptest::prop_assert_eq!(read_all(&mut s), model);
        }
    }
}
