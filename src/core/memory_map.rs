//! File-backed register window.
//!
//! The file starts with a small header (magic, version, window size)
//! followed by the registers, stored as little-endian 32-bit words. The
//! mapping is shared, so writes land in the page cache directly and
//! another process mapping the same file sees them.

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

const MAGIC: u64 = u64::from_le_bytes(*b"DEVLINK\0");
const VERSION: u32 = 1;

/// magic u64 | version u32 | size u32, padded to a cache line
const HEADER_SIZE: usize = 64;

pub const WORD_SIZE: usize = 4;

pub struct MemoryMap {
    mmap: MmapMut,
    size: usize,
}

impl MemoryMap {
    /// Create or reopen a register window of `size` bytes.
    ///
    /// # Arguments
    /// * `path` - Backing file
    /// * `size` - Window size in bytes, a non-zero multiple of 4
    pub fn open<P: AsRef<Path>>(path: P, size: usize) -> io::Result<Self> {
        if size == 0 || size % WORD_SIZE != 0 || u32::try_from(size).is_err() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("register window size {} is not a multiple of {}", size, WORD_SIZE),
            ));
        }

        let total_size = HEADER_SIZE + size;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(total_size as u64)?;

        // SAFETY: the file is open read/write and sized to the mapping
        let mmap = unsafe { MmapOptions::new().len(total_size).map_mut(&file)? };

        let mut map = Self { mmap, size };
        if map.header_magic() != MAGIC || map.header_size() != size {
            map.mmap[..HEADER_SIZE].fill(0);
            map.mmap[0..8].copy_from_slice(&MAGIC.to_le_bytes());
            map.mmap[8..12].copy_from_slice(&VERSION.to_le_bytes());
            map.mmap[12..16].copy_from_slice(&(size as u32).to_le_bytes());
            map.mmap[HEADER_SIZE..].fill(0);
        }
        Ok(map)
    }

    fn header_magic(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.mmap[0..8]);
        u64::from_le_bytes(raw)
    }

    fn header_size(&self) -> usize {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.mmap[12..16]);
        u32::from_le_bytes(raw) as usize
    }

    /// Window size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// False once the header was overwritten behind our back.
    pub fn is_valid(&self) -> bool {
        self.header_magic() == MAGIC && self.header_size() == self.size
    }

    fn range(&self, offset: usize, words: usize) -> Option<std::ops::Range<usize>> {
        if offset % WORD_SIZE != 0 {
            return None;
        }
        let end = offset.checked_add(words.checked_mul(WORD_SIZE)?)?;
        if end > self.size {
            return None;
        }
        Some(HEADER_SIZE + offset..HEADER_SIZE + end)
    }

    #[inline(always)]
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let range = self.range(offset, 1)?;
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(&self.mmap[range]);
        Some(u32::from_le_bytes(raw))
    }

    #[inline(always)]
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Option<()> {
        let range = self.range(offset, 1)?;
        self.mmap[range].copy_from_slice(&value.to_le_bytes());
        Some(())
    }

    pub fn read_words(&self, offset: usize, count: usize) -> Option<Vec<u32>> {
        let range = self.range(offset, count)?;
        Some(
            self.mmap[range]
                .chunks_exact(WORD_SIZE)
                .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                .collect(),
        )
    }

    pub fn write_words(&mut self, offset: usize, words: &[u32]) -> Option<()> {
        let range = self.range(offset, words.len())?;
        for (dst, word) in self.mmap[range].chunks_exact_mut(WORD_SIZE).zip(words) {
            dst.copy_from_slice(&word.to_le_bytes());
        }
        Some(())
    }

    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = MemoryMap::open(dir.path().join("regs.bin"), 64).unwrap();
        assert_eq!(map.size(), 64);
        assert!(map.is_valid());

        map.write_u32(8, 0xdead_beef).unwrap();
        assert_eq!(map.read_u32(8), Some(0xdead_beef));
        assert_eq!(map.read_u32(0), Some(0));

        map.write_words(16, &[1, 2, 3]).unwrap();
        assert_eq!(map.read_words(12, 5), Some(vec![0, 1, 2, 3, 0]));
    }

    #[test]
    fn test_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = MemoryMap::open(dir.path().join("regs.bin"), 16).unwrap();
        assert_eq!(map.read_u32(16), None);
        assert_eq!(map.read_u32(2), None);
        assert_eq!(map.write_words(8, &[1, 2, 3]), None);
        assert!(MemoryMap::open(dir.path().join("bad.bin"), 10).is_err());
        assert!(MemoryMap::open(dir.path().join("empty.bin"), 0).is_err());
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regs.bin");
        {
            let mut map = MemoryMap::open(&path, 32).unwrap();
            map.write_u32(4, 42).unwrap();
            map.flush().unwrap();
        }
        let map = MemoryMap::open(&path, 32).unwrap();
        assert_eq!(map.read_u32(4), Some(42));
    }

    #[test]
    fn test_header_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regs.bin");
        let map = MemoryMap::open(&path, 32).unwrap();
        map.flush().unwrap();

        let mut file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all(b"XXXXXXXX").unwrap();
        file.sync_all().unwrap();
        assert!(!map.is_valid());
    }
}
