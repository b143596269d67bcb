use crate::{path, Error, Result};
use bstr::{BStr, BString};
use core::cmp::Ordering;

/// The hash used to uniquely identify a file within the archive.
///
/// The on-disk form is two little-endian `u32` halves; entries are ordered
/// lexicographically on `(lo, hi)`, which is the sort the archive index
/// relies on for binary search.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct FileHash {
    pub lo: u32,
    pub hi: u32,
}

impl FileHash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The combined 64-bit form, `hi` in the upper half.
    #[must_use]
    pub fn numeric(&self) -> u64 {
        (u64::from(self.hi) << 32) | u64::from(self.lo)
    }
}

impl PartialEq for FileHash {
    fn eq(&self, other: &Self) -> bool {
        (self.lo, self.hi) == (other.lo, other.hi)
    }
}

impl Eq for FileHash {}

impl PartialOrd for FileHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileHash {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.lo, self.hi).cmp(&(other.lo, other.hi))
    }
}

/// Hashes a file path, returning the hash and the normalized form of the
/// path as it would be stored on disk.
pub fn hash_file(path: &BStr) -> Result<(FileHash, BString)> {
    let path = path::normalize(path)?;
    if path.is_empty() {
        return Err(Error::EmptyPath);
    }

    let midpoint = path.len() / 2;
    let mut hash = FileHash::new();
    let mut i: usize = 0;

    // the first half folds into the low word
    while i < midpoint {
        hash.lo ^= u32::from(path[i]) << ((i % 4) * 8);
        i += 1;
    }

    // the second half folds into the high word with a rotate
    while i < path.len() {
        let rot = u32::from(path[i]) << (((i - midpoint) % 4) * 8);
        hash.hi = u32::rotate_right(hash.hi ^ rot, rot);
        i += 1;
    }

    Ok((hash, path))
}
