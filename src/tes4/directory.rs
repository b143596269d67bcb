use crate::{
    tes4::{hashing, File, Hash},
    Result,
};
use bstr::{BStr, BString};
use core::slice;

/// A directory entry and its files, kept sorted by hash for binary search.
pub struct Directory<'bytes> {
    pub(crate) hash: Hash,
    pub(crate) name: BString,
    pub(crate) files: Vec<File<'bytes>>,
}

impl<'bytes> Directory<'bytes> {
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The directory's path, when the archive stores one.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, File<'bytes>> {
        self.files.iter()
    }

    /// Looks up a file by hash.
    #[must_use]
    pub fn get(&self, hash: &Hash) -> Option<&File<'bytes>> {
        self.files
            .binary_search_by(|file| file.hash.cmp(hash))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// Hashes a file name and looks it up.
    pub fn find(&self, name: &BStr) -> Result<Option<&File<'bytes>>> {
        let (hash, _) = hashing::hash_file(name)?;
        Ok(self.get(&hash))
    }
}

impl<'bytes, 'this> IntoIterator for &'this Directory<'bytes> {
    type Item = &'this File<'bytes>;
    type IntoIter = slice::Iter<'this, File<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
