use crate::{
    containers::Bytes,
    tes3::{hashing, FileHash, MAX_INT32},
    Error, Result,
};
use bstr::{BStr, BString};

/// A named file entry and its payload bytes.
pub struct File<'bytes> {
    pub(crate) hash: FileHash,
    pub(crate) name: BString,
    pub(crate) bytes: Bytes<'bytes>,
}

fn build<'bytes>(path: &BStr, bytes: Bytes<'bytes>) -> Result<File<'bytes>> {
    if bytes.len() > MAX_INT32 {
        return Err(Error::SizeOverflow);
    }

    let (hash, name) = hashing::hash_file(path)?;
    Ok(File { hash, name, bytes })
}

impl<'bytes> File<'bytes> {
    /// Creates an entry whose payload borrows from the caller.
    pub fn from_borrowed(path: &BStr, data: &'bytes [u8]) -> Result<Self> {
        build(path, Bytes::from_borrowed(data))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    #[must_use]
    pub fn hash(&self) -> FileHash {
        self.hash
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// The normalized name stored in the archive's string table.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    /// Detaches the payload from whatever backs it, copying if necessary.
    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            hash: self.hash,
            name: self.name,
            bytes: self.bytes.into_owned(),
        }
    }
}

impl File<'static> {
    /// Creates an entry that owns its payload.
    pub fn from_owned(path: &BStr, data: Vec<u8>) -> Result<Self> {
        build(path, Bytes::from_owned(data))
    }
}

#[cfg(test)]
mod tests {
    use crate::{tes3::File, Error};
    use bstr::BStr;

    #[test]
    fn construction_normalizes_and_hashes() -> anyhow::Result<()> {
        let file = File::from_owned(BStr::new(b"Meshes/X.NIF"), b"data".to_vec())?;
        assert_eq!(file.name(), "meshes\\x.nif");
        assert_eq!(file.len(), 4);
        assert_ne!(file.hash().numeric(), 0);
        Ok(())
    }

    #[test]
    fn empty_names_are_rejected() {
        let result = File::from_owned(BStr::new(b""), Vec::new());
        assert!(matches!(result, Err(Error::EmptyPath)));
    }
}
