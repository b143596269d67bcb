use crate::{containers::Bytes, tes4::Hash};
use bstr::{BStr, BString};

/// A file entry: its identity and an opaque view of its on-disk payload.
///
/// The payload is handed out exactly as stored. If the file is compressed it
/// still carries its decompressed-length prefix, and under
/// `EMBEDDED_FILE_NAMES` it still begins with the embedded name; interpreting
/// either is the consumer's job.
pub struct File<'bytes> {
    pub(crate) hash: Hash,
    pub(crate) name: BString,
    pub(crate) bytes: Bytes<'bytes>,
    pub(crate) compression_flipped: bool,
    pub(crate) compressed: bool,
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    #[must_use]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The on-disk payload size, with the flag bits masked off.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// The file's name, when the archive stores one.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    /// The raw per-file bit that inverts the archive's default compression.
    #[must_use]
    pub fn compression_flipped(&self) -> bool {
        self.compression_flipped
    }

    /// Whether the payload is compressed: the archive default combined with
    /// the per-file inversion bit.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Detaches the payload from whatever backs it, copying if necessary.
    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            hash: self.hash,
            name: self.name,
            bytes: self.bytes.into_owned(),
            compression_flipped: self.compression_flipped,
            compressed: self.compressed,
        }
    }
}
