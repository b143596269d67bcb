use crate::fo4::{Chunk, Hash};
use bstr::{BStr, BString};
use core::slice;

/// The texture descriptor carried by every file in a `DX10` archive.
///
/// The fields describe the DDS surface the chunks stream into; none of them
/// are interpreted here.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Dx10Descriptor {
    pub height: u16,
    pub width: u16,
    pub mip_count: u8,
    pub format: u8,
    pub flags: u8,
    pub tile_mode: u8,
}

/// A file entry: its identity, bookkeeping fields, and payload chunks.
pub struct File<'bytes> {
    pub(crate) hash: Hash,
    pub(crate) name: BString,
    pub(crate) data_file_index: i8,
    pub(crate) chunk_offset_or_type: u16,
    pub(crate) dx10: Option<Dx10Descriptor>,
    pub(crate) chunks: Vec<Chunk<'bytes>>,
}

impl<'bytes> File<'bytes> {
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The file's full path, when the archive carries a string table.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    /// Which split data file the payload lives in.
    #[must_use]
    pub fn data_file_index(&self) -> i8 {
        self.data_file_index
    }

    /// A field the games overload; preserved verbatim, meaning unknown.
    #[must_use]
    pub fn chunk_offset_or_type(&self) -> u16 {
        self.chunk_offset_or_type
    }

    /// The texture descriptor, on `DX10` archives.
    #[must_use]
    pub fn dx10(&self) -> Option<&Dx10Descriptor> {
        self.dx10.as_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The number of payload chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, Chunk<'bytes>> {
        self.chunks.iter()
    }

    /// Detaches every chunk from whatever backs it, copying if necessary.
    #[must_use]
    pub fn into_owned(self) -> File<'static> {
        File {
            hash: self.hash,
            name: self.name,
            data_file_index: self.data_file_index,
            chunk_offset_or_type: self.chunk_offset_or_type,
            dx10: self.dx10,
            chunks: self.chunks.into_iter().map(Chunk::into_owned).collect(),
        }
    }
}

impl<'bytes, 'this> IntoIterator for &'this File<'bytes> {
    type Item = &'this Chunk<'bytes>;
    type IntoIter = slice::Iter<'this, Chunk<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
