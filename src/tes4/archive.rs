use crate::{
    io::{BorrowedSource, Endian, MappedSource, Source},
    tes4::{hashing, Directory, File, Hash, Version},
    Error, Result,
};
use bstr::{BStr, BString};
use core::slice;
use std::{fs, io as std_io, path::Path};

bitflags::bitflags! {
    /// The header's archive-wide behavior bits.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Flags: u32 {
        const DIRECTORY_STRINGS = 1 << 0;
        const FILE_STRINGS = 1 << 1;
        const COMPRESSED = 1 << 2;
        const RETAIN_DIRECTORY_NAMES = 1 << 3;
        const RETAIN_FILE_NAMES = 1 << 4;
        const RETAIN_FILE_NAME_OFFSETS = 1 << 5;
        const XBOX_ARCHIVE = 1 << 6;
        const RETAIN_STRINGS_DURING_STARTUP = 1 << 7;
        const EMBEDDED_FILE_NAMES = 1 << 8;
        const XBOX_COMPRESSED = 1 << 9;
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::DIRECTORY_STRINGS | Self::FILE_STRINGS
    }
}

impl Flags {
    #[must_use]
    pub fn directory_strings(&self) -> bool {
        self.contains(Self::DIRECTORY_STRINGS)
    }

    #[must_use]
    pub fn file_strings(&self) -> bool {
        self.contains(Self::FILE_STRINGS)
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    #[must_use]
    pub fn retain_directory_names(&self) -> bool {
        self.contains(Self::RETAIN_DIRECTORY_NAMES)
    }

    #[must_use]
    pub fn retain_file_names(&self) -> bool {
        self.contains(Self::RETAIN_FILE_NAMES)
    }

    #[must_use]
    pub fn retain_file_name_offsets(&self) -> bool {
        self.contains(Self::RETAIN_FILE_NAME_OFFSETS)
    }

    #[must_use]
    pub fn xbox_archive(&self) -> bool {
        self.contains(Self::XBOX_ARCHIVE)
    }

    #[must_use]
    pub fn retain_strings_during_startup(&self) -> bool {
        self.contains(Self::RETAIN_STRINGS_DURING_STARTUP)
    }

    #[must_use]
    pub fn embedded_file_names(&self) -> bool {
        self.contains(Self::EMBEDDED_FILE_NAMES)
    }

    #[must_use]
    pub fn xbox_compressed(&self) -> bool {
        self.contains(Self::XBOX_COMPRESSED)
    }
}

bitflags::bitflags! {
    /// The header's content-type bits.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Types: u16 {
        const MESHES = 1 << 0;
        const TEXTURES = 1 << 1;
        const MENUS = 1 << 2;
        const SOUNDS = 1 << 3;
        const VOICES = 1 << 4;
        const SHADERS = 1 << 5;
        const TREES = 1 << 6;
        const FONTS = 1 << 7;
        const MISC = 1 << 8;
    }
}

impl Types {
    #[must_use]
    pub fn meshes(&self) -> bool {
        self.contains(Self::MESHES)
    }

    #[must_use]
    pub fn textures(&self) -> bool {
        self.contains(Self::TEXTURES)
    }

    #[must_use]
    pub fn menus(&self) -> bool {
        self.contains(Self::MENUS)
    }

    #[must_use]
    pub fn sounds(&self) -> bool {
        self.contains(Self::SOUNDS)
    }

    #[must_use]
    pub fn voices(&self) -> bool {
        self.contains(Self::VOICES)
    }

    #[must_use]
    pub fn shaders(&self) -> bool {
        self.contains(Self::SHADERS)
    }

    #[must_use]
    pub fn trees(&self) -> bool {
        self.contains(Self::TREES)
    }

    #[must_use]
    pub fn fonts(&self) -> bool {
        self.contains(Self::FONTS)
    }

    #[must_use]
    pub fn misc(&self) -> bool {
        self.contains(Self::MISC)
    }
}

mod constants {
    use crate::fourcc;

    pub(super) const BSA: u32 = fourcc::pack(b"BSA");

    pub(super) const HEADER_SIZE: u32 = 0x24;
    pub(super) const FILE_ENTRY_SIZE: usize = 0x10;

    pub(super) const FILE_FLAG_COMPRESSION: u32 = 1 << 30;
    pub(super) const FILE_FLAG_CHECKED: u32 = 1 << 31;
    pub(super) const FILE_FLAG_SECONDARY_ARCHIVE: u32 = 1 << 31;
}

struct Header {
    version: Version,
    flags: Flags,
    directory_count: u32,
    file_count: u32,
    directory_names_len: u32,
    file_names_len: u32,
    types: Types,
}

impl Header {
    #[must_use]
    fn hash_endian(&self) -> Endian {
        if self.flags.xbox_archive() {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

fn eof() -> Error {
    Error::Io(std_io::ErrorKind::UnexpectedEof.into())
}

/// An Oblivion-family archive: directories of files, both namespaces keyed
/// and ordered by hash.
pub struct Archive<'bytes> {
    version: Version,
    flags: Flags,
    types: Types,
    directories: Vec<Directory<'bytes>>,
}

impl<'bytes> Archive<'bytes> {
    /// Decodes an archive from a caller-provided byte slice.
    pub fn read(source: &'bytes [u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(source);
        Self::do_read(&mut source)
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub fn types(&self) -> Types {
        self.types
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, Directory<'bytes>> {
        self.directories.iter()
    }

    /// Looks up a directory by hash.
    #[must_use]
    pub fn get(&self, hash: &Hash) -> Option<&Directory<'bytes>> {
        self.directories
            .binary_search_by(|directory| directory.hash.cmp(hash))
            .ok()
            .map(|idx| &self.directories[idx])
    }

    /// Hashes a directory path and looks it up.
    pub fn find(&self, path: &BStr) -> Result<Option<&Directory<'bytes>>> {
        let (hash, _) = hashing::hash_directory(path)?;
        Ok(self.get(&hash))
    }

    /// Recomputes the hash of every named directory and file and counts the
    /// entries whose stored hash disagrees.
    ///
    /// Advisory, exactly as for the other dialects: nameless entries and
    /// names that cannot be hashed are skipped, and reading never fails on a
    /// mismatch.
    #[must_use]
    pub fn verify_hashes(&self) -> usize {
        let mut mismatched = 0;
        for directory in &self.directories {
            if !directory.name.is_empty() {
                if let Ok((hash, _)) = hashing::hash_directory(directory.name.as_ref()) {
                    if hash != directory.hash {
                        mismatched += 1;
                    }
                }
            }

            for file in &directory.files {
                if file.name.is_empty() {
                    continue;
                }
                if let Ok((hash, _)) = hashing::hash_file(file.name.as_ref()) {
                    if hash != file.hash {
                        mismatched += 1;
                    }
                }
            }
        }

        mismatched
    }

    fn do_read<In>(source: &mut In) -> Result<Self>
    where
        In: Source<'bytes>,
    {
        if source.is_empty() {
            return Err(Error::EmptyFile);
        }

        let header = Self::read_header(source)?;
        source.seek_absolute(constants::HEADER_SIZE as usize)?;

        let mut directories = Vec::with_capacity(header.directory_count as usize);
        for _ in 0..header.directory_count {
            directories.push(Self::read_directory(source, &header)?);
        }

        // the directory names and the file records live between the
        // directory records and the file name table; every bzstring also
        // carries a one byte length prefix on top of the recorded total
        let mut skip = header.file_count as usize * constants::FILE_ENTRY_SIZE;
        if header.flags.directory_strings() {
            skip += header.directory_names_len as usize + header.directory_count as usize;
        }
        #[allow(clippy::cast_possible_wrap)]
        source.seek_relative(skip as isize)?;

        if header.flags.file_strings() {
            for directory in &mut directories {
                for file in &mut directory.files {
                    file.name = source.read_zstring()?;
                }
            }
        }

        for directory in &mut directories {
            directory
                .files
                .sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));
        }
        directories.sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));

        Ok(Self {
            version: header.version,
            flags: header.flags,
            types: header.types,
            directories,
        })
    }

    fn read_directory<In>(source: &mut In, header: &Header) -> Result<Directory<'bytes>>
    where
        In: Source<'bytes>,
    {
        let hash = Self::read_hash(source, header.hash_endian())?;
        let file_count: u32 = source.read(Endian::Little)?;
        let files_offset: u32 = match header.version {
            Version::v103 | Version::v104 => source.read(Endian::Little)?,
            Version::v105 => {
                source.seek_relative(4)?;
                let offset = source.read(Endian::Little)?;
                source.seek_relative(4)?;
                offset
            }
        };

        let mut name = BString::default();
        let mut files = Vec::with_capacity(file_count as usize);
        if header.flags.directory_strings() || file_count > 0 {
            // the recorded offset counts the file name table as if it came
            // first, so the absolute position backs it out
            let extra = (files_offset as usize)
                .checked_sub(header.file_names_len as usize)
                .ok_or_else(eof)?;

            let mut guard = source.checkpoint();
            guard.seek_absolute(extra)?;
            if header.flags.directory_strings() {
                name = guard.read_bzstring()?;
            }
            for _ in 0..file_count {
                files.push(Self::read_file(&mut *guard, header)?);
            }
        }

        Ok(Directory { hash, name, files })
    }

    fn read_file<In>(source: &mut In, header: &Header) -> Result<File<'bytes>>
    where
        In: Source<'bytes>,
    {
        let hash = Self::read_hash(source, header.hash_endian())?;
        let size: u32 = source.read(Endian::Little)?;
        let offset: u32 = source.read(Endian::Little)?;

        let compression_flipped = size & constants::FILE_FLAG_COMPRESSION != 0;
        let data_size =
            size & !(constants::FILE_FLAG_COMPRESSION | constants::FILE_FLAG_CHECKED);
        let data_offset = offset & !constants::FILE_FLAG_SECONDARY_ARCHIVE;

        let bytes = source.subspan(data_offset as usize, data_size as usize)?;
        Ok(File {
            hash,
            name: BString::default(),
            bytes,
            compression_flipped,
            compressed: header.flags.compressed() != compression_flipped,
        })
    }

    fn read_hash<In>(source: &mut In, endian: Endian) -> Result<Hash>
    where
        In: Source<'bytes>,
    {
        let last: u8 = source.read(Endian::Little)?;
        let last2: u8 = source.read(Endian::Little)?;
        let length: u8 = source.read(Endian::Little)?;
        let first: u8 = source.read(Endian::Little)?;
        let crc: u32 = source.read(endian)?;
        Ok(Hash {
            last,
            last2,
            length,
            first,
            crc,
        })
    }

    fn read_header<In>(source: &mut In) -> Result<Header>
    where
        In: Source<'bytes>,
    {
        let magic: u32 = source.read(Endian::Little)?;
        if magic != constants::BSA {
            return Err(Error::InvalidMagic(magic));
        }

        let version: u32 = source.read(Endian::Little)?;
        let version = match version {
            103 => Version::v103,
            104 => Version::v104,
            105 => Version::v105,
            _ => return Err(Error::UnsupportedVersion(version)),
        };

        let header_size: u32 = source.read(Endian::Little)?;
        if header_size != constants::HEADER_SIZE {
            return Err(Error::InvalidHeaderSize(header_size));
        }

        let flags: u32 = source.read(Endian::Little)?;
        let directory_count: u32 = source.read(Endian::Little)?;
        let file_count: u32 = source.read(Endian::Little)?;
        let directory_names_len: u32 = source.read(Endian::Little)?;
        let file_names_len: u32 = source.read(Endian::Little)?;
        let types: u16 = source.read(Endian::Little)?;
        let _padding: u16 = source.read(Endian::Little)?;

        // real archives set bits outside the known sets, so truncate rather
        // than reject
        Ok(Header {
            version,
            flags: Flags::from_bits_truncate(flags),
            directory_count,
            file_count,
            directory_names_len,
            file_names_len,
            types: Types::from_bits_truncate(types),
        })
    }
}

impl Archive<'static> {
    /// Memory-maps and decodes an archive file.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = fs::File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Err(Error::EmptyFile);
        }

        let mut source = MappedSource::try_from(&file)?;
        Self::do_read(&mut source)
    }
}

impl<'bytes, 'this> IntoIterator for &'this Archive<'bytes> {
    type Item = &'this Directory<'bytes>;
    type IntoIter = slice::Iter<'this, Directory<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
