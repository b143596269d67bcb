use crate::{
    fo4::{hashing, Chunk, Dx10Descriptor, File, Format, Hash},
    io::{BorrowedSource, Endian, MappedSource, Source},
    Error, Result,
};
use bstr::{BStr, BString};
use core::slice;
use std::{fs, path::Path};

mod constants {
    use crate::fourcc;

    pub(super) const MAGIC: u32 = fourcc::pack(b"BTDX");
    pub(super) const GNRL: u32 = fourcc::pack(b"GNRL");
    pub(super) const DX10: u32 = fourcc::pack(b"DX10");

    pub(super) const VERSION: u32 = 1;
    pub(super) const CHUNK_SENTINEL: u32 = 0xBAAD_F00D;
}

struct Header {
    format: Format,
    file_count: u32,
    string_table_offset: u64,
}

/// A Fallout 4 archive: a flat, globally hash-keyed collection of chunked
/// files.
pub struct Archive<'bytes> {
    format: Format,
    files: Vec<File<'bytes>>,
}

impl<'bytes> Archive<'bytes> {
    /// Decodes an archive from a caller-provided byte slice.
    pub fn read(source: &'bytes [u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(source);
        Self::do_read(&mut source)
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
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

    /// Hashes a path and looks the file up.
    pub fn find(&self, path: &BStr) -> Result<Option<&File<'bytes>>> {
        let (hash, _) = hashing::hash_file(path)?;
        Ok(self.get(&hash))
    }

    /// Recomputes the hash of every named file and counts the entries whose
    /// stored hash disagrees.
    ///
    /// Advisory: nameless entries and names that cannot be hashed are
    /// skipped, and reading never fails on a mismatch.
    #[must_use]
    pub fn verify_hashes(&self) -> usize {
        self.files
            .iter()
            .filter(|file| {
                if file.name.is_empty() {
                    return false;
                }
                match hashing::hash_file(file.name.as_ref()) {
                    Ok((hash, _)) => hash != file.hash,
                    Err(_) => false,
                }
            })
            .count()
    }

    fn do_read<In>(source: &mut In) -> Result<Self>
    where
        In: Source<'bytes>,
    {
        if source.is_empty() {
            return Err(Error::EmptyFile);
        }

        let header = Self::read_header(source)?;
        let mut files = Vec::with_capacity(header.file_count as usize);
        for _ in 0..header.file_count {
            files.push(Self::read_file(source, &header)?);
        }

        if header.string_table_offset != 0 {
            source.seek_absolute(header.string_table_offset.try_into()?)?;
            for file in &mut files {
                file.name = source.read_wstring()?;
            }
        }

        files.sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));
        Ok(Self {
            format: header.format,
            files,
        })
    }

    fn read_file<In>(source: &mut In, header: &Header) -> Result<File<'bytes>>
    where
        In: Source<'bytes>,
    {
        let hash = Self::read_hash(source)?;
        let data_file_index: i8 = source.read(Endian::Little)?;
        let chunk_count: i8 = source.read(Endian::Little)?;
        let chunk_offset_or_type: u16 = source.read(Endian::Little)?;

        let dx10 = match header.format {
            Format::GNRL => None,
            Format::DX10 => {
                let height: u16 = source.read(Endian::Little)?;
                let width: u16 = source.read(Endian::Little)?;
                let mip_count: u8 = source.read(Endian::Little)?;
                let format: u8 = source.read(Endian::Little)?;
                let flags: u8 = source.read(Endian::Little)?;
                let tile_mode: u8 = source.read(Endian::Little)?;
                Some(Dx10Descriptor {
                    height,
                    width,
                    mip_count,
                    format,
                    flags,
                    tile_mode,
                })
            }
        };

        let chunk_count = usize::try_from(chunk_count).unwrap_or_default();
        let mut chunks = Vec::with_capacity(chunk_count);
        for _ in 0..chunk_count {
            chunks.push(Self::read_chunk(source, header)?);
        }

        Ok(File {
            hash,
            name: BString::default(),
            data_file_index,
            chunk_offset_or_type,
            dx10,
            chunks,
        })
    }

    fn read_chunk<In>(source: &mut In, header: &Header) -> Result<Chunk<'bytes>>
    where
        In: Source<'bytes>,
    {
        let data_offset: u64 = source.read(Endian::Little)?;
        let compressed_size: u32 = source.read(Endian::Little)?;
        let decompressed_size: u32 = source.read(Endian::Little)?;

        let mips = match header.format {
            Format::GNRL => None,
            Format::DX10 => {
                let first: u16 = source.read(Endian::Little)?;
                let last: u16 = source.read(Endian::Little)?;
                Some(first..last)
            }
        };

        let sentinel: u32 = source.read(Endian::Little)?;
        if sentinel != constants::CHUNK_SENTINEL {
            return Err(Error::InvalidChunkSentinel(sentinel));
        }

        let len = if compressed_size == 0 {
            decompressed_size
        } else {
            compressed_size
        };
        let bytes = source.subspan(data_offset.try_into()?, len as usize)?;

        Ok(Chunk {
            bytes,
            decompressed_len: (compressed_size != 0).then_some(decompressed_size as usize),
            mips,
        })
    }

    fn read_hash<In>(source: &mut In) -> Result<Hash>
    where
        In: Source<'bytes>,
    {
        let file: u32 = source.read(Endian::Little)?;
        let mut extension = [0u8; 4];
        source.read_into(&mut extension)?;
        let directory: u32 = source.read(Endian::Little)?;
        Ok(Hash {
            file,
            extension,
            directory,
        })
    }

    fn read_header<In>(source: &mut In) -> Result<Header>
    where
        In: Source<'bytes>,
    {
        let magic: u32 = source.read(Endian::Little)?;
        if magic != constants::MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let version: u32 = source.read(Endian::Little)?;
        if version != constants::VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let contents_format: u32 = source.read(Endian::Little)?;
        let format = match contents_format {
            constants::GNRL => Format::GNRL,
            constants::DX10 => Format::DX10,
            _ => return Err(Error::InvalidFormat(contents_format)),
        };

        let file_count: u32 = source.read(Endian::Little)?;
        let string_table_offset: u64 = source.read(Endian::Little)?;

        Ok(Header {
            format,
            file_count,
            string_table_offset,
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
    type Item = &'this File<'bytes>;
    type IntoIter = slice::Iter<'this, File<'bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::Archive;
    use crate::{fo4, Error};
    use anyhow::Context as _;
    use bstr::{BStr, ByteSlice as _};
    use std::io;

    struct FixtureChunk<'input> {
        data: &'input [u8],
        decompressed_len: Option<u32>,
        mips: Option<(u16, u16)>,
    }

    struct FixtureFile<'input> {
        name: &'input [u8],
        chunks: Vec<FixtureChunk<'input>>,
    }

    fn plain(name: &'static [u8], data: &'static [u8]) -> FixtureFile<'static> {
        FixtureFile {
            name,
            chunks: vec![FixtureChunk {
                data,
                decompressed_len: None,
                mips: None,
            }],
        }
    }

    fn build(
        format: &[u8; 4],
        files: &[FixtureFile<'_>],
        strings: bool,
        sentinel: u32,
    ) -> anyhow::Result<Vec<u8>> {
        let dx10 = format == b"DX10";
        let file_header_size = if dx10 { 24 } else { 16 };
        let chunk_size = if dx10 { 24 } else { 20 };

        let entries_len: usize = files
            .iter()
            .map(|file| file_header_size + file.chunks.len() * chunk_size)
            .sum();
        let payload_start = 24 + entries_len;
        let payload_len: usize = files
            .iter()
            .flat_map(|file| &file.chunks)
            .map(|chunk| chunk.data.len())
            .sum();

        let mut out = Vec::new();
        out.extend(b"BTDX");
        out.extend(1u32.to_le_bytes());
        out.extend(format);
        out.extend(u32::try_from(files.len())?.to_le_bytes());
        let string_table_offset = if strings {
            u64::try_from(payload_start + payload_len)?
        } else {
            0
        };
        out.extend(string_table_offset.to_le_bytes());

        let mut payload_offset = payload_start;
        for file in files {
            let (hash, _) = fo4::hash_file(file.name.as_bstr())?;
            out.extend(hash.file.to_le_bytes());
            out.extend(hash.extension);
            out.extend(hash.directory.to_le_bytes());
            out.push(0); // data file index
            out.push(u8::try_from(file.chunks.len())?);
            out.extend(0x0014u16.to_le_bytes());
            if dx10 {
                out.extend(512u16.to_le_bytes()); // height
                out.extend(256u16.to_le_bytes()); // width
                out.push(10); // mip count
                out.push(99); // dxgi format
                out.push(0); // flags
                out.push(8); // tile mode
            }

            for chunk in &file.chunks {
                out.extend(u64::try_from(payload_offset)?.to_le_bytes());
                match chunk.decompressed_len {
                    Some(decompressed) => {
                        out.extend(u32::try_from(chunk.data.len())?.to_le_bytes());
                        out.extend(decompressed.to_le_bytes());
                    }
                    None => {
                        out.extend(0u32.to_le_bytes());
                        out.extend(u32::try_from(chunk.data.len())?.to_le_bytes());
                    }
                }
                if dx10 {
                    let (first, last) = chunk.mips.unwrap_or((0, 0));
                    out.extend(first.to_le_bytes());
                    out.extend(last.to_le_bytes());
                }
                out.extend(sentinel.to_le_bytes());
                payload_offset += chunk.data.len();
            }
        }

        for file in files {
            for chunk in &file.chunks {
                out.extend_from_slice(chunk.data);
            }
        }

        if strings {
            for file in files {
                out.extend(u16::try_from(file.name.len())?.to_le_bytes());
                out.extend_from_slice(file.name);
            }
        }

        Ok(out)
    }

    #[test]
    fn reading_general_archives() -> anyhow::Result<()> {
        let files = vec![
            plain(b"interface\\hudmenu.swf", b"menu payload"),
            plain(b"misc\\hello.txt", b"hello world"),
        ];
        let data = build(b"GNRL", &files, true, 0xBAAD_F00D)?;
        let archive = Archive::read(&data)?;

        assert_eq!(archive.format(), fo4::Format::GNRL);
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.verify_hashes(), 0);

        let file = archive
            .find(BStr::new(b"Interface/HUDMenu.swf"))?
            .context("missing file")?;
        assert_eq!(file.name(), "interface\\hudmenu.swf");
        assert_eq!(file.len(), 1);
        assert_eq!(file.chunk_offset_or_type(), 0x14);
        assert!(file.dx10().is_none());

        let chunk = file.iter().next().context("missing chunk")?;
        assert_eq!(chunk.as_bytes(), b"menu payload");
        assert!(!chunk.is_compressed());
        assert_eq!(chunk.decompressed_len(), None);
        assert!(chunk.mips().is_none());
        Ok(())
    }

    #[test]
    fn single_chunk_payloads_fit_the_archive() -> anyhow::Result<()> {
        let files = vec![plain(b"misc\\hello.txt", b"hello world")];
        let data = build(b"GNRL", &files, true, 0xBAAD_F00D)?;
        let archive = Archive::read(&data)?;

        for file in &archive {
            if file.len() == 1 {
                let chunk = file.iter().next().context("missing chunk")?;
                assert!(chunk.len() <= data.len());
                assert_eq!(chunk.as_bytes().len(), chunk.len());
            }
        }
        Ok(())
    }

    #[test]
    fn compressed_chunks_surface_both_sizes() -> anyhow::Result<()> {
        let files = vec![FixtureFile {
            name: b"textures\\big.dds",
            chunks: vec![FixtureChunk {
                data: b"squeezed",
                decompressed_len: Some(4096),
                mips: None,
            }],
        }];
        let data = build(b"GNRL", &files, true, 0xBAAD_F00D)?;
        let archive = Archive::read(&data)?;

        let file = archive
            .find(BStr::new(b"textures/big.dds"))?
            .context("missing file")?;
        let chunk = file.iter().next().context("missing chunk")?;
        assert!(chunk.is_compressed());
        assert_eq!(chunk.len(), 8);
        assert_eq!(chunk.decompressed_len(), Some(4096));
        Ok(())
    }

    #[test]
    fn reading_texture_archives() -> anyhow::Result<()> {
        let files = vec![FixtureFile {
            name: b"textures\\land\\dirt01_d.dds",
            chunks: vec![
                FixtureChunk {
                    data: b"mip zero",
                    decompressed_len: None,
                    mips: Some((0, 0)),
                },
                FixtureChunk {
                    data: b"the rest of the mip chain",
                    decompressed_len: None,
                    mips: Some((1, 9)),
                },
            ],
        }];
        let data = build(b"DX10", &files, true, 0xBAAD_F00D)?;
        let archive = Archive::read(&data)?;

        assert_eq!(archive.format(), fo4::Format::DX10);
        assert_eq!(archive.verify_hashes(), 0);

        let file = archive
            .find(BStr::new(b"textures/land/dirt01_d.dds"))?
            .context("missing file")?;
        let descriptor = file.dx10().context("missing texture descriptor")?;
        assert_eq!(descriptor.height, 512);
        assert_eq!(descriptor.width, 256);
        assert_eq!(descriptor.mip_count, 10);
        assert_eq!(descriptor.format, 99);
        assert_eq!(descriptor.tile_mode, 8);

        let chunks: Vec<_> = file.iter().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_bytes(), b"mip zero");
        assert_eq!(chunks[0].mips(), Some(0..0));
        assert_eq!(chunks[1].as_bytes(), b"the rest of the mip chain");
        assert_eq!(chunks[1].mips(), Some(1..9));
        Ok(())
    }

    #[test]
    fn nameless_archives_still_index_by_hash() -> anyhow::Result<()> {
        let files = vec![plain(b"misc\\hello.txt", b"hello world")];
        let data = build(b"GNRL", &files, false, 0xBAAD_F00D)?;
        let archive = Archive::read(&data)?;

        assert_eq!(archive.verify_hashes(), 0);
        let file = archive.iter().next().context("missing file")?;
        assert!(file.name().is_empty());

        let (hash, _) = fo4::hash_file(b"misc/hello.txt".as_bstr())?;
        assert!(archive.get(&hash).is_some());
        Ok(())
    }

    #[test]
    fn corrupt_hashes_are_reported_not_fatal() -> anyhow::Result<()> {
        let files = vec![plain(b"misc\\hello.txt", b"hello world")];
        let mut data = build(b"GNRL", &files, true, 0xBAAD_F00D)?;
        data[24] ^= 0xFF; // clobber the entry's file crc
        let archive = Archive::read(&data)?;
        assert_eq!(archive.verify_hashes(), 1);
        Ok(())
    }

    #[test]
    fn bad_sentinels_are_fatal() -> anyhow::Result<()> {
        let files = vec![plain(b"misc\\hello.txt", b"hello world")];
        let data = build(b"GNRL", &files, true, 0xDEAD_BEEF)?;
        assert!(matches!(
            Archive::read(&data),
            Err(Error::InvalidChunkSentinel(0xDEAD_BEEF))
        ));
        Ok(())
    }

    #[test]
    fn empty_input() {
        assert!(matches!(Archive::read(b""), Err(Error::EmptyFile)));
    }

    #[test]
    fn invalid_magic() {
        let data = b"XTDX\x01\x00\x00\x00GNRL\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            Archive::read(data),
            Err(Error::InvalidMagic(0x5844_5458))
        ));
    }

    #[test]
    fn invalid_version() {
        let data = b"BTDX\x02\x00\x00\x00GNRL\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(
            Archive::read(data),
            Err(Error::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn invalid_format() {
        let data = b"BTDX\x01\x00\x00\x00QQQQ\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(matches!(Archive::read(data), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn truncated_input() -> anyhow::Result<()> {
        let files = vec![plain(b"misc\\hello.txt", b"hello world")];
        let data = build(b"GNRL", &files, true, 0xBAAD_F00D)?;
        let result = Archive::read(&data[..30]);
        assert!(
            matches!(result, Err(Error::Io(error)) if error.kind() == io::ErrorKind::UnexpectedEof)
        );
        Ok(())
    }
}
