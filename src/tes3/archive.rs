use crate::{
    io::{BorrowedSource, Endian, MappedSource, Sink, Source},
    tes3::{hashing, File, FileHash, MAX_INT32},
    Error, Result,
};
use bstr::BStr;
use core::slice;
use std::{fs, io::Write, path::Path};

mod constants {
    pub(super) const FILE_ENTRY_SIZE: usize = 0x8;
    pub(super) const HASH_SIZE: usize = 0x8;
    pub(super) const HEADER_MAGIC: u32 = 0x100;
    pub(super) const HEADER_SIZE: usize = 0xC;
}

struct Offsets {
    name_offsets: usize,
    names: usize,
    hashes: usize,
    file_data: usize,
}

struct Header {
    hash_offset: u32,
    file_count: u32,
}

impl Header {
    #[must_use]
    fn compute_offsets(&self) -> Offsets {
        let file_count = self.file_count as usize;
        let name_offsets = constants::HEADER_SIZE + constants::FILE_ENTRY_SIZE * file_count;
        let names = name_offsets + 0x4 * file_count;
        let hashes = constants::HEADER_SIZE + self.hash_offset as usize;
        let file_data = hashes + constants::HASH_SIZE * file_count;
        Offsets {
            name_offsets,
            names,
            hashes,
            file_data,
        }
    }
}

/// A Morrowind archive: a flat collection of files kept sorted by hash.
///
/// The hash order is the only index the format has, so every lookup is a
/// binary search and every mutation maintains the order.
#[derive(Default)]
pub struct Archive<'bytes> {
    files: Vec<File<'bytes>>,
}

impl<'bytes> Archive<'bytes> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an archive from a caller-provided byte slice.
    pub fn read(source: &'bytes [u8]) -> Result<Self> {
        let mut source = BorrowedSource::from(source);
        Self::do_read(&mut source)
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
    pub fn get(&self, hash: &FileHash) -> Option<&File<'bytes>> {
        self.search(hash).ok().map(|idx| &self.files[idx])
    }

    /// Hashes a path and looks the file up.
    pub fn find(&self, path: &BStr) -> Result<Option<&File<'bytes>>> {
        let (hash, _) = hashing::hash_file(path)?;
        Ok(self.get(&hash))
    }

    /// Inserts a file, keeping the hash order.
    ///
    /// Returns `Ok(false)` without touching the archive if a file with the
    /// same hash is already present. Fails with [`Error::SizeOverflow`],
    /// also without touching the archive, if the resulting layout could not
    /// be written back out.
    pub fn insert(&mut self, file: File<'bytes>) -> Result<bool> {
        let Err(idx) = self.search(&file.hash) else {
            return Ok(false);
        };

        let mut merged: Vec<&File<'bytes>> = self.files.iter().collect();
        merged.insert(idx, &file);
        validate_layout(&merged)?;

        self.files.insert(idx, file);
        Ok(true)
    }

    /// Inserts many files at once.
    ///
    /// Hash collisions, within the input or against the archive, are
    /// dropped (first occurrence wins). The merge is validated as a whole
    /// before anything is admitted: on [`Error::SizeOverflow`] the archive
    /// is left unchanged. Returns how many files were inserted.
    pub fn insert_all<In>(&mut self, files: In) -> Result<usize>
    where
        In: IntoIterator<Item = File<'bytes>>,
    {
        let mut incoming: Vec<File<'bytes>> = files.into_iter().collect();
        incoming.sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));
        incoming.dedup_by(|lhs, rhs| lhs.hash == rhs.hash);
        incoming.retain(|file| self.search(&file.hash).is_err());
        if incoming.is_empty() {
            return Ok(0);
        }

        let mut merged: Vec<&File<'bytes>> = self.files.iter().chain(&incoming).collect();
        merged.sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));
        validate_layout(&merged)?;

        let inserted = incoming.len();
        self.files.append(&mut incoming);
        self.files.sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));
        Ok(inserted)
    }

    /// Removes a file by hash, returning it if present.
    pub fn remove(&mut self, hash: &FileHash) -> Option<File<'bytes>> {
        self.search(hash).ok().map(|idx| self.files.remove(idx))
    }

    /// Recomputes every file's hash from its stored name and counts the
    /// entries whose stored hash disagrees.
    ///
    /// Shipped archives contain the occasional malformed entry, so this is
    /// advisory: [`Archive::read`] never fails on a mismatch. Files whose
    /// names cannot be hashed are skipped.
    #[must_use]
    pub fn verify_hashes(&self) -> usize {
        self.files
            .iter()
            .filter(|file| match hashing::hash_file(file.name.as_ref()) {
                Ok((hash, _)) => hash != file.hash,
                Err(_) => false,
            })
            .count()
    }

    /// Encodes the archive; the mirror image of [`Archive::read`].
    ///
    /// File offsets are recomputed as a running sum over the hash order, so
    /// re-encoding a well-formed archive reproduces it byte for byte.
    pub fn write<Out>(&self, stream: &mut Out) -> Result<()>
    where
        Out: Write,
    {
        let mut sink = Sink::new(stream);
        let header = self.make_header()?;
        Self::write_header(&mut sink, &header)?;
        self.write_file_records(&mut sink)?;
        self.write_name_offsets(&mut sink)?;
        self.write_names(&mut sink)?;
        self.write_hashes(&mut sink)?;
        self.write_file_data(&mut sink)?;

        Ok(())
    }

    fn search(&self, hash: &FileHash) -> core::result::Result<usize, usize> {
        self.files.binary_search_by(|file| file.hash.cmp(hash))
    }

    fn do_read<In>(source: &mut In) -> Result<Self>
    where
        In: Source<'bytes>,
    {
        if source.is_empty() {
            return Err(Error::EmptyFile);
        }

        let header = Self::read_header(source)?;
        let offsets = header.compute_offsets();
        let count = header.file_count as usize;

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let size: u32 = source.read(Endian::Little)?;
            let offset: u32 = source.read(Endian::Little)?;
            records.push((size, offset));
        }

        let mut name_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            name_offsets.push(source.read::<u32>(Endian::Little)?);
        }

        let mut names = Vec::with_capacity(count);
        for &name_offset in &name_offsets {
            source.seek_absolute(offsets.names + name_offset as usize)?;
            names.push(source.read_zstring()?);
        }

        source.seek_absolute(offsets.hashes)?;
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let lo: u32 = source.read(Endian::Little)?;
            let hi: u32 = source.read(Endian::Little)?;
            hashes.push(FileHash { lo, hi });
        }

        let mut files = Vec::with_capacity(count);
        for ((hash, name), (size, offset)) in hashes.into_iter().zip(names).zip(records) {
            let bytes = source.subspan(offsets.file_data + offset as usize, size as usize)?;
            files.push(File { hash, name, bytes });
        }

        files.sort_by(|lhs, rhs| lhs.hash.cmp(&rhs.hash));
        Ok(Self { files })
    }

    fn read_header<In>(source: &mut In) -> Result<Header>
    where
        In: Source<'bytes>,
    {
        let magic: u32 = source.read(Endian::Little)?;
        if magic != constants::HEADER_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let hash_offset: u32 = source.read(Endian::Little)?;
        let file_count: u32 = source.read(Endian::Little)?;
        Ok(Header {
            hash_offset,
            file_count,
        })
    }

    fn make_header(&self) -> Result<Header> {
        let names_len: usize = self.files.iter().map(|file| file.name.len() + 1).sum();
        Ok(Header {
            file_count: self.files.len().try_into()?,
            hash_offset: {
                let records_len = (constants::FILE_ENTRY_SIZE + 0x4) * self.files.len();
                u32::try_from(records_len + names_len)?
            },
        })
    }

    fn write_header<Out>(sink: &mut Sink<'_, Out>, header: &Header) -> Result<()>
    where
        Out: Write,
    {
        sink.write(constants::HEADER_MAGIC, Endian::Little)?;
        sink.write(header.hash_offset, Endian::Little)?;
        sink.write(header.file_count, Endian::Little)?;
        Ok(())
    }

    fn write_file_records<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        let mut offset: u32 = 0;
        for file in &self.files {
            let size: u32 = file.len().try_into()?;
            sink.write(size, Endian::Little)?;
            sink.write(offset, Endian::Little)?;
            offset = offset.checked_add(size).ok_or(Error::SizeOverflow)?;
        }

        Ok(())
    }

    fn write_name_offsets<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        let mut offset: u32 = 0;
        for file in &self.files {
            sink.write(offset, Endian::Little)?;
            offset = offset
                .checked_add(u32::try_from(file.name.len() + 1)?)
                .ok_or(Error::SizeOverflow)?;
        }

        Ok(())
    }

    fn write_names<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for file in &self.files {
            sink.write_zstring(file.name.as_ref())?;
        }

        Ok(())
    }

    fn write_hashes<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for file in &self.files {
            sink.write(file.hash.lo, Endian::Little)?;
            sink.write(file.hash.hi, Endian::Little)?;
        }

        Ok(())
    }

    fn write_file_data<Out>(&self, sink: &mut Sink<'_, Out>) -> Result<()>
    where
        Out: Write,
    {
        for file in &self.files {
            sink.write_bytes(file.as_bytes())?;
        }

        Ok(())
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

/// Checks that every size and offset the writer would store for this
/// (hash-ordered) set of files fits a signed 32-bit field.
fn validate_layout(files: &[&File<'_>]) -> Result<()> {
    let mut names_len: u64 = 0;
    let mut data_offset: u64 = 0;
    for file in files {
        if data_offset > MAX_INT32 as u64 {
            return Err(Error::SizeOverflow);
        }
        data_offset += file.len() as u64;
        names_len += file.name.len() as u64 + 1;
    }

    let records_len = (constants::FILE_ENTRY_SIZE + 0x4) as u64 * files.len() as u64;
    if records_len + names_len > MAX_INT32 as u64 {
        return Err(Error::SizeOverflow);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        tes3::{self, Archive, File},
        Error,
    };
    use anyhow::Context as _;
    use bstr::{BStr, ByteSlice as _};
    use std::io;

    fn make_file(name: &[u8], data: &[u8]) -> anyhow::Result<File<'static>> {
        File::from_owned(name.as_bstr(), data.to_vec())
            .with_context(|| format!("failed to build file: {name:?}"))
    }

    /// A canonical single-entry archive holding `meshes\x.nif` => `DE AD BE EF`.
    fn single_entry_fixture() -> anyhow::Result<Vec<u8>> {
        let (hash, name) = tes3::hash_file(b"meshes/x.nif".as_bstr())?;
        assert_eq!(name, "meshes\\x.nif");

        let mut fixture = Vec::new();
        fixture.extend(0x100u32.to_le_bytes());
        let hash_offset = 12 + name.len() as u32 + 1;
        fixture.extend(hash_offset.to_le_bytes());
        fixture.extend(1u32.to_le_bytes());
        fixture.extend(4u32.to_le_bytes()); // size
        fixture.extend(0u32.to_le_bytes()); // offset
        fixture.extend(0u32.to_le_bytes()); // name offset
        fixture.extend_from_slice(&name);
        fixture.push(0);
        fixture.extend(hash.lo.to_le_bytes());
        fixture.extend(hash.hi.to_le_bytes());
        fixture.extend([0xDE, 0xAD, 0xBE, 0xEF]);
        Ok(fixture)
    }

    #[test]
    fn default_state() {
        let archive = Archive::new();
        assert!(archive.is_empty());
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn empty_input() {
        assert!(matches!(Archive::read(b""), Err(Error::EmptyFile)));
    }

    #[test]
    fn invalid_magic() {
        let data = 0x200u32.to_le_bytes();
        assert!(matches!(
            Archive::read(&data),
            Err(Error::InvalidMagic(0x200))
        ));
    }

    #[test]
    fn truncated_input() {
        let mut data = Vec::new();
        data.extend(0x100u32.to_le_bytes());
        data.extend(0u32.to_le_bytes());
        data.extend(5u32.to_le_bytes()); // promises five files, delivers none
        let result = Archive::read(&data);
        assert!(
            matches!(result, Err(Error::Io(error)) if error.kind() == io::ErrorKind::UnexpectedEof)
        );
    }

    #[test]
    fn header_only_archive() -> anyhow::Result<()> {
        let data = b"\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let archive = Archive::read(data)?;
        assert!(archive.is_empty());

        let mut rewritten = Vec::new();
        archive.write(&mut rewritten)?;
        assert_eq!(rewritten, data);
        Ok(())
    }

    #[test]
    fn single_entry_round_trip() -> anyhow::Result<()> {
        let fixture = single_entry_fixture()?;
        let archive = Archive::read(&fixture)?;
        assert_eq!(archive.len(), 1);

        let file = archive.iter().next().context("archive had no entries")?;
        assert_eq!(file.name(), "meshes\\x.nif");
        assert_eq!(file.as_bytes(), [0xDE, 0xAD, 0xBE, 0xEF]);

        let (expected, _) = tes3::hash_file(file.name())?;
        assert_eq!(file.hash(), expected);
        assert_eq!(archive.find(BStr::new(b"Meshes\\X.NIF"))?.map(File::len), Some(4));
        assert_eq!(archive.verify_hashes(), 0);

        let mut rewritten = Vec::new();
        archive.write(&mut rewritten)?;
        assert_eq!(rewritten, fixture);
        Ok(())
    }

    #[test]
    fn write_read_write_is_stable() -> anyhow::Result<()> {
        let mut archive = Archive::new();
        assert!(archive.insert(make_file(b"meshes/m/probe_journeyman_01.nif", b"probe")?)?);
        assert!(archive.insert(make_file(b"textures/tx_natural_cavern_wall13.dds", b"wall")?)?);
        assert!(archive.insert(make_file(b"icons/gold.dds", b"gold")?)?);

        let mut first = Vec::new();
        archive.write(&mut first)?;

        let reread = Archive::read(&first)?;
        assert_eq!(reread.len(), archive.len());
        assert_eq!(reread.verify_hashes(), 0);

        let mut second = Vec::new();
        reread.write(&mut second)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn mutation_maintains_sort_and_uniqueness() -> anyhow::Result<()> {
        let names: [&[u8]; 5] = [
            b"meshes/a.nif",
            b"meshes/b.nif",
            b"meshes/c.nif",
            b"textures/a.dds",
            b"textures/b.dds",
        ];

        let mut archive = Archive::new();
        for name in names {
            assert!(archive.insert(make_file(name, b"payload")?)?);
        }

        // duplicates are rejected without touching the archive
        assert!(!archive.insert(make_file(b"MESHES\\A.NIF", b"other")?)?);
        assert_eq!(archive.len(), names.len());

        let (hash, _) = tes3::hash_file(b"meshes/b.nif".as_bstr())?;
        let removed = archive.remove(&hash).context("failed to remove entry")?;
        assert_eq!(removed.name(), "meshes\\b.nif");
        assert!(archive.get(&hash).is_none());

        let hashes: Vec<_> = archive.iter().map(File::hash).collect();
        assert!(hashes.windows(2).all(|pair| pair[0] < pair[1]));
        Ok(())
    }

    #[test]
    fn bulk_insert_merges_uniquely() -> anyhow::Result<()> {
        let mut archive = Archive::new();
        assert!(archive.insert(make_file(b"a.txt", b"a")?)?);

        let inserted = archive.insert_all([
            make_file(b"b.txt", b"b")?,
            make_file(b"B.TXT", b"duplicate in input")?,
            make_file(b"a.txt", b"duplicate of existing")?,
            make_file(b"c.txt", b"c")?,
        ])?;
        assert_eq!(inserted, 2);
        assert_eq!(archive.len(), 3);

        let first = archive.find(BStr::new(b"a.txt"))?.context("missing a.txt")?;
        assert_eq!(first.as_bytes(), b"a");

        let hashes: Vec<_> = archive.iter().map(File::hash).collect();
        assert!(hashes.windows(2).all(|pair| pair[0] < pair[1]));
        Ok(())
    }

    #[test]
    fn oversized_files_are_rejected_at_construction() -> anyhow::Result<()> {
        // lazily committed pages, so only address space is consumed
        let Ok(mapping) = memmap2::MmapOptions::new().len(0x8000_0000).map_anon() else {
            return Ok(());
        };

        let result = File::from_borrowed(BStr::new(b"huge.bin"), &mapping[..]);
        assert!(matches!(result, Err(Error::SizeOverflow)));
        Ok(())
    }

    #[test]
    fn overflowing_layouts_leave_the_archive_unchanged() -> anyhow::Result<()> {
        let Ok(mapping) = memmap2::MmapOptions::new().len(0x4800_0000).map_anon() else {
            return Ok(());
        };

        let mut archive = Archive::new();
        assert!(archive.insert(File::from_borrowed(BStr::new(b"a.bin"), &mapping[..])?)?);
        assert!(archive.insert(File::from_borrowed(BStr::new(b"b.bin"), &mapping[..])?)?);

        // a third file would push some payload offset past the signed ceiling
        let result = archive.insert(File::from_borrowed(BStr::new(b"c.bin"), &mapping[..])?);
        assert!(matches!(result, Err(Error::SizeOverflow)));
        assert_eq!(archive.len(), 2);
        assert!(archive.find(BStr::new(b"c.bin"))?.is_none());
        Ok(())
    }

    #[test]
    fn corrupt_hashes_are_reported_not_fatal() -> anyhow::Result<()> {
        let mut fixture = single_entry_fixture()?;
        let hashes_at = fixture.len() - 12;
        fixture[hashes_at] ^= 0xFF; // clobber the stored hash

        let archive = Archive::read(&fixture)?;
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.verify_hashes(), 1);
        Ok(())
    }
}
