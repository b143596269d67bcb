use crate::containers::Bytes;
use bstr::{BStr, BString};
use core::{
    marker::PhantomData,
    ops::{Deref, DerefMut, Range},
};
use memmap2::{Mmap, MmapOptions};
use std::{
    fs::File,
    io::{self, Write},
    sync::Arc,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Endian {
    Little,
    Big,
}

/// A fixed-width integer that can cross a byte stream in either endianness.
pub(crate) trait Binary: Copy {
    fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self>
    where
        In: ?Sized + Source<'bytes>;

    fn to_stream<Out>(self, stream: &mut Out, endian: Endian) -> io::Result<()>
    where
        Out: ?Sized + Write;
}

macro_rules! make_binary {
    ($t:ty) => {
        impl Binary for $t {
            fn from_stream<'bytes, In>(stream: &mut In, endian: Endian) -> io::Result<Self>
            where
                In: ?Sized + Source<'bytes>,
            {
                let mut bytes = [0u8; core::mem::size_of::<$t>()];
                stream.read_into(&mut bytes)?;
                Ok(match endian {
                    Endian::Little => <$t>::from_le_bytes(bytes),
                    Endian::Big => <$t>::from_be_bytes(bytes),
                })
            }

            fn to_stream<Out>(self, stream: &mut Out, endian: Endian) -> io::Result<()>
            where
                Out: ?Sized + Write,
            {
                let bytes = match endian {
                    Endian::Little => self.to_le_bytes(),
                    Endian::Big => self.to_be_bytes(),
                };
                stream.write_all(&bytes)
            }
        }
    };
}

make_binary!(u8);
make_binary!(u16);
make_binary!(u32);
make_binary!(u64);
make_binary!(i8);

pub(crate) trait Source<'bytes> {
    fn as_bytes(&self) -> &[u8];

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Hands out a byte range at an absolute position without touching the
    /// cursor.
    fn subspan(&self, pos: usize, len: usize) -> io::Result<Bytes<'bytes>>;

    fn seek_absolute(&mut self, pos: usize) -> io::Result<()>;

    #[must_use]
    fn stream_position(&self) -> usize;

    #[must_use]
    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn seek_relative(&mut self, offset: isize) -> io::Result<()> {
        if let Some(pos) = self.stream_position().checked_add_signed(offset) {
            self.seek_absolute(pos)
        } else {
            Err(io::ErrorKind::UnexpectedEof.into())
        }
    }

    fn read<T>(&mut self, endian: Endian) -> io::Result<T>
    where
        T: Binary,
        Self: Sized,
    {
        T::from_stream(self, endian)
    }

    /// Reads a NUL-terminated string, discarding the terminator.
    fn read_zstring(&mut self) -> io::Result<BString>
    where
        Self: Sized,
    {
        let mut result = Vec::new();
        loop {
            let byte: u8 = self.read(Endian::Little)?;
            match byte {
                0 => break,
                byte => result.push(byte),
            };
        }

        result.shrink_to_fit();
        Ok(result.into())
    }

    /// Reads a string prefixed by a `u8` length which counts the trailing
    /// NUL terminator.
    fn read_bzstring(&mut self) -> io::Result<BString>
    where
        Self: Sized,
    {
        let len: u8 = self.read(Endian::Little)?;
        if len == 0 {
            return Ok(BString::default());
        }

        let mut result = vec![0u8; len.into()];
        self.read_into(&mut result[..])?;
        match result.pop() {
            Some(b'\0') => {
                result.shrink_to_fit();
                Ok(result.into())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "postfix null terminator was missing from a string",
            )),
        }
    }

    /// Reads a string prefixed by a `u16` length, with no terminator.
    fn read_wstring(&mut self) -> io::Result<BString>
    where
        Self: Sized,
    {
        let len: u16 = self.read(Endian::Little)?;
        let mut result = vec![0u8; len.into()];
        self.read_into(&mut result[..])?;
        Ok(result.into())
    }

    /// Records the cursor; the returned guard restores it when dropped.
    fn checkpoint(&mut self) -> Checkpoint<'_, 'bytes, Self>
    where
        Self: Sized,
    {
        Checkpoint::new(self)
    }
}

/// Restores the source's cursor on scope exit, even on an early return.
pub(crate) struct Checkpoint<'stream, 'bytes, In>
where
    In: Source<'bytes>,
{
    stream: &'stream mut In,
    saved: usize,
    marker: PhantomData<&'bytes ()>,
}

impl<'stream, 'bytes, In> Checkpoint<'stream, 'bytes, In>
where
    In: Source<'bytes>,
{
    #[must_use]
    fn new(stream: &'stream mut In) -> Self {
        let saved = stream.stream_position();
        Self {
            stream,
            saved,
            marker: PhantomData,
        }
    }
}

impl<'stream, 'bytes, In> Deref for Checkpoint<'stream, 'bytes, In>
where
    In: Source<'bytes>,
{
    type Target = In;

    fn deref(&self) -> &Self::Target {
        self.stream
    }
}

impl<'stream, 'bytes, In> DerefMut for Checkpoint<'stream, 'bytes, In>
where
    In: Source<'bytes>,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stream
    }
}

impl<'stream, 'bytes, In> Drop for Checkpoint<'stream, 'bytes, In>
where
    In: Source<'bytes>,
{
    fn drop(&mut self) {
        // the saved position was valid when recorded, so this cannot fail
        let _ = self.stream.seek_absolute(self.saved);
    }
}

macro_rules! make_source {
    ($this:ty, $bytes_lifetime:lifetime $(,$this_lifetime:lifetime)?) => {
        impl $(<$this_lifetime>)? Source<$bytes_lifetime> for $this {
            fn as_bytes(&self) -> &[u8] {
                &self.source[..]
            }

            fn read_into(&mut self, buf: &mut [u8]) -> io::Result<()> {
                let start = self.pos;
                let stop = start
                    .checked_add(buf.len())
                    .filter(|&stop| stop <= self.source.len())
                    .ok_or(io::ErrorKind::UnexpectedEof)?;
                self.pos = stop;
                buf.copy_from_slice(&self.source[start..stop]);
                Ok(())
            }

            fn subspan(&self, pos: usize, len: usize) -> io::Result<Bytes<$bytes_lifetime>> {
                let stop = pos
                    .checked_add(len)
                    .filter(|&stop| stop <= self.source.len())
                    .ok_or(io::ErrorKind::UnexpectedEof)?;
                Ok(self.make_bytes(pos..stop))
            }

            fn seek_absolute(&mut self, pos: usize) -> io::Result<()> {
                if pos > self.source.len() {
                    Err(io::ErrorKind::UnexpectedEof.into())
                } else {
                    self.pos = pos;
                    Ok(())
                }
            }

            fn stream_position(&self) -> usize {
                self.pos
            }
        }
    };
}

pub(crate) struct BorrowedSource<'bytes> {
    source: &'bytes [u8],
    pos: usize,
}

impl<'bytes> BorrowedSource<'bytes> {
    #[must_use]
    fn make_bytes(&self, range: Range<usize>) -> Bytes<'bytes> {
        Bytes::from_borrowed(&self.source[range])
    }
}

impl<'bytes> From<&'bytes [u8]> for BorrowedSource<'bytes> {
    fn from(source: &'bytes [u8]) -> Self {
        Self { source, pos: 0 }
    }
}

make_source!(BorrowedSource<'bytes>, 'bytes, 'bytes);

pub(crate) struct MappedSource {
    source: Arc<Mmap>,
    pos: usize,
}

impl MappedSource {
    #[must_use]
    fn make_bytes(&self, range: Range<usize>) -> Bytes<'static> {
        Bytes::from_mapped(range.start, range.len(), self.source.clone())
    }
}

impl TryFrom<&File> for MappedSource {
    type Error = io::Error;

    fn try_from(value: &File) -> Result<Self, Self::Error> {
        let options = MmapOptions::new();
        let mapping = unsafe { options.map(value) }?;
        Ok(Self {
            source: Arc::new(mapping),
            pos: 0,
        })
    }
}

make_source!(MappedSource, 'static);

pub(crate) struct Sink<'stream, Out>
where
    Out: Write,
{
    stream: &'stream mut Out,
}

impl<'stream, Out> Sink<'stream, Out>
where
    Out: Write,
{
    #[must_use]
    pub(crate) fn new(stream: &'stream mut Out) -> Self {
        Self { stream }
    }

    pub(crate) fn write<T>(&mut self, value: T, endian: Endian) -> io::Result<()>
    where
        T: Binary,
    {
        T::to_stream(value, &mut self.stream, endian)
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    pub(crate) fn write_zstring(&mut self, string: &BStr) -> io::Result<()> {
        self.write_bytes(string)?;
        self.write_bytes(b"\0")
    }
}
