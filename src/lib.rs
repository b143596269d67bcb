#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

//! A library for reading the index structures of Bethesda game archives.
//!
//! Three generations of the format are supported: [`tes3`] (Morrowind, the
//! only writable dialect), [`tes4`] (Oblivion through Skyrim SE), and [`fo4`]
//! (Fallout 4, general and texture variants). Each dialect module exposes an
//! `Archive` which decodes the header, the directory/file index, and the
//! string tables, and hands out every entry's payload as an opaque byte range
//! backed by the source (a borrowed slice or a shared memory mapping).
//! Decompressing those payloads is the caller's concern.
//!
//! ```rust,no_run
//! use bsakit::tes3::Archive;
//!
//! fn example() -> bsakit::Result<()> {
//!     let archive = Archive::open("path/to/Morrowind.bsa")?;
//!     for file in &archive {
//!         let _ = (file.name(), file.hash().numeric(), file.as_bytes());
//!     }
//!     Ok(())
//! }
//! ```

mod containers;
pub mod fo4;
mod fourcc;
mod io;
mod path;
mod sniff;
pub mod tes3;
pub mod tes4;

pub use self::sniff::{guess_dialect, Dialect};
pub use bstr::{BStr, BString};

use core::num::TryFromIntError;
use std::io as std_io;

/// The error type shared by every fallible operation in the crate.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the file contained no data")]
    EmptyFile,

    #[error("the path was empty after normalization")]
    EmptyPath,

    #[error("invalid chunk sentinel: {0:#010X}")]
    InvalidChunkSentinel(u32),

    #[error("invalid content format read from archive header: {0:#010X}")]
    InvalidFormat(u32),

    #[error("invalid size read from archive header: {0}")]
    InvalidHeaderSize(u32),

    #[error("invalid magic read from archive header: {0:#010X}")]
    InvalidMagic(u32),

    #[error(transparent)]
    Io(#[from] std_io::Error),

    #[error("encountered a byte outside the ascii range while hashing a path")]
    NonAsciiPath,

    #[error("a size or offset would not fit within a signed 32-bit integer")]
    SizeOverflow,

    #[error("unsupported version read from archive header: {0}")]
    UnsupportedVersion(u32),
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::SizeOverflow
    }
}

pub type Result<T> = core::result::Result<T, Error>;
