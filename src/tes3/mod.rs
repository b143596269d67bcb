//! TES III: Morrowind
//!
//! The first generation of the format, and the simplest: a flat list of
//! files indexed by a 64-bit split hash, with no compression and no
//! directory structure beyond what the hashed names encode. It is the only
//! dialect this crate can write back out.
//!
//! # Reading
//! ```rust,no_run
//! use bsakit::{tes3::Archive, BStr};
//!
//! fn example() -> bsakit::Result<()> {
//!     let archive = Archive::open("path/to/morrowind/Data Files/Morrowind.bsa")?;
//!     if let Some(file) = archive.find(BStr::new(b"icons/gold.dds"))? {
//!         let _ = file.as_bytes();
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Writing
//! ```rust,no_run
//! use bsakit::{
//!     tes3::{Archive, File},
//!     BStr,
//! };
//! use std::fs;
//!
//! fn example() -> bsakit::Result<()> {
//!     let file = File::from_owned(BStr::new(b"hello.txt"), b"Hello world!\n".to_vec())?;
//!     let mut archive = Archive::new();
//!     archive.insert(file)?;
//!     let mut dst = fs::File::create("example.bsa")?;
//!     archive.write(&mut dst)?;
//!     Ok(())
//! }
//! ```

mod archive;
mod file;
mod hashing;

pub use self::{
    archive::Archive,
    file::File,
    hashing::{hash_file, FileHash},
};

/// Sizes and offsets stored by this dialect must fit a signed 32-bit field.
pub(crate) const MAX_INT32: usize = i32::MAX as usize;
