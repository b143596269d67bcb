//! Fallout 4
//!
//! The latest generation of the format. Files are identified by a CRC pair
//! rather than a packed-byte hash, payloads are split into chunks so
//! textures can stream individual mip ranges, and every chunk record ends
//! with a fixed sentinel that doubles as a corruption check. This dialect is
//! read-only here.
//!
//! ```rust,no_run
//! use bsakit::{fo4::Archive, BStr};
//!
//! fn example() -> bsakit::Result<()> {
//!     let archive = Archive::open("path/to/fallout4/Data/Fallout4 - Interface.ba2")?;
//!     if let Some(file) = archive.find(BStr::new(b"Interface/HUDMenu.swf"))? {
//!         for chunk in file {
//!             let _ = (chunk.as_bytes(), chunk.decompressed_len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod archive;
mod chunk;
mod file;
mod hashing;

pub use self::{
    archive::Archive,
    chunk::Chunk,
    file::{Dx10Descriptor, File},
    hashing::{hash_file, Hash},
};

/// The kind of content an archive holds, from its header's format tag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    /// General purpose: any kind of file, one chunk list each.
    #[default]
    GNRL,

    /// Textures only, chunked by mip range.
    DX10,
}
