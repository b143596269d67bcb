//! TES IV: Oblivion
//!
//! The format that carried Oblivion, Fallout 3, Fallout: New Vegas, and both
//! editions of Skyrim. Unlike the other dialects it splits its index in two:
//! directories are hashed over their whole path, and each directory carries
//! its own hash-keyed list of files. This dialect is read-only here.
//!
//! ```rust,no_run
//! use bsakit::{tes4::Archive, BStr};
//!
//! fn example() -> bsakit::Result<()> {
//!     let archive = Archive::open("path/to/oblivion/Data/Oblivion - Voices2.bsa")?;
//!     let file = archive
//!         .find(BStr::new(b"sound/voice/oblivion.esm/imperial/m"))?
//!         .and_then(|directory| {
//!             directory
//!                 .find(BStr::new(b"testtoddquest_testtoddhappy_00027fa2_1.mp3"))
//!                 .ok()
//!                 .flatten()
//!         });
//!     if let Some(file) = file {
//!         let _ = (file.is_compressed(), file.as_bytes());
//!     }
//!     Ok(())
//! }
//! ```

mod archive;
mod directory;
mod file;
mod hashing;

pub use self::{
    archive::{Archive, Flags as ArchiveFlags, Types as ArchiveTypes},
    directory::Directory,
    file::File,
    hashing::{hash_directory, hash_file, Hash},
};

/// The archive version, which shifts the on-disk geometry of the index.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Version {
    #[default]
    v103 = 103,
    v104 = 104,
    v105 = 105,
}

impl Version {
    /// The Elder Scrolls IV: Oblivion.
    pub const TES4: Self = Self::v103;
    /// Fallout 3.
    pub const FO3: Self = Self::v104;
    /// Fallout: New Vegas.
    pub const FNV: Self = Self::v104;
    /// The Elder Scrolls V: Skyrim.
    pub const TES5: Self = Self::v104;
    /// The Elder Scrolls V: Skyrim - Special Edition.
    pub const SSE: Self = Self::v105;
}
