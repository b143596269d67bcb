use crate::fourcc;
use core::mem;
use std::io::Read;

/// An archive format generation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    /// TES III: Morrowind.
    Tes3,
    /// TES IV: Oblivion through TES V: Skyrim SE.
    Tes4,
    /// Fallout 4.
    Fo4,
}

const BSA: u32 = fourcc::pack(b"BSA");
const BTDX: u32 = fourcc::pack(b"BTDX");

/// Guesses the archive dialect from the leading magic.
///
/// Reads four bytes from the stream; the caller is responsible for rewinding.
pub fn guess_dialect<In>(source: &mut In) -> Option<Dialect>
where
    In: ?Sized + Read,
{
    let mut buf = [0u8; mem::size_of::<u32>()];
    source.read_exact(&mut buf).ok()?;
    let magic = u32::from_le_bytes(buf);
    match magic {
        0x100 => Some(Dialect::Tes3),
        BSA => Some(Dialect::Tes4),
        BTDX => Some(Dialect::Fo4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::{guess_dialect, Dialect};

    #[test]
    fn guess() {
        let tests: [(&[u8], Option<Dialect>); 5] = [
            (b"\x00\x01\x00\x00rest", Some(Dialect::Tes3)),
            (b"BSA\0rest", Some(Dialect::Tes4)),
            (b"BTDXrest", Some(Dialect::Fo4)),
            (b"ZIP!", None),
            (b"", None),
        ];

        for (magic, expected) in tests {
            let mut source = magic;
            assert_eq!(guess_dialect(&mut source), expected);
        }
    }
}
