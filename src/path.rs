use crate::{Error, Result};
use bstr::{BStr, BString};

#[must_use]
const fn build_lookup_table() -> [u8; 256] {
    let mut table = [0u8; u8::MAX as usize + 1];
    let mut i: u8 = 0;
    loop {
        table[i as usize] = i;
        match i {
            u8::MAX => break,
            _ => i += 1,
        };
    }

    table['/' as usize] = b'\\';

    let offset = b'a' - b'A';
    let mut i = b'A';
    loop {
        table[i as usize] = i + offset;
        match i {
            b'Z' => break,
            _ => i += 1,
        };
    }

    table
}

#[must_use]
fn map_byte(byte: u8) -> u8 {
    const LUT: [u8; 256] = build_lookup_table();
    LUT[byte as usize]
}

/// Produces the canonical form of a path used for hashing and storage.
///
/// Components are normalized lexically (`.` and empty components dropped,
/// `..` folded against its parent), separators become `\`, and ASCII letters
/// are lower-cased through a fixed table so the result never depends on the
/// runtime locale. The result carries no leading or trailing separator and
/// may be empty; callers decide what an empty path means for their hash.
///
/// Paths are hashed by indexing per-byte lookup tables, so any byte outside
/// the ASCII range is refused up front.
pub(crate) fn normalize(path: &BStr) -> Result<BString> {
    if path.iter().any(|&byte| byte >= 0x80) {
        return Err(Error::NonAsciiPath);
    }

    let mut components: Vec<&[u8]> = Vec::new();
    for component in path.split(|&byte| byte == b'/' || byte == b'\\') {
        match component {
            b"" | b"." => (),
            b".." => match components.last() {
                Some(&parent) if parent != b".." => {
                    components.pop();
                }
                _ => components.push(component),
            },
            _ => components.push(component),
        };
    }

    let mut result = Vec::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            result.push(b'\\');
        }
        result.extend(component.iter().copied().map(map_byte));
    }

    if result.len() >= 260 {
        result.clear();
        result.push(b'.');
    }

    Ok(result.into())
}
