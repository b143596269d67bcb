use memmap2::Mmap;
use std::sync::Arc;

enum Inner<'bytes> {
    Owned(Vec<u8>),
    Borrowed(&'bytes [u8]),
    Mapped {
        pos: usize,
        len: usize,
        mapping: Arc<Mmap>,
    },
}

/// A payload byte range, addressed without copying out of its backing store.
///
/// The backing store is either a buffer the container owns, a slice borrowed
/// from the caller, or a subrange of a shared memory mapping kept alive for
/// as long as any range into it exists.
pub struct Bytes<'bytes> {
    inner: Inner<'bytes>,
}

impl<'bytes> Bytes<'bytes> {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.inner {
            Inner::Owned(bytes) => bytes,
            Inner::Borrowed(bytes) => bytes,
            Inner::Mapped { pos, len, mapping } => &mapping[*pos..*pos + *len],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Owned(bytes) => bytes.len(),
            Inner::Borrowed(bytes) => bytes.len(),
            Inner::Mapped { len, .. } => *len,
        }
    }

    /// Detaches the range from its backing store, copying if necessary.
    #[must_use]
    pub fn into_owned(self) -> Bytes<'static> {
        Bytes {
            inner: match self.inner {
                Inner::Owned(bytes) => Inner::Owned(bytes),
                Inner::Borrowed(bytes) => Inner::Owned(bytes.to_owned()),
                Inner::Mapped { pos, len, mapping } => {
                    Inner::Owned(mapping[pos..pos + len].to_owned())
                }
            },
        }
    }

    #[must_use]
    pub(crate) fn from_borrowed(bytes: &'bytes [u8]) -> Self {
        Self {
            inner: Inner::Borrowed(bytes),
        }
    }

    #[must_use]
    pub(crate) fn from_owned(bytes: Vec<u8>) -> Self {
        Self {
            inner: Inner::Owned(bytes),
        }
    }

    #[must_use]
    pub(crate) fn from_mapped(pos: usize, len: usize, mapping: Arc<Mmap>) -> Self {
        Self {
            inner: Inner::Mapped { pos, len, mapping },
        }
    }
}

impl Default for Bytes<'_> {
    fn default() -> Self {
        Self {
            inner: Inner::Owned(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Bytes;

    #[test]
    fn default_state() {
        let bytes = Bytes::default();
        assert!(bytes.is_empty());
        assert_eq!(bytes.len(), 0);
        assert!(bytes.as_bytes().is_empty());
    }

    #[test]
    fn borrowed_and_owned() {
        let payload = [1u8, 2, 3, 4];
        let borrowed = Bytes::from_borrowed(&payload);
        assert_eq!(borrowed.as_bytes(), &payload);
        assert_eq!(borrowed.as_bytes().as_ptr(), payload.as_ptr());

        let owned = borrowed.into_owned();
        assert_eq!(owned.as_bytes(), &payload);
        assert_ne!(owned.as_bytes().as_ptr(), payload.as_ptr());
    }
}
