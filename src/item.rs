//! The value type shared by both cache tiers.

use std::sync::Arc;

/// Selects the on-disk suffix, the memory tier, and the read
/// allocation strategy for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Pixels,
    String,
}

impl CacheKind {
    pub(crate) fn suffix(self, compressed: bool) -> &'static str {
        match self {
            CacheKind::Pixels => {
                if compressed {
                    ".cp"
                } else {
                    ".p"
                }
            }
            CacheKind::String => ".s",
        }
    }
}

/// Values that report their own byte footprint to a
/// [`MemoryCache`](crate::MemoryCache).
pub trait ByteSized {
    fn size(&self) -> usize;
}

impl<T: ByteSized> ByteSized for Arc<T> {
    #[inline(always)]
    fn size(&self) -> usize {
        self.as_ref().size()
    }
}

/// A cache entry: an exclusively owned payload, its declared size, a
/// compression flag and a kind tag.
///
/// The declared size may differ from the buffer length while an entry
/// moves through the read pipeline; entries resident in a memory tier
/// always have the two equal.
pub struct Item {
    data: Box<[u8]>,
    size: usize,
    compressed: bool,
    kind: CacheKind,
}

impl Item {
    /// A pixel payload, compressed or not. Size is the buffer length.
    pub fn pixels(data: impl Into<Box<[u8]>>, compressed: bool) -> Item {
        let data = data.into();
        Item {
            size: data.len(),
            compressed,
            kind: CacheKind::Pixels,
            data,
        }
    }

    /// A UTF-8 text payload. Size is the byte length of the text.
    pub fn string(text: impl Into<String>) -> Item {
        let data = text.into().into_bytes().into_boxed_slice();
        Item {
            size: data.len(),
            compressed: false,
            kind: CacheKind::String,
            data,
        }
    }

    pub(crate) fn with_parts(
        kind: CacheKind,
        data: Box<[u8]>,
        size: usize,
        compressed: bool,
    ) -> Item {
        Item {
            data,
            size,
            compressed,
            kind,
        }
    }

    #[inline(always)]
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    #[inline(always)]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    #[inline(always)]
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Surrenders the backing buffer, e.g. for recycling.
    pub fn into_payload(self) -> Box<[u8]> {
        self.data
    }
}

impl ByteSized for Item {
    #[inline(always)]
    fn size(&self) -> usize {
        self.size
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("compressed", &self.compressed)
            .finish()
    }
}
