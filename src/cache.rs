//! The front door: both memory tiers unified with the disk store.

use crate::{
    disk::{scratch, DiskPayload, DiskStore, PutResponse},
    item::{CacheKind, Item},
    memory::MemoryCache,
    Config,
};
use std::{borrow::Cow, io::Read, sync::Arc};

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("compressed payload but no decompressor in the read context")]
    DecompressorMissing,
}

pub type DecompressFn = dyn Fn(&[u8], usize) -> Vec<u8> + Sync;
pub type PostProcessFn = dyn Fn(&[u8]) -> Vec<u8> + Sync;

/// Caller-supplied transform pipeline for a single read.
///
/// `decompressor` receives the raw payload and its declared size and
/// returns the expanded bytes; it is required whenever the payload on
/// disk is compressed. `post_processor` runs on the (possibly
/// decompressed) bytes. `converted_size` overrides the item size after
/// post-processing; it must not exceed the post-processor's output
/// length.
#[derive(Default, Clone, Copy)]
pub struct ReadContext<'a> {
    pub decompressor: Option<&'a DecompressFn>,
    pub post_processor: Option<&'a PostProcessFn>,
    pub converted_size: Option<usize>,
}

/// Read-through / write-through façade over one disk store and one
/// memory tier per payload kind.
pub struct Cache {
    disk: DiskStore,
    pixels: MemoryCache<Arc<Item>>,
    strings: MemoryCache<Arc<Item>>,
}

impl Cache {
    pub fn new(config: &Config) -> Cache {
        Cache {
            disk: DiskStore::new(config),
            pixels: MemoryCache::new(config.pixel_capacity_bytes()),
            strings: MemoryCache::new(config.string_capacity_bytes()),
        }
    }

    fn tier(&self, kind: CacheKind) -> &MemoryCache<Arc<Item>> {
        match kind {
            CacheKind::Pixels => &self.pixels,
            CacheKind::String => &self.strings,
        }
    }

    /// Reads an item through both tiers.
    ///
    /// A memory hit is returned as-is (promoted, untransformed). On a
    /// disk hit the context pipeline runs and the resulting item,
    /// re-homed into an owned buffer, is inserted into
    /// the kind's memory tier before being returned. Without a context
    /// the payload is promoted to an owned buffer verbatim, which is
    /// the path for data that needs no decoding.
    ///
    /// Disk trouble never surfaces here; a failed read behaves like a
    /// miss.
    pub fn get(
        &self,
        kind: CacheKind,
        top_level_id: &str,
        cache_id: &str,
        context: Option<&ReadContext>,
    ) -> Result<Option<Arc<Item>>, CacheError> {
        if let Some(item) = self.tier(kind).get(cache_id) {
            return Ok(Some(item));
        }

        scratch::with(|buffer| {
            let payload = match self.disk.get(kind, top_level_id, cache_id, buffer) {
                Some(payload) => payload,
                None => return Ok(None),
            };

            let item = match context {
                Some(context) => self.transform(kind, payload, context)?,
                None => Item::with_parts(
                    kind,
                    payload.data.into_owned().into_boxed_slice(),
                    payload.size,
                    payload.compressed,
                ),
            };

            let item = Arc::new(item);
            self.tier(kind).add(cache_id, item.clone());
            Ok(Some(item))
        })
    }

    /// Runs the read pipeline on a payload fresh off the disk and
    /// re-homes it into an exclusively owned buffer.
    fn transform(
        &self,
        kind: CacheKind,
        payload: DiskPayload,
        context: &ReadContext,
    ) -> Result<Item, CacheError> {
        let mut data = payload.data;
        let mut size = payload.size;
        let mut compressed = payload.compressed;

        if compressed {
            let decompressor = context
                .decompressor
                .ok_or(CacheError::DecompressorMissing)?;
            data = Cow::Owned(decompressor(&data, size));
            size = data.len();
            compressed = false;
        }

        if let Some(post_processor) = context.post_processor {
            data = Cow::Owned(post_processor(&data));
            if let Some(converted) = context.converted_size {
                size = converted;
            }
        }

        // `data` may still point into the thread-local scratch or at a
        // transform output the caller owns; neither may be retained.
        // Recycle an evictee's buffer of exactly matching size when the
        // tier is about to push one out anyway.
        let recycled = self
            .tier(kind)
            .pop_oldest_if_matches(size)
            .and_then(|evicted| Arc::try_unwrap(evicted).ok())
            .map(Item::into_payload)
            .filter(|buffer| buffer.len() == size);

        let mut buffer = recycled.unwrap_or_else(|| vec![0u8; size].into_boxed_slice());
        buffer[..size].copy_from_slice(&data[..size]);

        Ok(Item::with_parts(kind, buffer, size, compressed))
    }

    /// Write-through for pixel payloads.
    ///
    /// When the disk tier is disabled the item is kept in the pixel
    /// memory tier instead, so the data is not lost; `InvalidData` and
    /// `Error` never trigger that fallback. The disk response is
    /// returned verbatim either way.
    pub fn put(&self, top_level_id: &str, cache_id: &str, item: Item) -> PutResponse {
        match self.disk.put_bytes(top_level_id, cache_id, &item) {
            PutResponse::Disabled => {
                self.pixels.add(cache_id, Arc::new(item));
                PutResponse::Disabled
            }
            response => response,
        }
    }

    /// Streams a pixel payload to disk. Stream-only data has no owned
    /// buffer to keep, so there is no memory fallback.
    pub fn put_stream(
        &self,
        top_level_id: &str,
        cache_id: &str,
        source: &mut dyn Read,
        compressed: bool,
    ) -> PutResponse {
        self.disk
            .put_stream(top_level_id, cache_id, source, compressed)
    }

    /// Writes a text payload to disk. No memory fallback.
    pub fn put_string(&self, top_level_id: &str, cache_id: &str, item: Item) -> PutResponse {
        self.disk.put_string(top_level_id, cache_id, &item)
    }

    /// Inserts directly into the pixel memory tier; the disk is not
    /// involved.
    pub fn put_memory(&self, cache_id: &str, item: Item) {
        self.pixels.add(cache_id, Arc::new(item));
    }

    /// Memory-only lookup; never escalates to disk.
    pub fn get_memory(&self, kind: CacheKind, cache_id: &str) -> Option<Arc<Item>> {
        self.tier(kind).get(cache_id)
    }

    pub fn is_cached_to_disk(&self, kind: CacheKind, top_level_id: &str, cache_id: &str) -> bool {
        self.disk.is_cached(kind, top_level_id, cache_id)
    }

    pub fn clear_cached_to_disk(&self, cache_id: &str) {
        self.disk.clear_is_cached(cache_id);
    }

    pub fn clear_from_memory(&self, kind: CacheKind, cache_id: &str) -> bool {
        self.tier(kind).remove(cache_id)
    }

    pub fn clear_memory(&self, kind: CacheKind) {
        self.tier(kind).clear();
    }

    /// File names cached on disk under one top-level id.
    pub fn cached_files(&self, top_level_id: &str) -> Vec<String> {
        self.disk.enumerate(top_level_id)
    }

    #[inline]
    pub fn disk_enabled(&self) -> bool {
        self.disk.is_enabled()
    }
}
