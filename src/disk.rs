//! Directory-backed persistent tier.
//!
//! Payloads live under `${root}/${top_level_id}/${cache_id}${suffix}`,
//! where the suffix encodes the payload kind and compression flag:
//! `.p` uncompressed pixels, `.cp` codec-compressed pixels, `.s`
//! gzip-compressed text. Files are written once with create-new
//! semantics and never updated in place.

use crate::{
    config::Config,
    item::{CacheKind, Item},
};
use flate2::{write::GzEncoder, Compression};
use std::{
    borrow::Cow,
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

mod keylock;
pub(crate) mod scratch;
mod status;

use keylock::KeyLocks;
use status::{StatusEntry, StatusRepository};

/// Outcome of a write to the disk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResponse {
    Success,
    /// The disk tier is off for this store's lifetime.
    Disabled,
    /// Empty key or empty payload.
    InvalidData,
    /// IO failure; details are logged at debug level.
    Error,
}

/// A payload read back from disk.
///
/// Pixel reads borrow the scratch buffer supplied by the caller, so the
/// data is only valid until that buffer is reused; it must be copied
/// into an owned buffer before being retained. String reads are owned.
pub struct DiskPayload<'a> {
    pub data: Cow<'a, [u8]>,
    /// The file length in bytes.
    pub size: usize,
    pub compressed: bool,
}

/// The persistent tier.
///
/// Construction never fails: when the configuration turns the tier
/// off, the root is unusable, or the root directory cannot be created,
/// the store comes up *disabled* for its whole lifetime. A disabled
/// store logs once at error level and then silently answers `Disabled`
/// / `None` / `false`.
pub struct DiskStore {
    root: Option<PathBuf>,
    status: StatusRepository,
    locks: KeyLocks,
}

impl DiskStore {
    pub fn new(config: &Config) -> DiskStore {
        DiskStore {
            root: resolve_root(config),
            status: StatusRepository::default(),
            locks: KeyLocks::default(),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Writes a pixel payload with create-new semantics.
    ///
    /// Callers that want to replace an existing file must clear it
    /// first; a colliding write returns [`PutResponse::Error`].
    pub fn put_bytes(&self, top_level_id: &str, cache_id: &str, item: &Item) -> PutResponse {
        let Some(root) = &self.root else {
            return PutResponse::Disabled;
        };
        if top_level_id.is_empty()
            || cache_id.is_empty()
            || item.payload().is_empty()
            || item.kind() != CacheKind::Pixels
        {
            return PutResponse::InvalidData;
        }

        let lock = self.locks.acquire(cache_id);
        let _guard = lock.write();

        let path = target_path(
            root,
            top_level_id,
            cache_id,
            item.kind().suffix(item.is_compressed()),
        );

        match ensure_dir(&path).and_then(|()| write_chunked(&path, item.payload())) {
            Ok(()) => {
                self.status
                    .put(cache_id, StatusEntry::present(item.is_compressed(), path));
                PutResponse::Success
            }
            Err(err) => {
                log::debug!("put failed; path={}, err={}", path.display(), err);
                PutResponse::Error
            }
        }
    }

    /// As [`put_bytes`](Self::put_bytes), with a streaming pixel source
    /// copied through in 4 KiB chunks.
    pub fn put_stream(
        &self,
        top_level_id: &str,
        cache_id: &str,
        source: &mut dyn Read,
        compressed: bool,
    ) -> PutResponse {
        let Some(root) = &self.root else {
            return PutResponse::Disabled;
        };
        if top_level_id.is_empty() || cache_id.is_empty() {
            return PutResponse::InvalidData;
        }

        let lock = self.locks.acquire(cache_id);
        let _guard = lock.write();

        let path = target_path(
            root,
            top_level_id,
            cache_id,
            CacheKind::Pixels.suffix(compressed),
        );

        match ensure_dir(&path).and_then(|()| copy_stream(&path, source)) {
            Ok(_written) => {
                self.status
                    .put(cache_id, StatusEntry::present(compressed, path));
                PutResponse::Success
            }
            Err(err) => {
                log::debug!("put failed; path={}, err={}", path.display(), err);
                PutResponse::Error
            }
        }
    }

    /// Writes a text payload, gzip-compressing it on the fly.
    pub fn put_string(&self, top_level_id: &str, cache_id: &str, item: &Item) -> PutResponse {
        let Some(root) = &self.root else {
            return PutResponse::Disabled;
        };
        if top_level_id.is_empty()
            || cache_id.is_empty()
            || item.payload().is_empty()
            || item.kind() != CacheKind::String
        {
            return PutResponse::InvalidData;
        }

        let lock = self.locks.acquire(cache_id);
        let _guard = lock.write();

        let path = target_path(root, top_level_id, cache_id, CacheKind::String.suffix(true));

        match ensure_dir(&path).and_then(|()| write_gzip(&path, item.payload())) {
            Ok(()) => {
                self.status.put(cache_id, StatusEntry::present(true, path));
                PutResponse::Success
            }
            Err(err) => {
                log::debug!("put failed; path={}, err={}", path.display(), err);
                PutResponse::Error
            }
        }
    }

    /// Reads a payload back.
    ///
    /// Pixels land in `scratch` and the result borrows it; strings come
    /// back freshly allocated. Any IO failure invalidates the status
    /// entry for this key and surfaces as `None`, so a file deleted
    /// behind the store's back self-heals on the next probe.
    pub fn get<'buf>(
        &self,
        kind: CacheKind,
        top_level_id: &str,
        cache_id: &str,
        scratch: &'buf mut Vec<u8>,
    ) -> Option<DiskPayload<'buf>> {
        let root = self.root.as_deref()?;
        if cache_id.is_empty() {
            return None;
        }
        if !self.is_cached(kind, top_level_id, cache_id) {
            return None;
        }

        let entry = self.status.get(cache_id)?;
        if !entry.present {
            return None;
        }
        let path = entry
            .path
            .unwrap_or_else(|| target_path(root, top_level_id, cache_id, kind.suffix(entry.compressed)));

        let lock = self.locks.acquire(cache_id);
        let _guard = lock.read();

        let result = match kind {
            CacheKind::Pixels => read_pixels(&path, scratch, entry.compressed),
            CacheKind::String => read_string(&path, entry.compressed),
        };

        match result {
            Ok(payload) => Some(payload),
            Err(err) => {
                log::debug!("read failed; path={}, err={}", path.display(), err);
                self.status.invalidate(cache_id);
                None
            }
        }
    }

    /// Whether a backing file exists for this key.
    ///
    /// A memoized positive answer returns immediately; otherwise the
    /// disk is probed under the per-key read lock and the result is
    /// memoized whether positive or negative. Negative entries do not
    /// short-circuit, so a file that appears later is still found.
    pub fn is_cached(&self, kind: CacheKind, top_level_id: &str, cache_id: &str) -> bool {
        let Some(root) = &self.root else {
            return false;
        };
        if cache_id.is_empty() {
            return false;
        }

        if let Some(entry) = self.status.get(cache_id) {
            if entry.present {
                return true;
            }
        }

        let lock = self.locks.acquire(cache_id);
        let _guard = lock.read();

        let entry = match kind {
            CacheKind::Pixels => {
                let packed = target_path(root, top_level_id, cache_id, kind.suffix(true));
                let plain = target_path(root, top_level_id, cache_id, kind.suffix(false));
                if packed.is_file() {
                    StatusEntry::present(true, packed)
                } else if plain.is_file() {
                    StatusEntry::present(false, plain)
                } else {
                    StatusEntry::absent()
                }
            }
            CacheKind::String => {
                let path = target_path(root, top_level_id, cache_id, kind.suffix(true));
                if path.is_file() {
                    StatusEntry::present(true, path)
                } else {
                    StatusEntry::absent()
                }
            }
        };

        let present = entry.present;
        self.status.put(cache_id, entry);
        present
    }

    /// Drops the memoized status for this key. The backing file stays
    /// on disk, so the next `put` for the key collides with it and
    /// returns [`PutResponse::Error`]; this tier is write-once by key.
    pub fn clear_is_cached(&self, cache_id: &str) {
        if self.root.is_none() {
            return;
        }
        self.status.invalidate(cache_id);
    }

    /// File names under one top-level subdirectory. Best-effort; IO
    /// errors log and yield an empty listing.
    pub fn enumerate(&self, top_level_id: &str) -> Vec<String> {
        let Some(root) = &self.root else {
            return Vec::new();
        };

        match fs::read_dir(root.join(top_level_id)) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(err) => {
                log::debug!("enumerate failed; top_level={}, err={}", top_level_id, err);
                Vec::new()
            }
        }
    }
}

fn resolve_root(config: &Config) -> Option<PathBuf> {
    if !config.disk_cache_enabled {
        log::error!("disk cache disabled by configuration");
        return None;
    }

    let root = &config.disk_cache_root_folder;
    if root.as_os_str().is_empty() {
        log::error!("disk cache disabled; no root folder configured");
        return None;
    }

    #[cfg(windows)]
    {
        use std::path::Component;
        if !matches!(root.components().next(), Some(Component::Prefix(_))) {
            log::error!(
                "disk cache disabled; root folder {} has no drive prefix",
                root.display()
            );
            return None;
        }
    }

    if let Err(err) = fs::create_dir_all(root) {
        log::error!(
            "disk cache disabled; cannot create root {}: {}",
            root.display(),
            err
        );
        return None;
    }

    Some(root.clone())
}

fn target_path(root: &Path, top_level_id: &str, cache_id: &str, suffix: &str) -> PathBuf {
    root.join(top_level_id)
        .join(format!("{}{}", cache_id, suffix))
}

fn ensure_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn create_new(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}

fn write_chunked(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = create_new(path)?;
    for chunk in payload.chunks(crate::CHUNK_SIZE) {
        file.write_all(chunk)?;
    }
    Ok(())
}

fn write_gzip(path: &Path, payload: &[u8]) -> io::Result<()> {
    let file = create_new(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    for chunk in payload.chunks(crate::CHUNK_SIZE) {
        encoder.write_all(chunk)?;
    }
    encoder.finish()?;
    Ok(())
}

fn copy_stream(path: &Path, source: &mut dyn Read) -> io::Result<u64> {
    let mut file = create_new(path)?;
    let mut chunk = [0u8; crate::CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let read = source.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        file.write_all(&chunk[..read])?;
        written += read as u64;
    }

    Ok(written)
}

fn read_pixels<'buf>(
    path: &Path,
    scratch: &'buf mut Vec<u8>,
    compressed: bool,
) -> io::Result<DiskPayload<'buf>> {
    let mut file = fs::File::open(path)?;
    let size = file.metadata()?.len() as usize;

    scratch::reserve(scratch, size);
    file.read_exact(&mut scratch[..size])?;

    Ok(DiskPayload {
        data: Cow::Borrowed(&scratch[..size]),
        size,
        compressed,
    })
}

fn read_string(path: &Path, compressed: bool) -> io::Result<DiskPayload<'static>> {
    let data = fs::read(path)?;

    Ok(DiskPayload {
        size: data.len(),
        data: Cow::Owned(data),
        compressed,
    })
}
