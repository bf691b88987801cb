#![deny(clippy::all)]

//! Embedded two-tier content cache for opaque binary payloads.
//!
//! A byte-budgeted in-memory LRU tier sits in front of a persistent
//! directory-backed tier; [`Cache`] composes them into a single
//! read-through / write-through front door with an optional
//! decompression and post-processing pipeline on reads.

#[macro_use]
extern crate serde_derive;

pub mod cache;
pub mod config;
pub mod disk;
pub mod item;
pub mod memory;

pub use cache::{Cache, CacheError, ReadContext};
pub use config::{Config, ConfigError};
pub use disk::{DiskPayload, DiskStore, PutResponse};
pub use item::{ByteSized, CacheKind, Item};
pub use memory::MemoryCache;

// Disk IO happens in chunks of at most this many bytes
const CHUNK_SIZE: usize = 4096;
