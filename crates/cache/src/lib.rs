//! Cache Store: content hashing and persisted component trees.

pub mod artifacts;
pub mod error;
pub mod hash;
pub mod store;

pub use {
    artifacts::{FORMAT_VERSION, artifact_key},
    error::{Error, Result},
    hash::dir_hash,
    store::CacheStore,
};
