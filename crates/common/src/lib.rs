//! Shared types, error definitions, and utilities used across all ribbon crates.

pub mod context;
pub mod error;

pub use {
    context::SessionContext,
    error::{Error, Result},
};
