//! Shared utilities for backplane.
//!
//! This crate holds the small pure pieces every other backplane crate leans
//! on: the virtual path normalizer, client-side environment variable
//! expansion for setup scripts, and short id generation.

pub mod env;
pub mod id;
pub mod vpath;

pub use env::{expand_env, expand_env_with};
pub use id::short_id;
pub use vpath::{is_ancestor, is_host_absolute, normalize, normalize_within, VPathError};
