//! Jdelta: binary differencing with compact JDF patches.
//!
//! Given a *source* and a *destination* byte stream, the differ emits a patch
//! from which the destination can be rebuilt out of the source alone. The
//! crate provides:
//! - A buffered random-access byte source abstraction (`source`)
//! - The rolling-hash indexer and match table (`hash`)
//! - The differ driver (`engine`)
//! - The JDF patch codec: writer and applier (`jdf`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use jdelta::engine::{self, DiffOptions};
//! use jdelta::jdf::patcher;
//!
//! let source = b"hello old world";
//! let dest = b"hello new world";
//!
//! let opts = DiffOptions::default();
//! let patch = engine::diff_bytes(source, dest, &opts).unwrap();
//! let rebuilt = patcher::apply_bytes(source, &patch).unwrap();
//! assert_eq!(rebuilt, dest);
//! ```

pub mod config;
pub mod engine;
pub mod hash;
pub mod io;
pub mod jdf;
pub mod source;

#[cfg(feature = "cli")]
pub mod cli;
