//! Core library for the NAS content indexing pipeline.
//!
//! This crate contains the pipeline components described as "the core" of the
//! system: a path normalizer, a state-store client, a filesystem watcher with
//! its debounce/dedup discipline, an extractor worker, and a thumbnail worker.
//! It also exposes a thin HTTP client for the external search index and the
//! shared configuration/error types used throughout.
//!
//! The external collaborators (the state store itself and the search index
//! engine) are not part of this crate; only the clients that talk to them are.

pub mod config;
pub mod error;
pub mod event;
pub mod extractor;
pub mod hashing;
pub mod index_client;
pub mod path_normalizer;
pub mod state_store;
pub mod thumbnail;
pub mod volume;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{EventType, FileEvent};
pub use volume::Volume;
