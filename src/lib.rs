//! Typed environment variables with defaults, and a small `.env` loader.
//!
//! [`EnvStore`] caches one entry per key and exposes typed getters:
//!
//! ```
//! use genv::{EnvStore, TargetEnv};
//!
//! let mut store = EnvStore::new(TargetEnv::memory());
//! let port = store.key("PORT").default(8080).int().unwrap();
//! assert_eq!(port, 8080);
//! ```
//!
//! [`EnvLoader::load`] is the safe default and writes into a process-isolated
//! in-memory map. The process loaders (`dotenv`, `from_path`, `from_paths`,
//! `from_filename`, `autoload`) mutate the process environment and are
//! `unsafe`, because callers must guarantee no concurrent process-environment
//! access.

mod env;
mod error;
mod loader;
mod model;
mod parser;
mod store;

pub use env::TargetEnv;
pub use error::Error;
pub use loader::{EnvLoader, autoload, dotenv, from_filename, from_path, from_paths};
pub use model::{ConversionMode, Entry, LoadReport, Value, ValueKind};
pub use parser::{parse_bytes, parse_reader, parse_str};
pub use store::{EnvStore, EnvVar, Key};
