//! silkpatch - KiCad silkscreen normalizer and JLCPCB parts database fetcher
//!
//! The `normalize` side rewrites silkscreen text in KiCad layout files in
//! place; the `fetch` side downloads and unpacks the parts database.

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod normalizer;
pub mod progress;
pub mod record;
pub mod rules;

pub use config::{Config, Task};
pub use fetch::Fetcher;
pub use normalizer::Normalizer;
