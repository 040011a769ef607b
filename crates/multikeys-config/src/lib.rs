//! Configuration parsing for multikeys
//!
//! This crate parses the KDL configuration file into per-device remap entries
//! that `multikeys-core` builds its tables from.

mod error;
mod model;
mod parser;

pub use error::{ConfigError, EntryProblem, SourceLocation};
pub use model::*;
pub use parser::{parse_config, parse_config_str};
