//! CFG configuration file reader.
//!
//! Each line is a `name=value` pair; lines starting with `#` or `!` are
//! comments, and `testLine=...` is a debug probe that's parsed but never
//! stored. Every value is eagerly parsed three ways (int, double, string)
//! since the file format itself carries no type information.

mod error;
mod reader;
mod setting;

pub use error::ConfigError;
pub use reader::Settings;
