//! File-facing modules: codecs, pattern matching and delimited text.

pub mod compression;
pub mod glob;
pub mod text;
