//! Serialization primitives shared by the binary formats.

pub mod encoding;
