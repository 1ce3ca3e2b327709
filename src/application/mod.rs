//! Error types shared across the HTTP surface and the binary boundary.

pub mod error;
