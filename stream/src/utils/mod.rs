//! Utility functions for the stream crate.

pub mod codec;
