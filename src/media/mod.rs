//! Media module
//!
//! Prepares captured photos for upload.

pub mod prepare;

pub use prepare::{ImagePreparer, PreparedImage};
