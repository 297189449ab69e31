//! Services module
//!
//! Business logic services that coordinate between the engine facade and
//! the remote stores.

pub mod completions;
pub mod reconcile;
pub mod stats;
pub mod uploads;

pub use completions::CompletionsService;
pub use reconcile::Reconciler;
pub use uploads::UploadService;
