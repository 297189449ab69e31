//! snapstreak engine library
//!
//! Client-side engine for a photo-proof habit tracker: background photo
//! uploads, an optimistic completion cache with streak statistics, and
//! reconciliation between the two. Embedded by a host application that
//! supplies captured images and renders the engine's state.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod models;
pub mod remote;
pub mod services;
