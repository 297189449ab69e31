//! Logging initialization
//!
//! Hosts call `init()` once at startup. Safe to call repeatedly; later
//! calls are no-ops, which lets integration tests share it.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapstreak=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
