//! Tracing setup for binaries and tests.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Install the default subscriber stack: env-filtered fmt output plus span
/// traces on errors. Honors `RUST_LOG`; defaults to `info`.
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(ErrorLayer::default())
        .try_init()
}

/// Like [`try_init`] but quietly tolerates an already-installed subscriber,
/// which is what tests want.
pub fn init() {
    let _ = try_init();
}
