//! Logging bootstrap
//!
//! Library crates only emit `tracing` events. A binary embedding ndb calls
//! [`init_tracing`] once to print them.

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Install a stderr fmt subscriber filtered at `level`.
///
/// `RUST_LOG`, when set, overrides `level`. Later calls do nothing, as does
/// a call made after some other global subscriber was installed.
pub fn init_tracing(level: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}
