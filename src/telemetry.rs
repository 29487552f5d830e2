//! Logging setup for binaries and tests embedding the engine.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a global fmt subscriber at the given level. Errors if a global
/// subscriber was already set.
pub fn init(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
