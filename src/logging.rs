use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Logs go to stderr so stdout stays clean for `--json`. Without `verbose` only
/// warnings and errors are shown.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}
