use tracing_subscriber::EnvFilter;

/// Install a console logger for the `log` records emitted during training.
///
/// The level comes from `RUST_LOG` and defaults to `info`. Installing twice is a no-op.
pub fn install_logger() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
