// ABOUTME: Tracing subscriber setup for the command-line front-end
// ABOUTME: RUST_LOG wins over the verbosity flag when set

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ds_grist_connector={level},ds_grist={level}",
            level = default_level
        ))
    });

    // Progress and notifications own stdout; diagnostics go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
