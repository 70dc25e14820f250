use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` wins over both flags.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if quiet {
            "off"
        } else if verbose {
            "warn,gcli=debug,gcommit=debug,gcmd=debug"
        } else {
            "warn"
        })
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
