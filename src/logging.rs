//! Logger setup
//!
//! `RUST_LOG` always wins. Without it the crate logs at `info`, or `debug`
//! with `--verbose`; other crates stay at `warn`.

pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "warn,capstack=debug"
    } else {
        "warn,capstack=info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}
