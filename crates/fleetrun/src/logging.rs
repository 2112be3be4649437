use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber, writing to stderr
///
/// `RUST_LOG` wins when set. Otherwise the level is info, or debug with
/// `--dbg`/`--dev`; `--dev` also adds source locations and thread ids.
pub fn init(dbg: bool, dev: bool) {
    let level = if dbg || dev { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(dev)
        .with_file(dev)
        .with_line_number(dev)
        .with_thread_ids(dev);

    tracing_subscriber::registry().with(filter).with(fmt).init();
}
