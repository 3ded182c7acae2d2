//! Tracing subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a stderr fmt subscriber. `RUST_LOG` wins when set; otherwise the
/// level follows the global verbosity flags.
pub fn init(
    verbose: bool,
    quiet: bool,
    no_color: bool,
)
{
    let default_level = if verbose
    {
        "jsdedup=debug"
    }
    else if quiet
    {
        "jsdedup=warn"
    }
    else
    {
        "jsdedup=info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) is not an error worth surfacing
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr)
        .try_init();
}
