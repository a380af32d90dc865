//! Launch parameter parsing for the client.

use std::path::PathBuf;

use clap::Parser;

/// Default response cache budget in mebibytes.
const DEFAULT_CACHE_MB: usize = 64;
/// Default number of concurrently tracked requests.
const DEFAULT_MAX_IN_FLIGHT: u16 = 4;
/// Default interval between progress log lines, in milliseconds.
const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 250;

/// Launch parameters for the client.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchParams {
    /// URL of the mesh descriptor.
    pub url: String,
    /// Response cache budget in bytes; 0 disables caching.
    pub cache_bytes: usize,
    /// Fetch the whole payload in one request.
    pub single_shot: bool,
    /// Progress table capacity.
    pub max_in_flight: usize,
    /// Level to show once loading ends, clamped to what was loaded.
    pub display_level: Option<u32>,
    /// Write the assembled buffer here when loading ends.
    pub dump: Option<PathBuf>,
    /// Interval between progress log lines, in milliseconds.
    pub progress_interval_ms: u64,
}

/// Accept only absolute `http` and `https` URLs with a host.
fn parse_url(s: &str) -> Result<String, String> {
    let url = popbuffer::Url::parse(s).map_err(|e| format!("invalid URL '{s}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("missing host in '{s}'"));
    }
    Ok(s.to_string())
}

#[derive(Parser)]
#[command(about = "Stream a progressive mesh level by level")]
struct CliArgs {
    /// URL of the mesh descriptor (JSON).
    #[arg(value_parser = parse_url)]
    url: String,

    /// Response cache budget in MiB (0 disables caching).
    #[arg(long, default_value_t = DEFAULT_CACHE_MB)]
    cache_mb: usize,

    /// Fetch the whole payload in one request instead of level by level.
    #[arg(long)]
    single_shot: bool,

    /// Maximum number of concurrently tracked requests.
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT, value_parser = clap::value_parser!(u16).range(1..))]
    max_in_flight: u16,

    /// Level to display once loading ends.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    display_level: Option<u32>,

    /// Write the assembled vertex buffer to this file.
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Interval between progress log lines in milliseconds.
    #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL_MS)]
    progress_interval_ms: u64,
}

impl From<CliArgs> for LaunchParams {
    fn from(args: CliArgs) -> Self {
        Self {
            url: args.url,
            cache_bytes: args.cache_mb.saturating_mul(1024 * 1024),
            single_shot: args.single_shot,
            max_in_flight: usize::from(args.max_in_flight),
            display_level: args.display_level,
            dump: args.dump,
            progress_interval_ms: args.progress_interval_ms.max(1),
        }
    }
}

/// Parse launch parameters from the command line.
pub fn parse() -> LaunchParams {
    CliArgs::parse().into()
}
