use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Arguments of the native messaging host. The browser launches it with its own arguments
/// (the manifest path or the calling extension origin), which are accepted and ignored.
#[derive(Parser, Debug)]
#[command(name = "sitetimer-host", version, about = "Native messaging host of sitetimer")]
pub struct HostArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Mirrors logs to stderr. The browser usually discards it.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[arg(trailing_var_arg = true, hide = true)]
    pub caller: Vec<String>,
}
