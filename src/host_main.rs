// Launched by the browser through native messaging. Stdout carries protocol frames, so nothing
// here may print to it.

use anyhow::Result;
use clap::Parser;
use sitetimer::{
    background::{args::HostArgs, start_background},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use tracing::error;

fn main() -> Result<()> {
    let args = HostArgs::parse();
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(HOST_PREFIX, &app_dir.join("logs"), args.log, args.log_console)?;
    single_thread_runtime()?
        .block_on(async move { start_background(app_dir).await })
        .inspect_err(|e| error!("Host stopped {e:?}"))
}
