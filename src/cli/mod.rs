pub mod host_path;
pub mod output;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use host_path::{host_manifest, HOST_NAME};
use tracing::level_filters::LevelFilter;

use crate::{
    background::{
        machine::SiteTimer, session::Session, start_background,
        storage::site_storage::JsonFileStore, STATE_FILE,
    },
    config::TimerConfig,
    host::detached::Detached,
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
        time::{date_key, MS_PER_MINUTE},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Sitetimer", version, long_about = None)]
#[command(about = "Daily time budgets for distracting websites", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the native messaging host in the current console. Used for debugging with piped frames"
    )]
    Serve,
    #[command(about = "Show today's usage of every monitored domain")]
    Status,
    #[command(about = "Start monitoring a domain")]
    Add {
        domain: String,
        #[arg(long, short, help = "Daily budget in minutes")]
        minutes: u64,
        #[arg(long, short, help = "Display name. Defaults to the domain")]
        name: Option<String>,
    },
    #[command(about = "Stop monitoring a domain")]
    Remove { domain: String },
    #[command(about = "Change the daily budget of a monitored domain")]
    Limit { domain: String, minutes: u64 },
    #[command(about = "Suspend blocking of a domain for a few hours")]
    Ignore { domain: String },
    #[command(about = "Reset today's counters of every domain")]
    Reset,
    #[command(about = "Print the native messaging manifest for the browser")]
    Manifest {
        #[arg(long, help = "Id of the extension allowed to connect")]
        extension_id: String,
    },
}

type CliTimer = SiteTimer<JsonFileStore, Detached, Detached>;

/// Timer acting on the persisted state without a browser. Alarms it would schedule are armed
/// by the host on its next start.
fn detached_timer(dir: &std::path::Path) -> Result<CliTimer> {
    Ok(SiteTimer::new(
        JsonFileStore::new(dir.join(STATE_FILE))?,
        Detached,
        Detached,
        Box::new(DefaultClock),
        TimerConfig::load(dir)?,
    ))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(CLI_PREFIX, &dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Serve => start_background(dir).await,
        Commands::Status => {
            let timer = detached_timer(&dir)?;
            let data = timer.time_data().await?;
            let clock = DefaultClock;
            print!(
                "{}",
                output::format_status(&data, &date_key(clock.today()), clock.epoch_ms())
            );
            Ok(())
        }
        Commands::Add {
            domain,
            minutes,
            name,
        } => {
            detached_timer(&dir)?
                .add_domain(&domain, name, minutes.saturating_mul(MS_PER_MINUTE))
                .await?;
            println!("Monitoring {domain}");
            Ok(())
        }
        Commands::Remove { domain } => {
            detached_timer(&dir)?
                .remove_domain(&mut Session::default(), &domain)
                .await?;
            println!("Removed {domain}");
            Ok(())
        }
        Commands::Limit { domain, minutes } => {
            detached_timer(&dir)?
                .update_time_limit(&domain, minutes.saturating_mul(MS_PER_MINUTE))
                .await?;
            println!("{domain} now has {minutes} minutes a day");
            Ok(())
        }
        Commands::Ignore { domain } => {
            let timer = detached_timer(&dir)?;
            timer.ignore_domain(&mut Session::default(), &domain).await?;
            println!("{}", output::format_state(&timer.state_of(&domain).await?));
            Ok(())
        }
        Commands::Reset => {
            detached_timer(&dir)?
                .reset_counters(&mut Session::default())
                .await?;
            println!("Counters reset");
            Ok(())
        }
        Commands::Manifest { extension_id } => {
            let manifest = host_manifest(&env::current_exe()?, &extension_id);
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            eprintln!("Install it as {HOST_NAME}.json in the browser's NativeMessagingHosts directory");
            Ok(())
        }
    }
}
