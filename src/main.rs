//! `slurmail` — email notifications for SLURM job lifecycle events.
//!
//! Meant to be called from prolog/epilog hook scripts:
//!
//! ```text
//! slurmail start  --job-id "$SLURM_JOB_ID" --job-name "$SLURM_JOB_NAME" \
//!                 --submit-time "$SUBMIT_TS"
//! slurmail finish --job-id "$SLURM_JOB_ID" --job-name "$SLURM_JOB_NAME" \
//!                 --start-time "$START_TS" --exit-code "$RC"
//! slurmail get-time
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use slurmail_notify::config::NotifierConfig;
use slurmail_notify::notifier::{self, Notifier};

#[derive(Parser)]
#[command(name = "slurmail", about = "Send email notifications for SLURM jobs")]
struct Cli {
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Compose the notification but log it instead of sending
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Notify that a job started
    Start {
        /// SLURM job ID
        #[arg(long)]
        job_id: String,

        /// Job name
        #[arg(long)]
        job_name: String,

        /// Unix timestamp when the job was submitted
        #[arg(long)]
        submit_time: f64,
    },
    /// Notify that a job finished
    Finish {
        /// SLURM job ID
        #[arg(long)]
        job_id: String,

        /// Job name
        #[arg(long)]
        job_name: String,

        /// Unix timestamp when the job started
        #[arg(long)]
        start_time: f64,

        /// Exit code of the job
        #[arg(long)]
        exit_code: i32,
    },
    /// Print the current Unix timestamp
    GetTime,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    match cli.command {
        Commands::GetTime => {
            // Needs no configuration; hook scripts capture this value.
            println!("{}", notifier::unix_now());
        }
        Commands::Start {
            job_id,
            job_name,
            submit_time,
        } => {
            let config = NotifierConfig::from_env().context("loading notifier configuration")?;
            Notifier::new(config)
                .with_dry_run(cli.dry_run)
                .notify_job_start(&job_id, &job_name, submit_time)
                .await
                .context("sending start notification")?;
        }
        Commands::Finish {
            job_id,
            job_name,
            start_time,
            exit_code,
        } => {
            let config = NotifierConfig::from_env().context("loading notifier configuration")?;
            Notifier::new(config)
                .with_dry_run(cli.dry_run)
                .notify_job_finish(&job_id, &job_name, start_time, exit_code)
                .await
                .context("sending finish notification")?;
        }
    }
    Ok(())
}
