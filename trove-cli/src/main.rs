mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use trove_lottery::LotteryError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "trove")]
#[command(about = "Trove - payout lotteries for rotating savings groups")]
#[command(version)]
struct Cli {
    /// Data directory for the trove database and config.json
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group and membership commands
    #[command(subcommand)]
    Group(commands::GroupCommands),

    /// Lottery round commands
    #[command(subcommand)]
    Lottery(commands::LotteryCommands),

    /// Automated lottery scheduler
    #[command(subcommand)]
    Scheduler(commands::SchedulerCommands),

    /// Show a member's notifications
    Notifications {
        /// Member ID
        member_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CliConfig::new(cli.data_dir, cli.verbose);

    // Initialize logging
    let log_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "trove={0},trove_lottery={0},trove_core={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ctx = match commands::Context::open(&config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Group(cmd) => commands::handle_group_command(cmd, &ctx).await,
        Commands::Lottery(cmd) => commands::handle_lottery_command(cmd, &ctx).await,
        Commands::Scheduler(cmd) => commands::handle_scheduler_command(cmd, &ctx).await,
        Commands::Notifications { member_id } => {
            commands::show_notifications(&member_id, &ctx).await
        }
    };

    if let Err(e) = result {
        match e.downcast_ref::<LotteryError>() {
            Some(LotteryError::NoActiveConfirmation(group_id)) => {
                eprintln!("Error: No active confirmation phase for group {}", group_id);
                eprintln!("Members join with 'trove lottery confirm {} <member-id>'", group_id);
            }
            Some(LotteryError::NotGroupMember { member_id, group_id }) => {
                eprintln!("Error: {} is not a member of group {}", member_id, group_id);
                eprintln!("Use 'trove group add-member {} {}' first", group_id, member_id);
            }
            Some(LotteryError::RoundInProgress(group_id)) => {
                eprintln!("Error: A lottery round is already in progress for group {}", group_id);
                eprintln!("If its reveal was interrupted, finish it with 'trove lottery resume'");
            }
            _ => {
                eprintln!("Error: {:#}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
