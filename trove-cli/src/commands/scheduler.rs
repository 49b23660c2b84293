use super::Context;
use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use std::sync::Arc;
use trove_lottery::RoundScheduler;

#[derive(Subcommand)]
pub enum SchedulerCommands {
    /// Start scheduled lotteries that have reached quorum
    Run {
        /// Scan once and exit instead of looping
        #[arg(long)]
        once: bool,
    },
}

pub async fn handle_scheduler_command(cmd: SchedulerCommands, ctx: &Context) -> Result<()> {
    match cmd {
        SchedulerCommands::Run { once } => {
            let scheduler = Arc::new(RoundScheduler::new(ctx.engine.clone(), ctx.groups.clone()));

            let resumed = ctx.engine.resume_reveals().await?;
            if resumed > 0 {
                println!("Resumed {} unfinished reveal(s)", resumed);
            }

            if once {
                let report = scheduler.run_once(Utc::now()).await?;
                print_list("Started", &report.started);
                print_list("Skipped (below quorum)", &report.skipped);
                print_list("Cleared (no confirmations)", &report.cleared);
                print_list("Failed", &report.failed);
                if report.is_empty() {
                    println!("No scheduled lotteries are due.");
                }
            } else {
                println!(
                    "Scheduler running every {:?}. Press Ctrl-C to stop.",
                    ctx.engine.config().scheduler_interval
                );
                scheduler.start();
                tokio::signal::ctrl_c().await?;
                println!("Shutting down scheduler...");
                scheduler.shutdown();
            }

            // let any reveal already in flight reach its final phase
            ctx.engine.wait_for_reveals().await;
        }
    }

    Ok(())
}

fn print_list(label: &str, groups: &[String]) {
    if groups.is_empty() {
        return;
    }
    println!("{}:", label);
    for group_id in groups {
        println!("  - {}", group_id);
    }
}
