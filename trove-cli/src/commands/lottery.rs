use super::Context;
use anyhow::Result;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use trove_core::{RoundSnapshot, RoundStatus};

#[derive(Subcommand)]
pub enum LotteryCommands {
    /// Confirm a member for the group's current round
    Confirm {
        /// Group ID
        group_id: String,
        /// Member ID
        member_id: String,
    },
    /// Start the selection and watch the reveal
    Start {
        /// Group ID
        group_id: String,
    },
    /// Run a practice draw over all members
    Practice {
        /// Group ID
        group_id: String,
    },
    /// Show the group's current lottery status
    Status {
        /// Group ID
        group_id: String,
    },
    /// Tell watchers to start fresh
    Reset {
        /// Group ID
        group_id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Clear the group's practice session
    ResetPractice {
        /// Group ID
        group_id: String,
    },
    /// Finish reveals interrupted by an earlier exit
    Resume,
}

pub async fn handle_lottery_command(cmd: LotteryCommands, ctx: &Context) -> Result<()> {
    match cmd {
        LotteryCommands::Confirm {
            group_id,
            member_id,
        } => {
            let round = ctx
                .engine
                .confirm_participation(&member_id, &group_id)
                .await?;

            println!(
                "{} is in for round {} ({} confirmed)",
                member_id,
                round.round_number,
                round.confirmed_members.len()
            );
        }

        LotteryCommands::Start { group_id } => {
            let watcher = ctx.hub.subscribe(&group_id);
            let started = ctx.engine.start_selection(&group_id).await?;
            print_phase(&started);

            follow_reveal(ctx, watcher, RoundStatus::Completed).await;

            if let Some(status) = ctx.engine.status(&group_id).await? {
                print_status(&status);
            }
        }

        LotteryCommands::Practice { group_id } => {
            let watcher = ctx.hub.subscribe(&group_id);
            let started = ctx
                .engine
                .practice_simulator()
                .start_practice(&group_id)
                .await?;
            print_phase(&started);

            follow_reveal(ctx, watcher, RoundStatus::Practice).await;

            if let Some(status) = ctx.engine.status(&group_id).await? {
                print_status(&status);
            }
        }

        LotteryCommands::Status { group_id } => match ctx.engine.status(&group_id).await? {
            Some(status) => print_status(&status),
            None => {
                println!("No lottery rounds for group {} yet.", group_id);
                println!("Open one with: trove lottery confirm {} <member-id>", group_id);
            }
        },

        LotteryCommands::Reset { group_id, force } => {
            if !force {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Tell everyone watching group {} to start fresh?",
                        group_id
                    ))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("Reset cancelled.");
                    return Ok(());
                }
            }

            ctx.engine.reset(&group_id);
            println!("Reset signal sent for group {}", group_id);
        }

        LotteryCommands::ResetPractice { group_id } => {
            ctx.engine.practice_simulator().reset_practice(&group_id);
            println!("Practice session cleared for group {}", group_id);
        }

        LotteryCommands::Resume => {
            let resumed = ctx.engine.resume_reveals().await?;
            if resumed == 0 {
                println!("No unfinished reveals.");
                return Ok(());
            }

            println!("Resuming {} reveal(s)...", resumed);
            ctx.engine.wait_for_reveals().await;
            println!("Done.");
        }
    }

    Ok(())
}

/// Print each phase as it is broadcast until `terminal` arrives or the
/// reveal task ends without reaching it
async fn follow_reveal(ctx: &Context, mut watcher: Receiver<RoundSnapshot>, terminal: RoundStatus) {
    let reveal_ended = tokio::select! {
        _ = watch_reveal(&mut watcher, terminal) => false,
        _ = ctx.engine.wait_for_reveals() => true,
    };

    if reveal_ended {
        // phases published just before the task ended are still buffered
        while let Ok(snapshot) = watcher.try_recv() {
            if snapshot.status != RoundStatus::Countdown {
                print_phase(&snapshot);
            }
        }
    }
    ctx.engine.wait_for_reveals().await;
}

async fn watch_reveal(watcher: &mut Receiver<RoundSnapshot>, terminal: RoundStatus) {
    loop {
        match watcher.recv().await {
            Ok(snapshot) => {
                if snapshot.status == RoundStatus::Countdown {
                    // already printed from the start response
                    continue;
                }
                print_phase(&snapshot);
                if snapshot.status == terminal {
                    break;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Missed {} lottery updates", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_phase(snapshot: &RoundSnapshot) {
    let label = if snapshot.is_practice { " (practice)" } else { "" };

    match snapshot.status {
        RoundStatus::Countdown => {
            println!("Countdown started{}", label);
            if let Some(end) = snapshot.countdown_end {
                println!("  Spinning at: {}", end.to_rfc3339());
            }
            if let Some(commitment) = &snapshot.draw_commitment {
                println!("  Draw commitment: {}", commitment);
            }
        }
        RoundStatus::Spinning => {
            println!("Spinning{}...", label);
            if let Some(name) = &snapshot.selected_name {
                println!("  First payout goes to: {}", name);
            }
        }
        RoundStatus::Completed | RoundStatus::Practice => {
            println!("Draw complete{}!", label);
        }
        RoundStatus::Confirming => {
            println!("Back to confirming{}", label);
        }
    }
}

fn print_status(status: &RoundSnapshot) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Group".to_string(), status.group_id.clone()]);
    table.add_row(vec!["Round".to_string(), status.round.to_string()]);
    table.add_row(vec!["Status".to_string(), status.status.to_string()]);
    table.add_row(vec!["Practice".to_string(), status.is_practice.to_string()]);
    table.add_row(vec![
        "Confirmed".to_string(),
        status.confirmed_members.join(", "),
    ]);
    if let Some(name) = &status.selected_name {
        table.add_row(vec!["Selected".to_string(), name.clone()]);
    }
    if let Some(end) = status.countdown_end {
        table.add_row(vec!["Countdown end".to_string(), end.to_rfc3339()]);
    }
    if let Some(commitment) = &status.draw_commitment {
        table.add_row(vec!["Commitment".to_string(), commitment.clone()]);
    }
    if let Some(nonce) = &status.draw_nonce {
        table.add_row(vec!["Nonce".to_string(), nonce.clone()]);
    }

    println!("{}", table);

    if !status.payout_order.is_empty() {
        println!();
        println!("Payout order:");
        for (position, member_id) in status.payout_order.iter().enumerate() {
            println!("  {}. {}", position + 1, member_id);
        }
    }
}
