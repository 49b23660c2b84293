use super::Context;
use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use trove_core::{GroupMember, MembershipPort};

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a new savings group
    Create {
        /// Group name
        name: String,
        /// Member ID of the group admin
        #[arg(short, long)]
        admin: String,
        /// Current payout round
        #[arg(short, long, default_value_t = 1)]
        round: u32,
    },
    /// Add a member to a group (or update their slots)
    AddMember {
        /// Group ID
        group_id: String,
        /// Member ID
        member_id: String,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
        /// Number of purchased slots
        #[arg(short, long)]
        slots: Option<u32>,
    },
    /// Schedule the next automated lottery
    Schedule {
        /// Group ID
        group_id: String,
        /// Seconds from now
        #[arg(long, default_value_t = 0)]
        in_secs: i64,
    },
    /// Show group details and members
    Show {
        /// Group ID
        group_id: String,
    },
}

pub async fn handle_group_command(cmd: GroupCommands, ctx: &Context) -> Result<()> {
    match cmd {
        GroupCommands::Create { name, admin, round } => {
            let group = ctx.groups.create_group(&name, &admin, round).await?;

            println!("Group created!");
            println!("  Name: {}", group.name);
            println!("  ID: {}", group.id);
            println!("  Admin: {}", group.admin_id);
            println!("  Round: {}", group.current_round);
        }

        GroupCommands::AddMember {
            group_id,
            member_id,
            name,
            slots,
        } => {
            let member = GroupMember {
                member_id,
                display_name: name,
                slots,
            };
            ctx.groups.add_member(&group_id, &member).await?;

            println!(
                "Added {} to group {} with {} slot(s)",
                member.name_or_default(),
                group_id,
                member.weight()
            );
        }

        GroupCommands::Schedule { group_id, in_secs } => {
            let at = Utc::now() + chrono::Duration::seconds(in_secs);
            ctx.groups.schedule_lottery(&group_id, at).await?;

            println!("Lottery for group {} scheduled at {}", group_id, at.to_rfc3339());
        }

        GroupCommands::Show { group_id } => {
            let group = ctx.groups.group(&group_id).await?;
            let members = ctx.groups.members(&group_id).await?;

            println!("Group '{}' ({})", group.name, group.id);
            println!("  Admin: {}", group.admin_id);
            println!("  Round: {}", group.current_round);
            match group.next_lottery_at {
                Some(at) => println!("  Next lottery: {}", at.to_rfc3339()),
                None => println!("  Next lottery: not scheduled"),
            }
            println!();

            if members.is_empty() {
                println!("No members yet.");
                println!("Add one with: trove group add-member {} <member-id>", group.id);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Member", "Name", "Slots"]);
            for member in &members {
                table.add_row(vec![
                    member.member_id.clone(),
                    member.name_or_default(),
                    member.weight().to_string(),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
