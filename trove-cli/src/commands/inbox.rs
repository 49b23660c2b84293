use super::Context;
use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};

pub async fn show_notifications(member_id: &str, ctx: &Context) -> Result<()> {
    let notifications = ctx.notifications.list_for_member(member_id).await?;

    if notifications.is_empty() {
        println!("No notifications for {}", member_id);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["When", "Category", "Title", "Message", "Link"]);

    for stored in &notifications {
        let n = &stored.notification;
        table.add_row(vec![
            stored.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            n.category.as_str().to_string(),
            n.title.clone(),
            n.body.clone(),
            format!("{}?group={}", n.deep_link, n.related_id),
        ]);
    }

    println!("{}", table);
    println!("Total: {} notification(s)", notifications.len());
    Ok(())
}
