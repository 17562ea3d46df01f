use curator::config::{FeedAddArgs, FeedsCommand};
use curator_api_types::FeedCreate;

use crate::cli::print::{feed_table, print_json};
use crate::cli::{CliError, Ctx};

pub async fn handle(ctx: &Ctx, cmd: FeedsCommand) -> Result<(), CliError> {
    match cmd {
        FeedsCommand::List => list(ctx).await,
        FeedsCommand::Add(args) => add(ctx, args).await,
        FeedsCommand::Enable { id } => set_active(ctx, id, true).await,
        FeedsCommand::Disable { id } => set_active(ctx, id, false).await,
        FeedsCommand::Delete { id, yes } => delete(ctx, id, yes).await,
        FeedsCommand::Fetch { id } => fetch(ctx, id).await,
    }
}

async fn list(ctx: &Ctx) -> Result<(), CliError> {
    let feeds = ctx.console.feeds().await?;
    print!("{}", feed_table(&feeds));
    Ok(())
}

async fn add(ctx: &Ctx, args: FeedAddArgs) -> Result<(), CliError> {
    let payload = FeedCreate {
        category_id: args.category_id,
        url: args.url,
        source_name: args.source_name,
        website: args.website,
        fetch_interval: args.fetch_interval,
        is_active: 1,
    };
    let feed = ctx.console.create_feed(&payload).await?;
    print_json(&feed)
}

async fn set_active(ctx: &Ctx, id: i64, active: bool) -> Result<(), CliError> {
    let feed = ctx.console.set_feed_active(id, active).await?;
    let state = if feed.active() { "active" } else { "paused" };
    println!("feed {} is now {state}", feed.id);
    Ok(())
}

async fn delete(ctx: &Ctx, id: i64, yes: bool) -> Result<(), CliError> {
    let name = ctx
        .console
        .feed(id)
        .await
        .map(|feed| feed.source_name)
        .unwrap_or_else(|_| format!("#{id}"));
    let confirmed = ctx
        .confirm_danger(
            format!("Delete feed {name}? Its fetch history is removed too."),
            yes,
        )
        .await;
    if !confirmed {
        println!("kept feed {name}");
        return Ok(());
    }
    ctx.console.delete_feed(id).await?;
    println!("deleted feed {name}");
    Ok(())
}

async fn fetch(ctx: &Ctx, id: Option<i64>) -> Result<(), CliError> {
    let result = match id {
        Some(id) => ctx.console.fetch_feed(id).await?,
        None => ctx.console.fetch_all_feeds().await?,
    };
    print_json(&result)
}
