pub mod approval;
pub mod feeds;
pub mod jobs;
pub mod leads;
pub mod session;

use curator::config::Command;

use super::print::dashboard;
use super::{CliError, Ctx};

pub async fn run(ctx: &Ctx, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login(args) => session::login(ctx, args).await,
        Command::Logout => session::logout(ctx).await,
        Command::WhoAmI => session::whoami(ctx),
        Command::Feeds(args) => feeds::handle(ctx, args.command).await,
        Command::Leads(args) => leads::handle(ctx, args.command).await,
        Command::Scrapes(args) => leads::scrapes(ctx, args).await,
        Command::Approval(args) => approval::handle(ctx, args.command).await,
        Command::BatchFetch(args) => jobs::handle(ctx, args.command).await,
        Command::Dashboard => show_dashboard(ctx).await,
    }
}

async fn show_dashboard(ctx: &Ctx) -> Result<(), CliError> {
    let stats = ctx.console.dashboard_stats().await?;
    println!("{}", dashboard(&stats));
    Ok(())
}
