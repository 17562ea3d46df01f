//! curator: terminal admin console for the content-curation backend.

mod cli;

use curator::config::{self, Command};
use curator::telemetry;

use cli::{CliError, Ctx, handlers};

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let (args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let ctx = Ctx::new(&settings).await?;
    let command = args.command.unwrap_or(Command::Dashboard);
    handlers::run(&ctx, command).await
}
