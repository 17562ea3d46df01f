use curator::config::BatchFetchCommand;
use curator::dialog::DialogOptions;
use curator_api_types::JobSnapshot;

use crate::cli::print::{job_summary, print_json};
use crate::cli::{CliError, Ctx};

pub async fn handle(ctx: &Ctx, cmd: BatchFetchCommand) -> Result<(), CliError> {
    match cmd {
        BatchFetchCommand::Status { watch: false } => {
            match ctx.console.current_job().await? {
                Some(job) => println!("{}", job_summary(&job)),
                None => println!("no batch fetch has run yet"),
            }
            Ok(())
        }
        BatchFetchCommand::Status { watch: true } => follow(ctx).await,
        BatchFetchCommand::Start { force } => start(ctx, force).await,
        BatchFetchCommand::Jobs { limit } => {
            print_json(&ctx.console.batch_fetch_jobs(Some(limit), None).await?)
        }
    }
}

/// Print each poll until the current job stops running.
async fn follow(ctx: &Ctx) -> Result<(), CliError> {
    let mut handle = ctx.console.watch_current_job();
    while let Some(tick) = handle.next_tick().await {
        if let Some(error) = &tick.error {
            eprintln!("poll #{} failed: {error}", tick.sequence);
            continue;
        }
        let job = ctx
            .console
            .store()
            .get(handle.key())
            .decode::<Option<JobSnapshot>>()?
            .flatten();
        match job {
            Some(job) => {
                println!("{}", job_summary(&job));
                if !job.status.is_active() {
                    break;
                }
            }
            None => {
                println!("no batch fetch has run yet");
                break;
            }
        }
        eprintln!("next poll in {}s", tick.next_interval.as_secs());
    }
    Ok(())
}

async fn start(ctx: &Ctx, force: bool) -> Result<(), CliError> {
    if let Some(job) = ctx.console.current_job().await?
        && job.status.is_active()
    {
        let proceed = ctx
            .dialogs()
            .confirm(
                format!("Job #{} is still running. Start another one?", job.id),
                DialogOptions::default()
                    .title("Batch fetch running")
                    .confirm_label("Start"),
            )
            .await;
        if !proceed {
            return Ok(());
        }
    }

    let job = ctx.console.start_batch_fetch(force).await?;
    println!("{}", job_summary(&job));
    Ok(())
}
