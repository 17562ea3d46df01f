use curator::config::{ApprovalCommand, DecisionArgs};

use crate::cli::print::print_json;
use crate::cli::{CliError, Ctx};

pub async fn handle(ctx: &Ctx, cmd: ApprovalCommand) -> Result<(), CliError> {
    match cmd {
        ApprovalCommand::Pending { content_type } => {
            let pending = ctx.console.approval_pending(content_type).await?;
            eprintln!("{} pending", pending.total_count);
            print_json(&pending.items)
        }
        ApprovalCommand::Stats => print_json(&ctx.console.approval_stats().await?),
        ApprovalCommand::Approve(args) => decide(ctx, args, true).await,
        ApprovalCommand::Reject(args) => decide(ctx, args, false).await,
    }
}

async fn decide(ctx: &Ctx, args: DecisionArgs, approve: bool) -> Result<(), CliError> {
    let DecisionArgs {
        content_type,
        content_id,
        notes,
    } = args;
    let result = if approve {
        ctx.console.approve(content_type, content_id, notes).await?
    } else {
        ctx.console.reject(content_type, content_id, notes).await?
    };
    print_json(&result)
}
