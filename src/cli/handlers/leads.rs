use curator::cache::query_keys::{LeadFilters, ScrapeFilters};
use curator::config::{LeadFilterArgs, LeadsCommand, ScrapesArgs};
use curator::infinite::{InfiniteList, NextPage, PageSource};
use serde_json::Value;

use crate::cli::print::print_json;
use crate::cli::{CliError, Ctx};

pub async fn handle(ctx: &Ctx, cmd: LeadsCommand) -> Result<(), CliError> {
    match cmd {
        LeadsCommand::List { filters, pages } => list(ctx, filters, pages).await,
        LeadsCommand::Delete { id, yes } => delete(ctx, id, yes).await,
        LeadsCommand::Translate { feed_id, limit } => {
            let result = ctx.console.translate_leads(feed_id, limit).await?;
            print_json(&result)
        }
    }
}

fn lead_filters(args: LeadFilterArgs) -> LeadFilters {
    LeadFilters {
        search: args.search,
        category: args.category,
        tag: args.tag,
        country: args.country,
        feed_id: args.feed_id,
        sort: None,
    }
}

async fn list(ctx: &Ctx, filters: LeadFilterArgs, pages: u32) -> Result<(), CliError> {
    let list = ctx.console.leads_infinite(lead_filters(filters));
    let items = load_pages(&list, pages).await?;
    print_json(&items)
}

pub async fn scrapes(ctx: &Ctx, args: ScrapesArgs) -> Result<(), CliError> {
    let filters = ScrapeFilters {
        search: args.search,
        content_type: args.content_type,
        approval_status: args.approval_status,
        country: args.country,
    };
    let list = ctx.console.scrapes_infinite(filters);
    let items = load_pages(&list, args.pages).await?;
    print_json(&items)
}

/// Load up to `pages` pages and return the accumulated items.
async fn load_pages<S: PageSource>(
    list: &InfiniteList<S>,
    pages: u32,
) -> Result<Vec<Value>, CliError> {
    let mut state = list.load().await?;
    let mut loaded = state.pages.len() as u32;
    while loaded < pages.max(1) && !state.is_exhausted() {
        match list.fetch_next_page().await? {
            NextPage::Appended { .. } => loaded += 1,
            NextPage::Exhausted | NextPage::AlreadyInFlight | NextPage::Superseded => break,
        }
        state = list.state()?;
    }
    if state.is_exhausted() {
        eprintln!("{} items (end of list)", state.item_count());
    } else {
        eprintln!("{} items (more available)", state.item_count());
    }
    Ok(state.items().cloned().collect())
}

async fn delete(ctx: &Ctx, id: i64, yes: bool) -> Result<(), CliError> {
    if !ctx.confirm_danger(format!("Delete lead #{id}?"), yes).await {
        println!("kept lead #{id}");
        return Ok(());
    }
    ctx.console.delete_lead(id).await?;
    println!("deleted lead #{id}");
    Ok(())
}
