// Command dispatch: each sub-command maps onto one client or repository
// call and prints the result as pretty JSON.

use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use finmodel_api::line_items::{write_template, LineItemUpload, NewLineItem, SpreadsheetFile};
use finmodel_api::repository::{
    load_profile, FinanceModelRepository, LineItemRepository, PeriodRepository, Repository,
    RepositoryError, ScenarioRepository, Validate,
};
use finmodel_api::{ApiClient, ApiError, SessionEvent};
use finmodel_core::protocol::{Credentials, Page, ProfileUpdate, RegisterRequest};
use finmodel_core::resources::{FinanceModelDraft, PeriodDraft, ScenarioDraft};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::{
    Command, LineItemsCommand, ModelArgs, ModelsCommand, PeriodArgs, PeriodsCommand,
    ProfileArgs, RegisterArgs, ScenarioArgs, ScenariosCommand,
};

pub const LOGIN_HINT: &str = "Please log in again: finmodel login";

/// Everything a command needs.
pub struct App {
    pub client: Arc<ApiClient>,
    pub page_size: u64,
}

pub async fn run(command: Command, ctx: &App) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            ctx.client.login(&Credentials { email, password }).await?;
            eprintln!("Logged in.");
        }
        Command::Register(args) => register(args, ctx).await?,
        Command::Logout => {
            let signed_in = ctx.client.session().is_authenticated()?;
            ctx.client.logout().await;
            if signed_in {
                eprintln!("Logged out.");
            } else {
                eprintln!("No stored session; local state cleared.");
            }
        }
        Command::Refresh => {
            ctx.client.refresh_token().await?;
            eprintln!("Session refreshed.");
        }
        Command::Profile(args) => profile(args, ctx).await?,
        Command::Models(cmd) => models(cmd, ctx).await?,
        Command::Periods(cmd) => periods(cmd, ctx).await?,
        Command::Scenarios(cmd) => scenarios(cmd, ctx).await?,
        Command::LineItems(cmd) => line_items(cmd, ctx).await?,
    }
    Ok(())
}

async fn register(args: RegisterArgs, ctx: &App) -> Result<()> {
    let request = RegisterRequest {
        email: args.email,
        first_name: args.first_name,
        last_name: args.last_name,
        company_name: args.company_name,
        password: args.password,
    };
    request.validate().map_err(RepositoryError::Validation)?;
    print_json(&ctx.client.register(&request).await?)
}

async fn profile(args: ProfileArgs, ctx: &App) -> Result<()> {
    if !args.is_update() {
        let profile = load_profile(&ctx.client).await?;
        print_json(&profile)?;
        eprintln!("Signed in as {}.", profile.display_name());
        return Ok(());
    }
    // The update endpoint echoes only the editable fields.
    let update = ProfileUpdate {
        first_name: args.first_name,
        last_name: args.last_name,
        company_name: args.company_name,
    };
    print_json(&ctx.client.update_profile(&update).await?)
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

async fn models(cmd: ModelsCommand, ctx: &App) -> Result<()> {
    let repo = FinanceModelRepository::new(ctx.client.clone());
    match cmd {
        ModelsCommand::List { page } => print_page(&repo.list(page).await?, page, ctx),
        ModelsCommand::Get { id } => print_json(&repo.get(id).await?),
        ModelsCommand::Create(args) => print_json(&repo.create(&model_draft(args)).await?),
        ModelsCommand::Update { id, model } => {
            print_json(&repo.update(id, &model_draft(model)).await?)
        }
        ModelsCommand::Delete { id } => {
            repo.delete(id).await?;
            eprintln!("Deleted finance model {id}.");
            Ok(())
        }
    }
}

async fn periods(cmd: PeriodsCommand, ctx: &App) -> Result<()> {
    match cmd {
        PeriodsCommand::List { page, period_type } => {
            let mut repo = PeriodRepository::new(ctx.client.clone());
            if let Some(period_type) = period_type {
                repo = repo.of_type(period_type);
            }
            print_page(&repo.list(page).await?, page, ctx)
        }
        PeriodsCommand::Create(args) => {
            let repo = PeriodRepository::new(ctx.client.clone());
            print_json(&repo.create(&period_draft(args)).await?)
        }
        PeriodsCommand::Update { id, period } => {
            let repo = PeriodRepository::new(ctx.client.clone());
            print_json(&repo.update(id, &period_draft(period)).await?)
        }
        PeriodsCommand::Delete { id } => {
            PeriodRepository::new(ctx.client.clone()).delete(id).await?;
            eprintln!("Deleted period {id}.");
            Ok(())
        }
    }
}

async fn scenarios(cmd: ScenariosCommand, ctx: &App) -> Result<()> {
    match cmd {
        ScenariosCommand::List { model, page } => {
            let repo = ScenarioRepository::new(ctx.client.clone(), model);
            print_page(&repo.list(page).await?, page, ctx)
        }
        ScenariosCommand::Create(args) => {
            let repo = ScenarioRepository::new(ctx.client.clone(), args.model);
            print_json(&repo.create(&scenario_draft(args)).await?)
        }
        ScenariosCommand::Update { id, scenario } => {
            let repo = ScenarioRepository::new(ctx.client.clone(), scenario.model);
            print_json(&repo.update(id, &scenario_draft(scenario)).await?)
        }
        ScenariosCommand::Delete { id } => {
            ctx.client.delete_scenario(id).await?;
            eprintln!("Deleted scenario {id}.");
            Ok(())
        }
    }
}

async fn line_items(cmd: LineItemsCommand, ctx: &App) -> Result<()> {
    match cmd {
        LineItemsCommand::List { model, page } => {
            let repo = LineItemRepository::new(ctx.client.clone(), model);
            print_page(&repo.list(page).await?, page, ctx)
        }
        LineItemsCommand::Add {
            model,
            scenario,
            period,
            name,
            category,
            amount,
        } => {
            let item = NewLineItem::new(model, scenario, period, name, category, amount)?;
            print_json(&LineItemRepository::new(ctx.client.clone(), model).create(&item).await?)
        }
        LineItemsCommand::Upload {
            model,
            scenario,
            period,
            file,
        } => {
            let file = file
                .map(|path| {
                    SpreadsheetFile::from_path(&path)
                        .with_context(|| format!("failed to read {}", path.display()))
                })
                .transpose()?;
            let upload = LineItemUpload::new(model, scenario, period, file)?;
            info!(file = upload.file_name(), model, "uploading line items");
            print_json(&ctx.client.upload_line_items(&upload).await?)
        }
        LineItemsCommand::Template { output } => {
            if output.as_os_str() == "-" {
                return Ok(write_template(io::stdout().lock())?);
            }
            let file = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            write_template(file)?;
            eprintln!("Template written to {}.", output.display());
            Ok(())
        }
    }
}

fn model_draft(args: ModelArgs) -> FinanceModelDraft {
    FinanceModelDraft {
        name: args.name,
        version: args.version,
        model_type: args.model_type,
    }
}

fn period_draft(args: PeriodArgs) -> PeriodDraft {
    PeriodDraft {
        label: args.label,
        start_date: args.start,
        end_date: args.end,
        period_type: args.period_type,
    }
}

fn scenario_draft(args: ScenarioArgs) -> ScenarioDraft {
    ScenarioDraft {
        name: args.name,
        description: args.description,
        model_id: args.model,
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn print_page<T: Serialize>(page: &Page<T>, current: u32, ctx: &App) -> Result<()> {
    print_json(page)?;
    eprintln!("{}", page_footer(page, current, ctx.page_size));
    Ok(())
}

/// `"Page 2 of 3 (25 total); --page 1 / --page 3"`
fn page_footer<T>(page: &Page<T>, current: u32, page_size: u64) -> String {
    let mut footer = format!(
        "Page {current} of {} ({} total)",
        page.total_pages(page_size).max(1),
        page.count
    );
    let moves: Vec<String> = [
        page.has_previous().then(|| current.saturating_sub(1)),
        page.has_next().then(|| current + 1),
    ]
    .into_iter()
    .flatten()
    .map(|p| format!("--page {p}"))
    .collect();
    if !moves.is_empty() {
        footer.push_str("; ");
        footer.push_str(&moves.join(" / "));
    }
    footer
}

/// Text for a failed command: the user-facing message for backend and
/// validation errors, the full chain for anything else.
pub fn error_message(err: &anyhow::Error) -> String {
    if let Some(api) = err.downcast_ref::<ApiError>() {
        return api.user_message();
    }
    if let Some(repo) = err.downcast_ref::<RepositoryError>() {
        return repo.user_message();
    }
    format!("{err:#}")
}

/// Drain pending session events; returns the hint to print when the
/// session expired during the command.
pub fn expiry_hint(events: &mut mpsc::Receiver<SessionEvent>) -> Option<&'static str> {
    let mut expired = false;
    while let Ok(event) = events.try_recv() {
        info!(?event, "session event");
        expired |= event == SessionEvent::Expired;
    }
    expired.then_some(LOGIN_HINT)
}
