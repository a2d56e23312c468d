// Command-line surface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use finmodel_api::line_items::TEMPLATE_FILE_NAME;
use finmodel_core::resources::{LineItemCategory, ModelType, PeriodType};

/// `finmodel` command arguments.
#[derive(Debug, Parser)]
#[command(
    name = "finmodel",
    about = "Manage finance models, periods, scenarios and line items",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account.
    Register(RegisterArgs),
    /// Sign out and forget the stored session.
    Logout,
    /// Exchange the stored refresh token for a new pair.
    Refresh,
    /// Show the profile, or update it when any field is given.
    Profile(ProfileArgs),
    /// Finance models.
    #[command(subcommand)]
    Models(ModelsCommand),
    /// Reporting periods.
    #[command(subcommand)]
    Periods(PeriodsCommand),
    /// Scenarios of a finance model.
    #[command(subcommand)]
    Scenarios(ScenariosCommand),
    /// Line items of a finance model.
    #[command(subcommand)]
    LineItems(LineItemsCommand),
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long = "first-name")]
    pub first_name: String,
    #[arg(long = "last-name", default_value = "")]
    pub last_name: String,
    #[arg(long = "company-name", default_value = "")]
    pub company_name: String,
    #[arg(long)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[arg(long = "first-name")]
    pub first_name: Option<String>,
    #[arg(long = "last-name")]
    pub last_name: Option<String>,
    #[arg(long = "company-name")]
    pub company_name: Option<String>,
}

impl ProfileArgs {
    pub fn is_update(&self) -> bool {
        self.first_name.is_some() || self.last_name.is_some() || self.company_name.is_some()
    }
}

// ---------------------------------------------------------------------------
// Finance models
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum ModelsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Get {
        id: i64,
    },
    Create(ModelArgs),
    Update {
        id: i64,
        #[command(flatten)]
        model: ModelArgs,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub version: String,
    /// Wire code such as DCF, LBO, M&A or Budget.
    #[arg(long = "type", value_name = "code")]
    pub model_type: ModelType,
}

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum PeriodsCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Only periods of this type (monthly, quarterly, yearly).
        #[arg(long = "type")]
        period_type: Option<PeriodType>,
    },
    Create(PeriodArgs),
    Update {
        id: i64,
        #[command(flatten)]
        period: PeriodArgs,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Args)]
pub struct PeriodArgs {
    #[arg(long)]
    pub label: String,
    /// First day, `YYYY-MM-DD`.
    #[arg(long)]
    pub start: NaiveDate,
    /// Last day, `YYYY-MM-DD`.
    #[arg(long)]
    pub end: NaiveDate,
    #[arg(long = "type")]
    pub period_type: PeriodType,
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum ScenariosCommand {
    List {
        #[arg(long)]
        model: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Create(ScenarioArgs),
    Update {
        id: i64,
        #[command(flatten)]
        scenario: ScenarioArgs,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Args)]
pub struct ScenarioArgs {
    #[arg(long)]
    pub model: i64,
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub description: String,
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum LineItemsCommand {
    List {
        #[arg(long)]
        model: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Add a single line item.
    Add {
        #[arg(long)]
        model: i64,
        #[arg(long)]
        scenario: Option<i64>,
        #[arg(long)]
        period: Option<i64>,
        #[arg(long)]
        name: String,
        /// Revenue, Expense, Asset, Liability, Equity or Other.
        #[arg(long)]
        category: LineItemCategory,
        #[arg(long)]
        amount: f64,
    },
    /// Upload a spreadsheet (.xlsx, .xls or .csv).
    Upload {
        #[arg(long)]
        model: i64,
        #[arg(long)]
        scenario: Option<i64>,
        #[arg(long)]
        period: Option<i64>,
        file: Option<PathBuf>,
    },
    /// Write the example CSV template.
    Template {
        /// Destination file; `-` for stdout.
        #[arg(long, short, default_value = TEMPLATE_FILE_NAME)]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("finmodel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn login_args() {
        match parse(&["login", "--email", "a@b.co", "--password", "pw"]).command {
            Command::Login { email, password } => {
                assert_eq!(email, "a@b.co");
                assert_eq!(password, "pw");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn model_type_parses_wire_code() {
        match parse(&["models", "create", "--name", "Deal", "--version", "1", "--type", "m&a"])
            .command
        {
            Command::Models(ModelsCommand::Create(args)) => {
                assert_eq!(args.model_type, ModelType::MergersAcquisitions);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn period_dates_and_type() {
        let cli = parse(&[
            "periods", "update", "4", "--label", "Q1", "--start", "2025-01-01", "--end",
            "2025-03-31", "--type", "quarterly",
        ]);
        match cli.command {
            Command::Periods(PeriodsCommand::Update { id, period }) => {
                assert_eq!(id, 4);
                assert_eq!(period.start, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
                assert_eq!(period.period_type, PeriodType::Quarterly);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bad_date_is_rejected() {
        let result = Cli::try_parse_from([
            "finmodel", "periods", "create", "--label", "Q1", "--start", "01/01/2025", "--end",
            "2025-03-31", "--type", "quarterly",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn upload_selection_is_optional_at_parse_time() {
        match parse(&["line-items", "upload", "--model", "7", "q1.xlsx"]).command {
            Command::LineItems(LineItemsCommand::Upload {
                model,
                scenario,
                period,
                file,
            }) => {
                assert_eq!(model, 7);
                assert_eq!(scenario, None);
                assert_eq!(period, None);
                assert_eq!(file, Some(PathBuf::from("q1.xlsx")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn line_item_category_is_checked_at_parse_time() {
        let args = [
            "finmodel", "line-items", "add", "--model", "1", "--scenario", "2", "--period", "3",
            "--name", "Rent", "--amount", "10", "--category",
        ];
        let ok = Cli::try_parse_from(args.iter().copied().chain(["expense"])).unwrap();
        match ok.command {
            Command::LineItems(LineItemsCommand::Add { category, .. }) => {
                assert_eq!(category, LineItemCategory::Expense);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(args.iter().copied().chain(["Income"])).is_err());
    }

    #[test]
    fn template_defaults_to_named_file() {
        match parse(&["line-items", "template"]).command {
            Command::LineItems(LineItemsCommand::Template { output }) => {
                assert_eq!(output, PathBuf::from(TEMPLATE_FILE_NAME));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn profile_without_fields_is_a_read() {
        match parse(&["profile"]).command {
            Command::Profile(args) => assert!(!args.is_update()),
            other => panic!("unexpected command: {other:?}"),
        }
        match parse(&["profile", "--company-name", "Acme"]).command {
            Command::Profile(args) => assert!(args.is_update()),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
