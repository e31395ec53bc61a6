// Command-line client for the splitex API

use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::warn;

use splitex::client::ApiClient;
use splitex::config::ClientConfig;
use splitex::error::{ConfigError, SessionError};
use splitex::logging::init_tracing;
use splitex::remote::{ExpenseCollection, ParticipantCollection};
use splitex::schemas::{normalize_username, Credentials, Entry, Expense, Registration};
use splitex::session::Session;
use splitex::totals::{person_totals, shared_between, totals_across};
use splitex::{
    DesiredState, EqualSplit, ExpenseDraft, ExpenseSaver, NextAction, RemoteError, SaveError,
    SaveMode,
};

#[derive(Parser)]
#[command(name = "splitex")]
#[command(about = "Split shared expenses with friends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and log in
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Log in and remember the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List your expenses and what everyone owes
    List {
        /// Only expenses shared with this user
        #[arg(long)]
        with: Option<String>,
    },

    /// Show one expense with its participants
    Show { expense_id: String },

    /// Create an expense
    Create(ExpenseArgs),

    /// Edit an existing expense, replacing its participants
    Edit {
        expense_id: String,

        #[command(flatten)]
        expense: ExpenseArgs,
    },

    /// Delete an expense
    Delete { expense_id: String },
}

#[derive(Args)]
struct ExpenseArgs {
    #[arg(short, long)]
    title: String,

    /// Defaults to today on the server
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Total to split equally among the --with users
    #[arg(long, requires = "with")]
    total: Option<f64>,

    /// Participant of an equal split (repeatable)
    #[arg(short, long)]
    with: Vec<String>,

    /// Unequal split line as username:item:amount (repeatable)
    #[arg(short, long, value_parser = parse_entry, conflicts_with_all = ["total", "with"])]
    entry: Vec<Entry>,
}

impl ExpenseArgs {
    fn into_draft(self) -> Result<ExpenseDraft, CliError> {
        let desired = if !self.entry.is_empty() {
            DesiredState::Unequal(self.entry)
        } else {
            let total = self.total.ok_or_else(|| {
                CliError::Usage("pass --total with --with, or --entry lines".into())
            })?;
            DesiredState::Equal(EqualSplit::new(&self.with, total))
        };
        Ok(ExpenseDraft {
            title: self.title,
            date: self.date,
            desired,
        })
    }
}

fn parse_entry(raw: &str) -> Result<Entry, String> {
    let malformed = || format!("expected username:item:amount, got {raw:?}");
    let (username, rest) = raw.split_once(':').ok_or_else(malformed)?;
    let (item, amount) = rest.rsplit_once(':').ok_or_else(malformed)?;
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid amount {amount:?}: {e}"))?;
    Ok(Entry::new(username, item, amount))
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn is_unauthenticated(&self) -> bool {
        match self {
            CliError::Remote(err) => *err == RemoteError::Unauthenticated,
            CliError::Save(err) => err.is_unauthenticated(),
            _ => false,
        }
    }

    fn hint(&self) -> Option<&'static str> {
        if self.is_unauthenticated() {
            return Some("log in again with `splitex login`");
        }
        let CliError::Save(err) = self else {
            return None;
        };
        Some(match err.next_action() {
            NextAction::FixInput => "check the values you entered and try again",
            NextAction::Retry => "the expense is unchanged or was restored; try saving again",
            NextAction::Recreate => "the expense was deleted; create it again",
            NextAction::DeleteManually => {
                "the expense is left incomplete; remove it with `splitex delete`"
            }
        })
    }
}

fn print_totals(totals: &[(String, f64)]) {
    for (username, amount) in totals {
        println!("  {username:<20} {amount:>10.2}");
    }
}

async fn execute(
    command: Command,
    config: &ClientConfig,
    session: &mut Session,
) -> Result<(), CliError> {
    match command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let registration = Registration {
                username,
                email,
                password,
            };
            let token = ApiClient::new(config, session)?.register(&registration).await?;
            session.login(token)?;
            println!("Registered and logged in.");
        }
        Command::Login { email, password } => {
            let credentials = Credentials { email, password };
            let token = ApiClient::new(config, session)?.login(&credentials).await?;
            session.login(token)?;
            println!("Logged in.");
        }
        Command::Logout => {
            session.logout()?;
            println!("Logged out.");
        }
        Command::Whoami => {
            let user = ApiClient::new(config, session)?.current_user().await?;
            match user.name {
                Some(name) => println!("{} ({name}) <{}>", user.username, user.email),
                None => println!("{} <{}>", user.username, user.email),
            }
        }
        Command::List { with } => {
            let client = ApiClient::new(config, session)?;
            let expenses = client.list_expenses().await?;
            let shown: Vec<Expense> = match with {
                Some(other) => {
                    let me = client.current_user().await?;
                    shared_between(&expenses, &me.username, &normalize_username(&other))
                        .into_iter()
                        .cloned()
                        .collect()
                }
                None => expenses,
            };
            for expense in &shown {
                println!(
                    "{}  {}  {:<24} {:>10.2}  {:<8} paid by {}",
                    expense.id,
                    expense.date,
                    expense.title,
                    expense.total_amount,
                    expense.split_method,
                    expense.payer().unwrap_or("-"),
                );
            }
            println!("Owed:");
            print_totals(&totals_across(&shown));
        }
        Command::Show { expense_id } => {
            let client = ApiClient::new(config, session)?;
            let expense = client.get_expense(&expense_id).await?;
            let participants = client.list_participants(&expense_id).await?;
            println!(
                "{} ({}, {} split) total {:.2}, paid by {}",
                expense.title,
                expense.date,
                expense.split_method,
                expense.total_amount,
                expense.payer().unwrap_or("-"),
            );
            for p in &participants {
                println!(
                    "  {:<20} {:<24} {:>10.2}",
                    p.name.as_deref().unwrap_or(&p.username),
                    p.item.as_deref().unwrap_or(""),
                    p.amount,
                );
            }
            println!("Per person:");
            print_totals(&person_totals(&participants));
        }
        Command::Create(args) => {
            let draft = args.into_draft()?;
            let client = ApiClient::new(config, session)?;
            let expense_id = ExpenseSaver::new(&client)
                .save_expense(SaveMode::Create, &draft)
                .await?;
            println!("Created expense {expense_id}");
        }
        Command::Edit {
            expense_id,
            expense,
        } => {
            let draft = expense.into_draft()?;
            let client = ApiClient::new(config, session)?;
            ExpenseSaver::new(&client)
                .save_expense(SaveMode::Edit(expense_id.clone()), &draft)
                .await?;
            println!("Updated expense {expense_id}");
        }
        Command::Delete { expense_id } => {
            ApiClient::new(config, session)?
                .delete_expense(&expense_id)
                .await?;
            println!("Deleted expense {expense_id}");
        }
    }
    Ok(())
}

async fn run(command: Command) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    let mut session = Session::load(&config.token_path)?;
    let result = execute(command, &config, &mut session).await;
    if matches!(&result, Err(err) if err.is_unauthenticated()) {
        warn!("session rejected by the server, discarding token");
        session.logout()?;
    }
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_colons_in_items() {
        let entry = parse_entry("Ben:Tea: green:4.5").unwrap();
        assert_eq!(entry.username, "ben");
        assert_eq!(entry.item, "Tea: green");
        assert_eq!(entry.amount, 4.5);
        assert!(parse_entry("ben:4.5").is_err());
        assert!(parse_entry("ben:tea:lots").is_err());
    }

    #[test]
    fn equal_split_needs_a_total() {
        let args = ExpenseArgs {
            title: "Pizza".into(),
            date: None,
            total: None,
            with: vec!["amy".into()],
            entry: vec![],
        };
        assert!(matches!(args.into_draft(), Err(CliError::Usage(_))));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
