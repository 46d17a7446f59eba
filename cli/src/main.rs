use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use portal::config::{ConfigError, PortalConfig};
use portal::net::api;
use portal::net::types::{Assignment, AssignmentDraft, Role};
use portal::pages::assignment::{load_assignment_detail, load_submissions_list};
use portal::pages::dashboard::{Dashboard, load_dashboard};
use portal::state::auth::{Access, route_access};
use portal::{ApiClient, ApiError, SessionStorage, SessionStore, UserProfile};
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("not logged in; run `portal-cli login` first")]
    NotLoggedIn,
    #[error("this command requires the {0} role")]
    Forbidden(String),
    #[error("session check did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "portal-cli", about = "Assignment portal command-line client")]
struct Cli {
    #[arg(long, env = "PORTAL_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "PORTAL_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "student")]
        role: Role,
    },
    Logout,
    /// Show the logged-in user after checking the session with the server.
    Whoami,
    Dashboard,
    Assignment(AssignmentCommand),
    Submit {
        assignment_id: i64,
        file_url: String,
    },
    /// List every submission to an assignment (admin).
    Submissions {
        assignment_id: i64,
    },
    /// Grade a submission (admin).
    Grade {
        submission_id: i64,
        #[arg(long)]
        grade: f64,
        #[arg(long, default_value = "")]
        feedback: String,
    },
    /// Overview counts (admin).
    Stats,
}

#[derive(Args, Debug)]
struct AssignmentCommand {
    #[command(subcommand)]
    command: AssignmentSubcommand,
}

#[derive(Subcommand, Debug)]
enum AssignmentSubcommand {
    List,
    Show {
        assignment_id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// RFC 3339, e.g. 2030-01-31T23:59:00Z
        #[arg(long, value_parser = parse_deadline)]
        deadline: OffsetDateTime,
    },
    Update {
        assignment_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<OffsetDateTime>,
    },
    Delete {
        assignment_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let config = resolve_config(cli.api_url, cli.session_file)?;
    tracing::debug!(api_url = %config.api_url, session_file = %config.session_file.display(), "configured");
    let client = ApiClient::new(&config, SessionStorage::file(config.session_file.clone()))?;
    let store = SessionStore::new(client);

    match cli.command {
        Command::Login { email, password } => {
            let user = store.login(&email, &password).await?;
            print_json(&user)
        }
        Command::Signup { name, email, password, role } => {
            let user = store.signup(&name, &email, &password, role).await?;
            print_json(&user)
        }
        Command::Logout => {
            store.logout();
            eprintln!("logged out");
            Ok(())
        }
        command => {
            store.client().on_unauthorized(|| eprintln!("session expired, log in again"));
            restore_session(&store).await?;
            run_authenticated(&store, command).await
        }
    }
}

fn resolve_config(api_url: Option<String>, session_file: Option<PathBuf>) -> Result<PortalConfig, CliError> {
    let base = PortalConfig::from_env()?;
    if api_url.is_none() && session_file.is_none() {
        return Ok(base);
    }
    let api_url = api_url.unwrap_or(base.api_url);
    let session_file = session_file.unwrap_or(base.session_file);
    Ok(PortalConfig::new(&api_url, session_file, base.timeouts)?)
}

/// Run the startup check and wait for the server to confirm the token.
async fn restore_session(store: &SessionStore) -> Result<(), CliError> {
    if let Some(revalidation) = store.initialize() {
        revalidation.await?;
    }
    Ok(())
}

fn require(store: &SessionStore, allowed: &[Role]) -> Result<UserProfile, CliError> {
    let session = store.session();
    match route_access(&session, allowed) {
        Access::Granted => session.user.ok_or(CliError::NotLoggedIn),
        Access::Forbidden => {
            let roles: Vec<&str> = allowed.iter().map(|role| role.as_str()).collect();
            Err(CliError::Forbidden(roles.join(" or ")))
        }
        Access::Pending | Access::RedirectToLogin => Err(CliError::NotLoggedIn),
    }
}

async fn run_authenticated(store: &SessionStore, command: Command) -> Result<(), CliError> {
    let client = store.client();
    match command {
        Command::Whoami => print_json(&require(store, &[])?),
        Command::Dashboard => {
            let user = require(store, &[])?;
            print_dashboard(&load_dashboard(client, &user).await?)
        }
        Command::Assignment(assignment) => run_assignment(store, assignment).await,
        Command::Submit { assignment_id, file_url } => {
            require(store, &[Role::Student])?;
            api::submit_assignment(client, assignment_id, &file_url).await?;
            eprintln!("submitted assignment {assignment_id}");
            Ok(())
        }
        Command::Submissions { assignment_id } => {
            require(store, &[Role::Admin])?;
            let list = load_submissions_list(client, assignment_id).await?;
            print_json(&json!({
                "assignment": list.assignment,
                "ungraded": list.ungraded(),
                "submissions": list.submissions,
            }))
        }
        Command::Grade { submission_id, grade, feedback } => {
            require(store, &[Role::Admin])?;
            api::grade_submission(client, submission_id, grade, &feedback).await?;
            eprintln!("graded submission {submission_id}");
            Ok(())
        }
        Command::Stats => {
            require(store, &[Role::Admin])?;
            print_json(&api::fetch_stats(client).await?)
        }
        Command::Login { .. } | Command::Signup { .. } | Command::Logout => Ok(()),
    }
}

async fn run_assignment(store: &SessionStore, assignment: AssignmentCommand) -> Result<(), CliError> {
    let client = store.client();
    match assignment.command {
        AssignmentSubcommand::List => {
            require(store, &[])?;
            print_json(&api::list_assignments(client).await?)
        }
        AssignmentSubcommand::Show { assignment_id } => {
            let user = require(store, &[])?;
            let detail = load_assignment_detail(client, &user, assignment_id).await?;
            let overdue = detail.assignment.is_overdue(OffsetDateTime::now_utc());
            print_json(&json!({
                "assignment": detail.assignment,
                "overdue": overdue,
                "submission": detail.submission,
            }))
        }
        AssignmentSubcommand::Create { title, description, deadline } => {
            require(store, &[Role::Admin])?;
            api::create_assignment(client, &AssignmentDraft { title, description, deadline }).await?;
            eprintln!("assignment created");
            Ok(())
        }
        AssignmentSubcommand::Update { assignment_id, title, description, deadline } => {
            require(store, &[Role::Admin])?;
            let current = api::fetch_assignment(client, assignment_id).await?;
            let draft = merge_draft(current, title, description, deadline);
            api::update_assignment(client, assignment_id, &draft).await?;
            eprintln!("assignment {assignment_id} updated");
            Ok(())
        }
        AssignmentSubcommand::Delete { assignment_id } => {
            require(store, &[Role::Admin])?;
            api::delete_assignment(client, assignment_id).await?;
            eprintln!("assignment {assignment_id} deleted");
            Ok(())
        }
    }
}

fn merge_draft(
    current: Assignment,
    title: Option<String>,
    description: Option<String>,
    deadline: Option<OffsetDateTime>,
) -> AssignmentDraft {
    AssignmentDraft {
        title: title.unwrap_or(current.title),
        description: description.unwrap_or(current.description),
        deadline: deadline.unwrap_or(current.deadline),
    }
}

fn print_dashboard(dashboard: &Dashboard) -> Result<(), CliError> {
    match dashboard {
        Dashboard::Admin { stats, assignments } => print_json(&json!({
            "stats": stats,
            "assignments": assignments,
        })),
        Dashboard::Student { rows, submissions } => {
            let rows: Vec<_> = rows
                .iter()
                .map(|row| {
                    json!({
                        "id": row.assignment.id,
                        "title": row.assignment.title,
                        "deadline": row.assignment.deadline.format(&Rfc3339).ok(),
                        "status": row.status.label(),
                        "grade": row.submission.as_ref().and_then(|s| s.grade),
                    })
                })
                .collect();
            print_json(&json!({ "assignments": rows, "submissions": submissions }))
        }
    }
}

fn parse_deadline(raw: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
