use clap::{Args, Parser, Subcommand};
use homekeep::net::ClientBuildError;
use homekeep::net::types::{Credentials, Registration, Role};
use homekeep::{ApiError, App, AuthStatus, ClientConfig, ConfigError, HouseholdSnapshot};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("http client error: {0}")]
    Client(#[from] ClientBuildError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("not logged in; pass --email and --password or set HOMEKEEP_EMAIL / HOMEKEEP_PASSWORD")]
    NotAuthenticated,
    #[error("server did not return {0}")]
    MissingPayload(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "homekeep", about = "Household management API client")]
struct Cli {
    #[arg(long, env = "HOMEKEEP_API_URL")]
    base_url: Option<String>,

    #[arg(long, env = "HOMEKEEP_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "HOMEKEEP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the authenticated user.
    Whoami,
    /// Create an account, then log in as it.
    Register {
        #[arg(long)]
        name: String,
    },
    Households(HouseholdsCommand),
    Members(MembersCommand),
    Invitations(InvitationsCommand),
    /// Join a household with an invitation code.
    Redeem { code: String },
}

#[derive(Args, Debug)]
struct HouseholdsCommand {
    #[command(subcommand)]
    command: HouseholdsSubcommand,
}

#[derive(Subcommand, Debug)]
enum HouseholdsSubcommand {
    List,
    Show {
        household_id: String,
    },
    /// Resolve the active household the way an interactive client would.
    Active {
        #[arg(long)]
        household_id: Option<String>,
    },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        household_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        household_id: String,
    },
}

#[derive(Args, Debug)]
struct MembersCommand {
    #[command(subcommand)]
    command: MembersSubcommand,
}

#[derive(Subcommand, Debug)]
enum MembersSubcommand {
    List { household_id: String },
    SetRole { household_id: String, user_id: String, role: Role },
    Remove { household_id: String, user_id: String },
}

#[derive(Args, Debug)]
struct InvitationsCommand {
    #[command(subcommand)]
    command: InvitationsSubcommand,
}

#[derive(Subcommand, Debug)]
enum InvitationsSubcommand {
    List {
        household_id: String,
    },
    Create {
        household_id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "member")]
        role: Role,
    },
    Revoke {
        household_id: String,
        invitation_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config = config.with_base_url(base_url)?;
    }
    let app = App::from_config(config)?;

    let logged_in = match cli.command {
        Command::Register { ref name } => register(&app, &cli, name).await?,
        _ => authenticate(&app, &cli).await?,
    };

    let result = run(&app, cli.command).await;

    if logged_in {
        if let Err(e) = app.session.logout().await {
            tracing::warn!(error = %e, "logout failed");
        }
    }
    result
}

/// Log in with the given credentials, or fall back to probing an existing
/// session. Returns whether this process opened the session.
async fn authenticate(app: &App, cli: &Cli) -> Result<bool, CliError> {
    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        let credentials = Credentials { email: email.clone(), password: password.clone() };
        app.session
            .login(&credentials)
            .await?
            .ok_or(CliError::MissingPayload("a user"))?;
        return Ok(true);
    }
    match app.session.check_auth().await {
        AuthStatus::LoggedIn => Ok(false),
        _ => Err(CliError::NotAuthenticated),
    }
}

async fn register(app: &App, cli: &Cli, name: &str) -> Result<bool, CliError> {
    let (Some(email), Some(password)) = (&cli.email, &cli.password) else {
        return Err(CliError::NotAuthenticated);
    };
    let registration = Registration { email: email.clone(), password: password.clone(), name: name.to_owned() };
    app.session
        .register(&registration)
        .await?
        .ok_or(CliError::MissingPayload("a user"))?;
    Ok(true)
}

async fn run(app: &App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Whoami | Command::Register { .. } => {
            let user = app.session.user().ok_or(CliError::NotAuthenticated)?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Households(households) => run_households(app, households).await,
        Command::Members(members) => run_members(app, members).await,
        Command::Invitations(invitations) => run_invitations(app, invitations).await,
        Command::Redeem { code } => {
            let joined = app.invitations.redeem_invitation(&code).await?;
            print_json(&serde_json::to_value(joined)?)
        }
    }
}

async fn run_households(app: &App, households: HouseholdsCommand) -> Result<(), CliError> {
    let service = &app.households;
    match households.command {
        HouseholdsSubcommand::List => print_json(&serde_json::to_value(service.get_households().await?)?),
        HouseholdsSubcommand::Show { household_id } => {
            print_json(&serde_json::to_value(service.get_household(&household_id).await?)?)
        }
        HouseholdsSubcommand::Active { household_id } => {
            if let Some(id) = household_id {
                app.context.switch_household(id);
            }
            let snapshot = app.context.refresh().await;
            print_json(&snapshot_json(&snapshot)?)
        }
        HouseholdsSubcommand::Create { name, description } => {
            let created = service
                .create_household(&name, description.as_deref())
                .await?;
            print_json(&serde_json::to_value(created)?)
        }
        HouseholdsSubcommand::Update { household_id, name, description } => {
            let updated = service
                .update_household(&household_id, &name, description.as_deref())
                .await?;
            print_json(&serde_json::to_value(updated)?)
        }
        HouseholdsSubcommand::Delete { household_id } => {
            service.delete_household(&household_id).await?;
            print_json(&json!({ "deleted": household_id }))
        }
    }
}

async fn run_members(app: &App, members: MembersCommand) -> Result<(), CliError> {
    let service = &app.members;
    match members.command {
        MembersSubcommand::List { household_id } => {
            print_json(&serde_json::to_value(service.get_members(&household_id).await?)?)
        }
        MembersSubcommand::SetRole { household_id, user_id, role } => {
            let updated = service
                .update_member_role(&household_id, &user_id, role)
                .await?;
            print_json(&serde_json::to_value(updated)?)
        }
        MembersSubcommand::Remove { household_id, user_id } => {
            service.remove_member(&household_id, &user_id).await?;
            print_json(&json!({ "removed": user_id }))
        }
    }
}

async fn run_invitations(app: &App, invitations: InvitationsCommand) -> Result<(), CliError> {
    let service = &app.invitations;
    match invitations.command {
        InvitationsSubcommand::List { household_id } => {
            print_json(&serde_json::to_value(service.get_invitations(&household_id).await?)?)
        }
        InvitationsSubcommand::Create { household_id, email, role } => {
            let created = service
                .create_invitation(&household_id, email.as_deref(), role)
                .await?;
            print_json(&serde_json::to_value(created)?)
        }
        InvitationsSubcommand::Revoke { household_id, invitation_id } => {
            service
                .revoke_invitation(&household_id, &invitation_id)
                .await?;
            print_json(&json!({ "revoked": invitation_id }))
        }
    }
}

fn snapshot_json(snapshot: &HouseholdSnapshot) -> Result<Value, CliError> {
    Ok(json!({
        "activeHouseholdId": snapshot.active_household_id,
        "activeHousehold": serde_json::to_value(&snapshot.active_household)?,
        "userHouseholds": serde_json::to_value(&snapshot.user_households)?,
        "currentRole": snapshot.current_role.map(Role::as_str),
        "canManageHousehold": snapshot.can_manage_household,
    }))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
