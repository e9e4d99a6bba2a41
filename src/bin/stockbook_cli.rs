use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use stockbook_api::{
    auth::{AuthConfig, AuthService},
    config, db,
};

#[derive(Parser)]
#[command(name = "stockbook-cli", about = "Administrative commands for the Stockbook API")]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations against the configured database
    Migrate,
    /// Mint a bearer token for local development
    IssueToken(IssueTokenArgs),
}

#[derive(Args)]
struct IssueTokenArgs {
    /// Subject (user id) carried by the token
    #[arg(long)]
    subject: String,
    /// Optional email claim
    #[arg(long)]
    email: Option<String>,
}

#[derive(Serialize)]
struct IssuedToken<'a> {
    subject: &'a str,
    access_token: String,
    expires_in: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    match cli.command {
        Commands::Migrate => {
            let pool = db::establish_connection_from_app_config(&cfg)
                .await
                .context("failed to connect to the database")?;
            db::run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::IssueToken(args) => {
            let auth = AuthService::new(AuthConfig::from(&cfg));
            let access_token = auth
                .issue_token(&args.subject, args.email.as_deref())
                .context("failed to issue token")?;

            if cli.json {
                print_json(&IssuedToken {
                    subject: &args.subject,
                    access_token,
                    expires_in: cfg.jwt_ttl().as_secs(),
                })?;
            } else {
                println!("{}", access_token);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
