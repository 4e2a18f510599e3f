use accord_shell_core::{Environment, Presentation};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use url::Url;

mod commands;
mod config;

use commands::CredentialArgs;

#[derive(Parser, Debug)]
#[command(name = "accord-shell")]
#[command(about = "Session and menu authorization tooling for the Accord admin shell", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ACCORD_SHELL_CONFIG", default_value = "accord-shell.toml")]
    config: PathBuf,

    /// Override the configured environment
    #[arg(short, long, env = "ACCORD_ENV", value_enum)]
    environment: Option<EnvironmentArg>,

    /// Persist origin storage here instead of keeping it in memory
    #[arg(short, long, env = "ACCORD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration
    Validate,

    /// Print the effective configuration as TOML
    Config,

    /// Show the menu visible to a role and permission set
    Menu {
        #[arg(long)]
        role: Option<String>,

        /// Granted permission, repeatable
        #[arg(long = "permission")]
        permissions: Vec<String>,

        /// Current path, to show selected and open keys
        #[arg(long)]
        path: Option<String>,
    },

    /// Decide how a context at --from reaches a route key
    Resolve {
        key: String,

        #[arg(long)]
        from: Url,

        /// Navigation triggered from the collapsed drawer
        #[arg(long)]
        drawer: bool,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Load a URL and import the credentials it carries
    Import { url: Url },

    /// Run the authentication gate on a URL
    Check { url: Url },

    /// Log in against the backend and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "ACCORD_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Run the full logout sequence from a context at --from
    Logout {
        #[arg(long)]
        from: Url,

        #[command(flatten)]
        credentials: CredentialArgs,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum EnvironmentArg {
    Development,
    Production,
}

impl From<EnvironmentArg> for Environment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Development => Environment::Development,
            EnvironmentArg::Production => Environment::Production,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accord_shell=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    let config = config::load(&args.config, args.environment.map(Into::into))?;
    let browser = config::browser(args.data_dir.as_deref())?;

    match args.command {
        Command::Validate => println!("{}", commands::validate(&config)?),
        Command::Config => print!("{}", commands::print_config(&config)?),
        Command::Menu {
            role,
            permissions,
            path,
        } => print!(
            "{}",
            commands::menu(&config, role.as_deref(), &permissions, path.as_deref())?
        ),
        Command::Resolve {
            key,
            from,
            drawer,
            credentials,
        } => {
            let presentation = if drawer {
                Presentation::Drawer
            } else {
                Presentation::Sidebar
            };
            let navigation =
                commands::resolve(&config, &browser, from, &key, &credentials, presentation)?;
            println!("{}", serde_json::to_string_pretty(&navigation)?);
        }
        Command::Import { url } => {
            let summary = commands::import(&browser, url)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Check { url } => {
            let summary = commands::check(&config, &browser, url)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Login { email, password } => {
            let (record, next) = commands::login(&config, &browser, &email, &password).await?;
            tracing::info!("Logged in as {}", record.display_name());
            println!("{next}");
        }
        Command::Logout { from, credentials } => {
            let report = commands::logout(&config, browser, from, &credentials).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
