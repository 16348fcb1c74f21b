//! Command-line front end: run one automaton and print its result as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use promptdriver::config::Settings;
use promptdriver::program::{ConfigEditor, FailureMode, SilentInstaller};
use promptdriver::report::{JsonReporter, ResultReporter};
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptdriver")]
#[command(author, version, about = "Drive prompt-based CLI programs and report the result as JSON", long_about = None)]
struct Cli {
    /// TOML file with timeouts and limits
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run commands in a password-protected configuration tool
    ConfigEditor(ConfigEditorArgs),
    /// Run a silent installer
    Installer(InstallerArgs),
}

#[derive(Args)]
struct Credentials {
    /// Password sent to the program
    #[arg(long, env = "PROMPTDRIVER_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct ConfigEditorArgs {
    /// Path to the configuration tool
    #[arg(long)]
    path: String,

    /// Extra arguments for the tool
    #[arg(long, default_value = "")]
    option_string: String,

    /// Command to run (repeatable, run in order)
    #[arg(long = "command")]
    commands: Vec<String>,

    /// Budget in seconds for the long-running steps
    #[arg(long)]
    timeout: Option<u64>,

    #[command(flatten)]
    credentials: Credentials,
}

#[derive(Args)]
struct InstallerArgs {
    /// Path to the installer
    #[arg(long)]
    path: String,

    /// Budget in seconds for the installation
    #[arg(long)]
    timeout: Option<u64>,

    /// Answer "no" to continuation questions once an error was reported
    #[arg(long)]
    strict: bool,

    /// Inject a deliberate failure (bad-password, timeout, abort-on-error, early-exit)
    #[arg(long)]
    failure_mode: Option<FailureMode>,

    #[command(flatten)]
    credentials: Credentials,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let result = match cli.command {
        Command::ConfigEditor(args) => {
            let mut editor = ConfigEditor::new(args.path, secret(args.credentials))
                .options(args.option_string)
                .commands(args.commands)
                .settings(settings);
            if let Some(secs) = args.timeout {
                editor = editor.timeout(Duration::from_secs(secs));
            }
            editor.run().await
        }
        Command::Installer(args) => {
            let mut installer = SilentInstaller::new(args.path, secret(args.credentials))
                .strict(args.strict)
                .failure_mode(args.failure_mode)
                .settings(settings);
            if let Some(secs) = args.timeout {
                installer = installer.timeout(Duration::from_secs(secs));
            }
            installer.run().await
        }
    };

    let succeeded = JsonReporter::new(std::io::stdout().lock())
        .report(&result)
        .context("writing result")?;

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn secret(credentials: Credentials) -> SecretString {
    SecretString::from(credentials.password)
}
