pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stratus_core::config::{AppConfig, ConfigOverrides, LogFormat};

use commands::deploy::DeployArgs;
use commands::edit::EditArgs;
use commands::history::HistoryArgs;
use commands::state::StateArgs;
use commands::synthesize::SynthesizeArgs;
use commands::{CommandResult, GlobalOptions};

#[derive(Debug, Parser)]
#[command(
    name = "stratus",
    about = "Stratus infrastructure synthesis CLI",
    long_about = "Turn natural-language infrastructure requests into Terraform, provision it, and inspect the result.",
    after_help = "Examples:\n  stratus synthesize --project shop --prompt \"serverless API with a DynamoDB table\"\n  stratus edit --project shop --prompt \"add an SQS queue for order events\"\n  stratus deploy --project shop --action plan\n  stratus state --project shop\n  stratus doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a stratus.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override terraform.workspaces_dir")]
    workspaces_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Block provisioning on graph issues or unsafe IaC")]
    strict: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the agent on a prompt, save the next architecture version, and write the workspace")]
    Synthesize(SynthesizeArgs),
    #[command(about = "Modify the latest architecture from a prompt and save it as the next version")]
    Edit(EditArgs),
    #[command(about = "Run terraform init plus plan, apply, or destroy for the latest architecture")]
    Deploy(DeployArgs),
    #[command(about = "Show resources and outputs from the project's terraform state")]
    State(StateArgs),
    #[command(about = "List deployment runs for a project, newest first")]
    History(HistoryArgs),
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Check config, database, terraform binary, and model credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                workspaces_dir: self.workspaces_dir.clone(),
                strict_validation: self.strict.then_some(true),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let options = cli.global_options();
    init_logging(&options)?;

    let result = match &cli.command {
        Command::Synthesize(args) => commands::synthesize::run(&options, args),
        Command::Edit(args) => commands::edit::run(&options, args),
        Command::Deploy(args) => commands::deploy::run(&options, args),
        Command::State(args) => commands::state::run(&options, args),
        Command::History(args) => commands::history::run(&options, args),
        Command::Migrate => commands::migrate::run(&options),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&options) },
        Command::Doctor { json } => {
            CommandResult { exit_code: 0, output: commands::doctor::run(&options, *json) }
        }
    };

    println!("{}", result.output);
    Ok(ExitCode::from(result.exit_code))
}

/// Logs go to stderr so stdout stays a single JSON envelope. An unloadable config falls
/// back to defaults here; the command itself reports the config error.
fn init_logging(options: &GlobalOptions) -> anyhow::Result<()> {
    use tracing::Level;

    let logging = AppConfig::load(options.load_options())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);
    let installed = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|error| anyhow::anyhow!("failed to initialize logging: {error}"))
}
