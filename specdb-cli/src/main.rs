//! specdb CLI - specimen collection records
//!
//! This is the main entry point for the specdb command-line tool, which provides:
//! - The HTTP service (`serve`)
//! - Schema migrations (`migrate`)
//! - Specimen report and table exports (`export`)
//! - Validated bulk imports from CSV/XLSX (`import`)
//! - Spreadsheet and database backups (`backup`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use specdb_core::SpecdbConfig;

mod commands;
mod tracing_setup;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "specdb",
    author,
    version,
    about = "Specimen collection records: serve, import, export and back up",
    long_about = "Manage a specimen collection database. Serve the web API, import \
                  spreadsheets with row-level validation, export filtered reports and \
                  keep rolling backups."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress progress spinners
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Config file (default: ~/.specdb/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Apply pending database migrations
    Migrate(commands::migrate::MigrateArgs),
    /// Export the specimen report or a raw table to CSV/XLSX
    Export(commands::export::ExportArgs),
    /// Validate and import a CSV/XLSX file
    Import(commands::import::ImportArgs),
    /// Back up the core tables and prune old copies
    Backup(commands::backup::BackupArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Load `.env` from the working directory, then `~/.specdb/.env`.
fn load_env_files() {
    dotenvy::dotenv().ok();
    if let Some(home) = dirs::home_dir() {
        dotenvy::from_path(home.join(".specdb").join(".env")).ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_files();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();
    ui::init_quiet_mode(cli.quiet);

    let config_path = cli.config;
    let settings = || SpecdbConfig::load(config_path.as_deref());
    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, settings()?).await?,
        Commands::Migrate(args) => commands::run_migrate(args, settings()?).await?,
        Commands::Export(args) => commands::run_export(args, settings()?).await?,
        Commands::Import(args) => commands::run_import(args, settings()?).await?,
        Commands::Backup(args) => commands::run_backup(args, settings()?).await?,
        Commands::Completions(args) => run_completions(args)?,
    }
    Ok(())
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}
