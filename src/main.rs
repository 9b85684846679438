use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use devswitch::{
    commands,
    config::Config,
    error::exit_code_for,
    paths::Paths,
    ui::{ColorMode, Ui},
};

/// Environment variable holding a tracing filter, e.g. `devswitch=debug`
const LOG_ENV: &str = "DEVSWITCH_LOG";

#[derive(Parser)]
#[command(name = "devswitch")]
#[command(about = "Switch developer profiles (git, shell, editor and tool configs) in one step")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all available profiles
    List,

    /// Show the active profile and whether the live files still match it
    Current,

    /// Switch to a profile (make its files the live files)
    #[command(visible_aliases = ["apply", "use"])]
    Switch {
        /// Name of the profile to activate
        name: String,

        /// Only switch these targets (comma-separated, e.g. gitconfig,vscode)
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<String>>,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a new profile from the current files or a template
    Create {
        /// Name of the profile to create
        name: String,

        /// Start from a built-in template: corporate, personal, minimal
        #[arg(long, conflicts_with_all = ["only", "select"])]
        template: Option<String>,

        /// Capture only these targets (comma-separated)
        #[arg(long, value_delimiter = ',', conflicts_with = "select")]
        only: Option<Vec<String>>,

        /// Pick the targets to capture interactively
        #[arg(long)]
        select: bool,

        /// Short description shown by `list` and `inspect`
        #[arg(long, short)]
        description: Option<String>,
    },

    /// Show detailed information about a profile
    Inspect {
        /// Name of the profile to inspect
        name: String,
    },

    /// Compare two profiles, or a profile with the live files
    Diff {
        /// First profile
        left: String,

        /// Second profile (defaults to the live files)
        right: Option<String>,
    },

    /// Manage snapshots of the live files
    Backup {
        #[command(subcommand)]
        action: Option<BackupAction>,
    },

    /// Restore the live files from a snapshot (latest by default)
    Rollback {
        /// Snapshot id from `devswitch backup list`
        id: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Remove a profile
    Remove {
        /// Name of the profile to remove
        name: String,

        /// Skip confirmation; also allows removing the active profile
        #[arg(long, short)]
        force: bool,
    },

    /// Rename a profile
    Rename {
        /// Current name
        old_name: String,

        /// New name
        new_name: String,
    },

    /// Run diagnostics on the devswitch setup
    Doctor,

    /// List the files devswitch can manage
    Targets,

    /// Print a shell completion script
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Snapshot the live files now (default)
    Create,

    /// List snapshots, newest first
    List,

    /// Delete old snapshots
    Clean {
        /// Number of snapshots to keep
        #[arg(long, default_value_t = 5)]
        keep: usize,
    },
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("devswitch={}", level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli, ui: &Ui) -> Result<()> {
    let paths = Paths::new()?;
    // Read lazily so `doctor` can still report a broken config file
    let config = || Config::read(&paths.config_file);

    match cli.command {
        Commands::List => commands::list(&paths, ui),
        Commands::Current => commands::current(&paths, ui),
        Commands::Switch {
            name,
            only,
            dry_run,
        } => commands::switch(&paths, &config()?, &name, only, dry_run, ui),
        Commands::Create {
            name,
            template,
            only,
            select,
            description,
        } => commands::create(&paths, &name, template, only, select, description, ui),
        Commands::Inspect { name } => commands::inspect(&paths, &name, ui),
        Commands::Diff { left, right } => commands::diff(&paths, &left, right.as_deref(), ui),
        Commands::Backup { action } => match action.unwrap_or(BackupAction::Create) {
            BackupAction::Create => commands::backup_create(&paths, &config()?, ui),
            BackupAction::List => commands::backup_list(&paths, ui),
            BackupAction::Clean { keep } => commands::backup_clean(&paths, keep, ui),
        },
        Commands::Rollback { id, yes } => commands::rollback(&paths, id.as_deref(), yes, ui),
        Commands::Remove { name, force } => commands::remove(&paths, &name, force, ui),
        Commands::Rename { old_name, new_name } => {
            commands::rename(&paths, &old_name, &new_name, ui)
        }
        Commands::Doctor => commands::doctor(&paths, ui),
        Commands::Targets => commands::targets(&paths, &config()?, ui),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let ui = Ui::new(cli.color, cli.no_color).with_quiet(cli.quiet);

    if let Err(e) = run(cli, &ui) {
        tracing::debug!(error = ?e, "command failed");
        ui.err(format!("{:#}", e));
        std::process::exit(exit_code_for(&e));
    }
}
