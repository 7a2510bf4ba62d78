use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use discover_check_cli::config::{AppConfig, CliOverrides, ConfigManager};
use discover_check_cli::error::{CliError, CliResult, ExitCode};
use discover_check_cli::orchestrators::{CommpOrchestrator, ValidateOptions, ValidateOrchestrator};
use discover_check_cli::output::{self, OutputFormat, verdict_banner};
use discover_check_cli::terminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "discover-check")]
#[command(author, version, about = "Filecoin Discover drive validator", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file to use instead of the default location
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every car file on a mounted drive and store the report
    Validate {
        /// Mountpoint of the drive
        mountpoint: PathBuf,

        /// Payload catalog (37-byte records)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Directory receiving the JSON report
        #[arg(long, value_name = "DIR")]
        report_dir: Option<PathBuf>,

        /// Report under this identifier instead of the device serial
        #[arg(long, value_name = "ID")]
        drive_id: Option<String>,

        /// Patterns relative to the drive root to leave out (repeatable)
        #[arg(short = 'e', long = "exclude", value_name = "PATTERN")]
        exclude_patterns: Vec<String>,

        /// Concurrent commitment passes
        #[arg(long, value_name = "N")]
        commitment_workers: Option<usize>,

        /// Concurrent structure checks
        #[arg(long, value_name = "N")]
        structure_workers: Option<usize>,

        /// Flawless files required before the drive may ship
        #[arg(long, value_name = "N")]
        ship_threshold: Option<usize>,

        /// Background leaf hashers per commitment pass
        #[arg(long, value_name = "N")]
        async_hashers: Option<usize>,

        /// Accept a plain directory instead of a mounted drive root
        #[arg(long)]
        any_directory: bool,

        /// Output format for the summary
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Disable progress bar display
        #[arg(long)]
        no_progress: bool,
    },

    /// Compute the piece commitment of a single file
    Commp {
        /// File to commit to
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Background leaf hashers
        #[arg(long, value_name = "N")]
        async_hashers: Option<usize>,

        /// Disable progress bar display
        #[arg(long)]
        no_progress: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file location
    Path,

    /// Print one value (e.g. validator.ship_threshold)
    Get { key: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(log::LevelFilter::Debug)
            .filter_module("discover_check_core", log::LevelFilter::Debug)
            .filter_module("discover_check_cli", log::LevelFilter::Debug)
            .format_timestamp_millis()
            .init();
        eprintln!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let debug = cli.debug;
    let code = match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprint!("{}", error.format_for_user(debug));
            error.exit_code()
        }
    };
    std::process::exit(code.code());
}

async fn run(cli: Cli) -> CliResult<ExitCode> {
    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };

    match cli.command {
        Commands::Validate {
            mountpoint,
            catalog,
            report_dir,
            drive_id,
            exclude_patterns,
            commitment_workers,
            structure_workers,
            ship_threshold,
            async_hashers,
            any_directory,
            format,
            no_progress,
        } => {
            let mut config = manager.load()?;
            config.apply_cli_overrides(&CliOverrides {
                catalog,
                report_dir,
                commitment_workers,
                structure_workers,
                ship_threshold,
                async_hashers,
                any_directory,
            });

            let options = ValidateOptions {
                mountpoint,
                drive_identifier: drive_id,
                exclude_patterns,
                show_progress: !no_progress && terminal::should_show_progress_by_default(),
            };
            validate_command(config, options, format).await
        }
        Commands::Commp {
            file,
            format,
            async_hashers,
            no_progress,
        } => {
            let mut config = manager.load()?;
            config.apply_cli_overrides(&CliOverrides {
                async_hashers,
                ..CliOverrides::default()
            });
            let show_progress = !no_progress && terminal::should_show_progress_by_default();

            let result = CommpOrchestrator::new(config.engine, show_progress)
                .run(&file)
                .await?;
            let rendered = output::formatter(format, terminal::stdout_is_terminal())
                .format_commp(&result)?;
            println!("{}", rendered.trim_end());
            Ok(ExitCode::Success)
        }
        Commands::Config { command } => {
            config_command(&manager, command)?;
            Ok(ExitCode::Success)
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(ExitCode::Success)
        }
    }
}

async fn validate_command(
    config: AppConfig,
    options: ValidateOptions,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    let use_color = terminal::stdout_is_terminal();
    let outcome = ValidateOrchestrator::new(config).run(options).await?;

    let rendered = output::formatter(format, use_color).format_summary(&outcome.summary)?;
    println!("{}", rendered.trim_end());

    if let Some(ref location) = outcome.report_location {
        eprintln!("Report stored at {location}");
    }

    let banner = verdict_banner(
        &outcome.summary,
        outcome.report_location.is_some(),
        use_color,
    );
    match format {
        OutputFormat::Text => println!("{banner}"),
        // keep stdout parseable
        OutputFormat::Json => eprintln!("{banner}"),
    }

    Ok(if outcome.is_success() {
        ExitCode::Success
    } else {
        ExitCode::Failure
    })
}

fn config_command(manager: &ConfigManager, command: ConfigCommand) -> CliResult<()> {
    match command {
        ConfigCommand::Show => {
            print!("{}", manager.show()?);
        }
        ConfigCommand::Path => {
            println!("{}", manager.get_config_path().display());
        }
        ConfigCommand::Get { key } => match manager.get(&key) {
            Ok(value) => println!("{value}"),
            Err(e) => return Err(CliError::misuse(&format!("{e:#}"))),
        },
    }
    Ok(())
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
