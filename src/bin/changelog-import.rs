//! changelog-import - Parse changelogs and import them into a changelog store
//!
//! Usage:
//!   changelog-import detect -f CHANGELOG.md
//!   changelog-import check -f CHANGELOG.md
//!   changelog-import preview -f CHANGELOG.md --format json
//!   changelog-import recommend -f CHANGELOG.md
//!   changelog-import import -f CHANGELOG.md --target my-project --store store.json
//!   cat CHANGELOG.md | changelog-import import --target my-project --strategy replace --replace-existing

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tokio_util::sync::CancellationToken;

use changelog_import::config::load_config;
use changelog_import::importer::{ChangelogImporter, RawImportOptions};
use changelog_import::store::{AllowAll, MemoryStore};

const DEFAULT_STORE_PATH: &str = "changelog-store.json";

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
}

#[derive(Parser)]
#[command(name = "changelog-import")]
#[command(version, about = "Parse changelogs and import them into a changelog store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Input changelog (reads from stdin if not specified)
    #[arg(short, long, value_name = "FILE", global = true)]
    file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Config file (defaults to $XDG_CONFIG_HOME/changelog-import/config.toml)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the changelog format
    Detect,
    /// Run the pre-flight content check
    Check,
    /// Parse and validate without importing
    Preview,
    /// Suggest import options for the input
    Recommend,
    /// Import the input into a store
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Destination changelog identifier
    #[arg(short, long)]
    target: String,

    /// JSON store file (overrides store_path from the config)
    #[arg(short, long, value_name = "STORE")]
    store: Option<PathBuf>,

    /// Actor recorded for the permission check (defaults to $USER)
    #[arg(long)]
    actor: Option<String>,

    #[arg(long, value_parser = ["merge", "replace", "append"])]
    strategy: Option<String>,

    #[arg(long, value_parser = ["skip", "overwrite", "prompt"])]
    conflict_resolution: Option<String>,

    #[arg(long, value_parser = ["preserve", "current", "sequence"])]
    date_handling: Option<String>,

    /// Number versionless entries after the highest existing version
    #[arg(long)]
    auto_versions: bool,

    /// Import entries unpublished
    #[arg(long)]
    no_publish: bool,

    /// With --strategy replace, delete the existing entries
    #[arg(long)]
    replace_existing: bool,

    /// Tag added to every imported entry (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,
}

impl ImportArgs {
    /// Options given on the command line; unset flags leave the config value alone
    fn raw_options(&self) -> RawImportOptions {
        RawImportOptions {
            strategy: self.strategy.clone(),
            conflict_resolution: self.conflict_resolution.clone(),
            date_handling: self.date_handling.clone(),
            auto_generate_versions: self.auto_versions.then_some(true),
            publish_imported_entries: self.no_publish.then_some(false),
            preserve_existing_entries: self.replace_existing.then_some(false),
            default_tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
        }
    }
}

fn init_logger(filter_level: log::LevelFilter, logfile: Option<&Path>) -> Result<()> {
    let mut loggers = vec![simplelog::TermLogger::new(
        filter_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ) as Box<dyn simplelog::SharedLogger>];
    if let Some(path) = logfile {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        loggers.push(simplelog::WriteLogger::new(
            filter_level,
            simplelog::Config::default(),
            file,
        ));
    }
    simplelog::CombinedLogger::init(loggers)?;
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(cli.verbose.log_level_filter(), cli.log_file.as_deref())?;

    let loaded = load_config(cli.config.as_deref())?;
    let content = read_input(cli.file.as_deref())?;
    let json = cli.format == OutputFormat::Json;

    match &cli.command {
        Commands::Detect => {
            let importer = ChangelogImporter::new(Arc::new(MemoryStore::new()), Arc::new(AllowAll));
            let detection = importer.detect_format(&content);
            if json {
                println!("{}", serde_json::to_string_pretty(&detection)?);
            } else {
                println!("Format:     {}", detection.format);
                println!("Confidence: {:.2}", detection.confidence);
                for characteristic in &detection.characteristics {
                    println!("  - {}", characteristic);
                }
                let s = &detection.structure;
                println!("Version headers: {}", s.has_version_headers);
                println!("Date headers:    {}", s.has_date_headers);
                println!("Type headers:    {}", s.has_type_headers);
                println!("Lists:           {}", s.uses_list_format);
                println!("Markdown:        {}", s.uses_markdown_syntax);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check => {
            let importer = ChangelogImporter::new(Arc::new(MemoryStore::new()), Arc::new(AllowAll));
            let check = importer.validate_content(&content);
            if json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                println!("Size:      {} bytes, {} lines", check.stats.size_bytes, check.stats.line_count);
                println!("Headings:  {}", check.stats.heading_count);
                println!("List items: {}", check.stats.list_item_count);
                println!("Links:     {}", check.stats.link_count);
                println!("Estimated entries: {}", check.stats.estimated_entries);
                for warning in &check.warnings {
                    println!("⚠ {}", warning);
                }
                for error in &check.errors {
                    println!("✗ {}", error);
                }
            }
            Ok(if check.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Preview => {
            let importer = ChangelogImporter::new(Arc::new(MemoryStore::new()), Arc::new(AllowAll));
            let outcome = match importer.preview_import(&content) {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("✗ {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("Format: {}\n", outcome.parsed.metadata.original_format);
                for validated in &outcome.validated_entries {
                    let entry = &validated.entry;
                    let marker = if validated.is_valid { "✓" } else { "✗" };
                    let date = entry
                        .published_at
                        .as_ref()
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{} {} [{}] ({})",
                        marker,
                        entry.title,
                        entry.version_str().unwrap_or("-"),
                        date
                    );
                }
                println!();
                print!("{}", outcome.preview.to_text());
                for warning in &outcome.parsed.metadata.parse_warnings {
                    println!("⚠ {}", warning);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Recommend => {
            let importer = ChangelogImporter::new(Arc::new(MemoryStore::new()), Arc::new(AllowAll));
            let advice = importer.get_import_recommendations(&content);
            if json {
                println!("{}", serde_json::to_string_pretty(&advice)?);
            } else {
                let options = &advice.recommended_options;
                println!("Strategy:            {}", advice.recommended_strategy);
                println!("Conflict resolution: {}", options.conflict_resolution);
                println!("Date handling:       {}", options.date_handling);
                println!("Auto versions:       {}", options.auto_generate_versions);
                for warning in &advice.warnings {
                    println!("⚠ {}", warning);
                }
                for suggestion in &advice.suggestions {
                    println!("ℹ {}", suggestion);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Import(args) => {
            let store_path = args
                .store
                .clone()
                .or_else(|| loaded.config.store_path().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
            let store = Arc::new(
                MemoryStore::load(&store_path)
                    .with_context(|| format!("failed to load store {}", store_path.display()))?,
            );

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, cancelling import");
                    ctrl_c.cancel();
                }
            });

            let importer = ChangelogImporter::new(store.clone(), Arc::new(AllowAll))
                .with_cancellation(cancel);
            let options = loaded.config.import.clone().merged_with(args.raw_options());
            let actor = args
                .actor
                .clone()
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "cli".to_string());

            let outcome = match importer
                .perform_complete_import(&content, &args.target, &options, &actor)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("✗ {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };

            store
                .save(&store_path)
                .with_context(|| format!("failed to save store {}", store_path.display()))?;

            if json {
                println!("{}", outcome.result.to_json()?);
            } else {
                print!("{}", outcome.result.to_text());
            }
            Ok(if outcome.result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
