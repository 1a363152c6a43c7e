//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use stixgraph_core::pipeline::{BuildRun, EnrichRun, ProgressReporter, run_build, run_enrich};
use stixgraph_shared::{AppConfig, DataPaths, init_config, load_config, load_config_from};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// stixgraph: STIX 2.1 graph assembly for extracted news articles.
#[derive(Parser)]
#[command(
    name = "stixgraph",
    version,
    about = "Assemble extracted threat-intel candidates into a STIX 2.1 bundle and enrich it with authors.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to load instead of ~/.stixgraph/stixgraph.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the default input and output documents.
    #[arg(long, env = "STIXGRAPH_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build a bundle and manifest from extraction output.
    Build {
        /// Extraction document (required to exist).
        #[arg(long)]
        extracted: Option<PathBuf>,

        /// Cleaned-article side table.
        #[arg(long)]
        cleaned: Option<PathBuf>,

        /// Included-row side table.
        #[arg(long)]
        included: Option<PathBuf>,

        /// Where to write the bundle.
        #[arg(long)]
        out_bundle: Option<PathBuf>,

        /// Where to write the build manifest.
        #[arg(long)]
        out_manifest: Option<PathBuf>,

        /// Process at most this many articles.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Add byline authors to an existing bundle.
    Enrich {
        /// Bundle to read.
        #[arg(long)]
        in_bundle: Option<PathBuf>,

        /// Where to write the enriched bundle.
        #[arg(long)]
        out_bundle: Option<PathBuf>,

        /// Directory relative raw text paths resolve against.
        #[arg(long)]
        raw_base: Option<PathBuf>,

        /// Run the pass and print the summary without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "stixgraph=info",
        1 => "stixgraph=debug",
        _ => "stixgraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let paths = DataPaths::from(&config);

    match cli.command {
        Command::Build {
            extracted,
            cleaned,
            included,
            out_bundle,
            out_manifest,
            limit,
        } => {
            let run = BuildRun {
                extracted: extracted.unwrap_or(paths.extracted),
                cleaned: cleaned.unwrap_or(paths.cleaned),
                included: included.unwrap_or(paths.included),
                out_bundle: out_bundle.unwrap_or(paths.bundle),
                out_manifest: out_manifest.unwrap_or(paths.manifest),
                creator_name: config.creator.name.clone(),
                embed_clean_text: config.build.embed_clean_text,
                limit: limit.or(Some(config.build.limit)).filter(|&n| n > 0),
            };
            cmd_build(&run)
        }
        Command::Enrich {
            in_bundle,
            out_bundle,
            raw_base,
            dry_run,
        } => {
            let run = EnrichRun {
                in_bundle: in_bundle.unwrap_or(paths.bundle),
                out_bundle: out_bundle.unwrap_or(paths.enriched_bundle),
                raw_base,
                creator_name: config.creator.name.clone(),
                dry_run,
            };
            cmd_enrich(&run)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Load the config file and apply the global overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(eyre!("config file not found: {}", path.display()));
            }
            load_config_from(path)?
        }
        None => load_config()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.display().to_string();
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_build(run: &BuildRun) -> Result<()> {
    if !run.extracted.exists() {
        return Err(eyre!(
            "extracted input not found: {} (pass --extracted or set --data-dir)",
            run.extracted.display()
        ));
    }
    info!(
        extracted = %run.extracted.display(),
        out_bundle = %run.out_bundle.display(),
        "building bundle"
    );

    let progress = CliProgress::new();
    let result = run_build(run, &progress);
    progress.finish();
    let summary = result?;

    println!("{summary}");
    if summary.dangling_refs > 0 {
        eprintln!("warning: {} dangling reference(s) in bundle", summary.dangling_refs);
    }
    Ok(())
}

fn cmd_enrich(run: &EnrichRun) -> Result<()> {
    if !run.in_bundle.exists() {
        return Err(eyre!(
            "input bundle not found: {} (run `stixgraph build` first or pass --in-bundle)",
            run.in_bundle.display()
        ));
    }
    info!(
        in_bundle = %run.in_bundle.display(),
        out_bundle = %run.out_bundle.display(),
        dry_run = run.dry_run,
        "enriching bundle"
    );

    let progress = CliProgress::new();
    let result = run_enrich(run, &progress);
    progress.finish();
    let summary = result?;

    println!(
        "changed_reports={} added_identities={} added_relationships={} updated_notes={}",
        summary.changed_reports,
        summary.added_identities,
        summary.added_relationships,
        summary.updated_notes
    );
    if run.dry_run {
        println!("dry run: nothing written");
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Spinner for phases that switches to a bar once the item count is known.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_style(spinner_style());
        self.bar.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, label: &str) {
        if current <= 1 {
            self.bar.set_style(bar_style());
            self.bar.set_length(total as u64);
        }
        self.bar.set_position(current as u64);
        self.bar.set_message(label.to_string());
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
