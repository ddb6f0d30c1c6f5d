// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use panelglot::app_config::{self, Config};
use panelglot::Controller;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect and translate text in every image under a directory
    #[command(alias = "translate")]
    Run(RunArgs),

    /// Check the configured providers (configuration and connectivity)
    Validate,

    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completions for panelglot
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove every cached entry
    Clear,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Directory of images to process
    #[arg(value_name = "DIR")]
    input_dir: PathBuf,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Provider used for detection and translation (e.g. 'openai', 'ollama')
    #[arg(short, long)]
    provider: Option<String>,

    /// Model name for the selected provider
    #[arg(short, long)]
    model: Option<String>,

    /// Source language tag (e.g. 'ja', 'ko')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language tag (e.g. 'en', 'zh-CN')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Skip the durable cache for this run
    #[arg(long)]
    no_cache: bool,
}

/// panelglot - OCR and translation for comic pages
///
/// Detects text regions in images with vision models and translates them,
/// caching results and retrying transient provider failures.
#[derive(Parser, Debug)]
#[command(name = "panelglot")]
#[command(version)]
#[command(about = "Detect and translate text in comic pages with AI providers")]
#[command(long_about = "panelglot detects text in images with vision models and translates it.

EXAMPLES:
    panelglot run ./chapter-01                  # Translate using default config
    panelglot run -f ./chapter-01               # Force overwrite existing output
    panelglot run -p ollama -m llava ./pages    # Use a specific provider and model
    panelglot run -s ja -t en ./pages           # Translate from Japanese to English
    panelglot validate                          # Check provider configuration
    panelglot cache stats                       # Show cache statistics
    panelglot completions bash > panelglot.bash # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically.

SUPPORTED PROVIDERS:
    openai - OpenAI-compatible API (requires API key)
    ollama - Local Ollama server with a vision model (default: llava)
    mock   - Offline mock provider for dry runs")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI colour for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is loaded.
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "panelglot", &mut std::io::stdout());
            Ok(())
        }
        Commands::Run(args) => {
            let config = load_config(&cli.config_path, cli.log_level.as_ref())?;
            run(config, args).await
        }
        Commands::Validate => {
            let config = load_config(&cli.config_path, cli.log_level.as_ref())?;
            validate(config).await
        }
        Commands::Cache { action } => {
            let config = load_config(&cli.config_path, cli.log_level.as_ref())?;
            cache(config, action).await
        }
    }
}

/// Load the config file, creating a default one when it does not exist
fn load_config(config_path: &str, cli_log_level: Option<&CliLogLevel>) -> Result<Config> {
    let path = Path::new(config_path);
    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        config.save(path)?;
        config
    };

    match cli_log_level {
        Some(level) => config.log_level = level.clone().into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    Ok(config)
}

async fn run(mut config: Config, args: RunArgs) -> Result<()> {
    if let Some(provider) = &args.provider {
        config.detection.provider = provider.to_lowercase();
        if config.get_provider_config(provider).is_none() {
            config.providers.push(app_config::ProviderConfig::new(&config.detection.provider));
        }
    }

    if let Some(model) = &args.model {
        let provider_type = config.detection.provider.clone();
        if let Some(provider_config) = config
            .providers
            .iter_mut()
            .find(|p| p.provider_type.eq_ignore_ascii_case(&provider_type))
        {
            provider_config.model = model.clone();
        }
    }

    if let Some(source_language) = &args.source_language {
        config.source_language = Some(source_language.clone());
    }

    if let Some(target_language) = &args.target_language {
        config.target_language = target_language.clone();
    }

    if args.no_cache {
        config.cache.durable = false;
    }

    config.validate().context("Configuration validation failed")?;

    if !args.input_dir.is_dir() {
        return Err(anyhow!("Input path is not a directory: {:?}", args.input_dir));
    }

    let controller = Controller::with_config(config)?;
    controller.initialize().await?;

    let result = controller.run_folder(args.input_dir, args.force_overwrite).await;
    controller.shutdown().await;

    let progress = result?;
    if progress.failed > 0 {
        error!("{} of {} images failed", progress.failed, progress.processed);
    }
    Ok(())
}

async fn validate(config: Config) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let controller = Controller::with_config(config)?;

    let mut failures = 0;
    for check in controller.validate_providers().await {
        if check.is_ok() {
            info!("✅ {}: {}", check.provider_type, check.report.message);
        } else if !check.report.is_valid {
            failures += 1;
            error!("{}: {}", check.provider_type, check.report.message);
        } else if let Some(init_error) = &check.init_error {
            failures += 1;
            error!(
                "{}: {} ({})",
                check.provider_type,
                init_error,
                init_error.kind.remediation_hint()
            );
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} provider(s) failed validation", failures));
    }
    Ok(())
}

async fn cache(config: Config, action: CacheAction) -> Result<()> {
    if !config.cache.durable {
        warn!("The durable cache is disabled in the configuration");
    }
    let controller = Controller::with_config(config)?;

    match action {
        CacheAction::Stats => {
            let (memory, durable) = controller.cache_stats().await?;
            match durable {
                Some(stats) => {
                    info!(
                        "Durable cache: {} entries ({} expired, {} queued offline), {} bytes on disk",
                        stats.entry_count, stats.expired_count, stats.queued_count, stats.file_size_bytes
                    );
                }
                None => info!("Durable cache: disabled"),
            }
            info!("Session cache: {}", serde_json::to_string(&memory)?);
        }
        CacheAction::Clear => {
            let removed = controller.clear_cache().await?;
            info!("Removed {} cached entries", removed);
        }
    }

    controller.shutdown().await;
    Ok(())
}
