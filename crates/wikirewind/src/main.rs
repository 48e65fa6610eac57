use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wikirewind_core::config::{DEFAULT_CONFIG_PATH, load_config, write_default_config};
use wikirewind_core::history::{HistorySettings, WikipediaHistory};
use wikirewind_core::timestamp::parse_cutoff_date;
use wikirewind_core::tool::{ToolRequest, search_wikipedia, today_cutoff_date, tool_descriptor};

const DEFAULT_LOG_FILTER: &str = "wikirewind=info,wikirewind_core=info";

#[derive(Debug, Parser)]
#[command(
    name = "wikirewind",
    version,
    about = "Read Wikipedia articles as they stood before a given date"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "CODE", help = "Wikipedia language edition")]
    lang: Option<String>,
    #[arg(long, global = true, value_name = "N", help = "Maximum number of articles")]
    limit: Option<usize>,
    #[arg(long, global = true, help = "Keep raw wikitext instead of plain text")]
    raw: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    lang: Option<String>,
    limit: Option<usize>,
    raw: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            lang: cli.lang.clone(),
            limit: cli.limit,
            raw: cli.raw,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Write a config file with every default spelled out")]
    Init(InitArgs),
    #[command(about = "Search Wikipedia as it stood before a cutoff date")]
    Search(SearchArgs),
    #[command(about = "Run the search_wikipedia tool with JSON arguments read from stdin")]
    Call,
    #[command(about = "Print the search_wikipedia tool descriptor as JSON")]
    Schema,
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct SearchArgs {
    query: String,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Cutoff date (default: today)")]
    cutoff_date: Option<String>,
    #[arg(long, help = "Print article records as JSON instead of text")]
    json: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Search(args)) => run_search(&runtime, args),
        Some(Commands::Call) => run_call(&runtime),
        Some(Commands::Schema) => run_schema(),
        Some(Commands::Config) => run_config(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let config_path = runtime.config_path();
    if write_default_config(&config_path, args.force)? {
        println!("wrote {}", normalize_path(&config_path));
    } else {
        println!(
            "config already exists at {} (use --force to overwrite)",
            normalize_path(&config_path)
        );
    }
    Ok(())
}

fn run_search(runtime: &RuntimeOptions, args: SearchArgs) -> Result<()> {
    let settings = resolve_settings(runtime)?;

    if args.json {
        let cutoff_date = args.cutoff_date.unwrap_or_else(today_cutoff_date);
        let end_date = parse_cutoff_date(&cutoff_date)?;
        let records = WikipediaHistory::new(settings).search(&args.query, end_date)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let mut request = ToolRequest::new(&args.query);
    request.cutoff_date = args.cutoff_date;
    println!("{}", search_wikipedia(&request, &settings));
    Ok(())
}

fn run_call(runtime: &RuntimeOptions) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read tool arguments from stdin")?;
    let arguments: serde_json::Value =
        serde_json::from_str(&input).context("tool arguments must be a JSON object")?;
    let request = ToolRequest::from_json(arguments)?;
    println!("{}", search_wikipedia(&request, &settings));
    Ok(())
}

fn run_schema() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&tool_descriptor())?);
    Ok(())
}

fn run_config(runtime: &RuntimeOptions) -> Result<()> {
    let config_path = runtime.config_path();
    let settings = resolve_settings(runtime)?;
    println!(
        "# config: {} (present: {})",
        normalize_path(&config_path),
        format_flag(config_path.exists())
    );
    println!(
        "# access token: {}",
        format_flag(settings.access_token.is_some())
    );
    print!(
        "{}",
        toml::to_string_pretty(&settings).context("failed to render settings")?
    );
    Ok(())
}

fn resolve_settings(runtime: &RuntimeOptions) -> Result<HistorySettings> {
    let config_path = runtime.config_path();
    let config = load_config(&config_path)?;
    tracing::debug!(path = %normalize_path(&config_path), "loaded configuration");

    let mut settings = config.settings();
    if let Some(lang) = &runtime.lang {
        settings = settings.with_language(lang);
    }
    if let Some(limit) = runtime.limit {
        if limit == 0 {
            bail!("--limit must be at least 1");
        }
        settings.limit = limit;
    }
    if runtime.raw {
        settings.strip_markup = false;
    }
    Ok(settings)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
