use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mtl_data_explorer::app::{App, DownloadResult, ExportKind};
use mtl_data_explorer::catalog::filter_catalog;
use mtl_data_explorer::collector::CancelToken;
use mtl_data_explorer::config::{ConfigLoader, ResolvedConfig};
use mtl_data_explorer::domain::ResourceId;
use mtl_data_explorer::error::ExplorerError;
use mtl_data_explorer::i18n::{Key, Lang, group_thousands, t};
use mtl_data_explorer::output::{JsonOutput, OutputMode};
use mtl_data_explorer::transport::HttpTransport;
use mtl_data_explorer::tui::Tui;

#[derive(Parser)]
#[command(name = "mtl-data")]
#[command(about = "Explore and export Montréal open data (donnees.montreal.ca) resources")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true, value_enum)]
    lang: Option<Lang>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch every record of a datastore resource")]
    Fetch(FetchArgs),
    #[command(about = "Show resource metadata and row count")]
    Info(InfoArgs),
    #[command(about = "List portal datasets and their resources")]
    Catalog(CatalogArgs),
    #[command(about = "Save a resource: CSV for tabular data, the original file otherwise")]
    Download(DownloadArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Resource id or a portal URL containing `/resource/<id>`
    resource: String,

    #[arg(long)]
    max_rows: Option<usize>,

    /// Ignore any configured row cap
    #[arg(long, conflicts_with = "max_rows")]
    all: bool,

    /// Also write the records as CSV
    #[arg(long)]
    csv: bool,

    #[arg(long, short)]
    output: Option<Utf8PathBuf>,

    #[arg(long, default_value_t = 10)]
    preview: usize,
}

#[derive(Args)]
struct InfoArgs {
    resource: String,
}

#[derive(Args)]
struct CatalogArgs {
    #[arg(long)]
    refresh: bool,

    #[arg(long)]
    search: Option<String>,
}

#[derive(Args)]
struct DownloadArgs {
    resource: String,

    #[arg(long)]
    max_rows: Option<usize>,

    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ExplorerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ExplorerError) -> u8 {
    match error {
        ExplorerError::InvalidResourceId(_)
        | ExplorerError::EmptyResult(_)
        | ExplorerError::ConfigRead(_)
        | ExplorerError::ConfigParse(_) => 2,
        ExplorerError::Network { .. }
        | ExplorerError::DataRetrieval(_)
        | ExplorerError::Transport(_)
        | ExplorerError::Status { .. }
        | ExplorerError::Download(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let lang = cli.lang.unwrap_or(config.language);
    let app = App::new(HttpTransport::new()?, &config);

    match cli.command {
        Some(Commands::Fetch(args)) => run_fetch(args, app, &config, lang, output_mode),
        Some(Commands::Info(args)) => run_info(args, app, &config, lang, output_mode),
        Some(Commands::Catalog(args)) => run_catalog(args, app, &config, lang, output_mode),
        Some(Commands::Download(args)) => run_download(args, app, &config, output_mode),
        None => match output_mode {
            OutputMode::Interactive => {
                Tui::new(app, lang, config.default_max_rows).run(Vec::new())
            }
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `mtl-data --help`)",
            )),
        },
    }
}

fn run_fetch(
    args: FetchArgs,
    app: App<HttpTransport>,
    config: &ResolvedConfig,
    lang: Lang,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = args.resource.parse::<ResourceId>()?;
    let max_rows = if args.all {
        None
    } else {
        args.max_rows.or(config.default_max_rows)
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let fetched = app.fetch(&id, max_rows, &JsonOutput, &CancelToken::new())?;
            if args.csv || args.output.is_some() {
                let saved = app.save_csv(&fetched, "", args.output.as_deref(), &JsonOutput)?;
                JsonOutput::print_download(&saved).into_diagnostic()?;
            } else {
                JsonOutput::print_fetch(&fetched.summary(args.preview)).into_diagnostic()?;
            }
            Ok(())
        }
        OutputMode::Interactive => {
            let initial = match (args.all, max_rows) {
                (true, _) => format!("fetch {id} all"),
                (false, Some(max)) => format!("fetch {id} {max}"),
                (false, None) => format!("fetch {id}"),
            };
            Tui::new(app, lang, max_rows).run(vec![initial])
        }
    }
}

fn run_info(
    args: InfoArgs,
    app: App<HttpTransport>,
    config: &ResolvedConfig,
    lang: Lang,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = args.resource.parse::<ResourceId>()?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.info(&id, &JsonOutput);
            JsonOutput::print_info(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            Tui::new(app, lang, config.default_max_rows).run(vec![format!("info {id}")])
        }
    }
}

fn run_catalog(
    args: CatalogArgs,
    app: App<HttpTransport>,
    config: &ResolvedConfig,
    lang: Lang,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let mut result = app.catalog(args.refresh, &JsonOutput);
            if let Some(needle) = args.search.as_deref() {
                result.datasets = filter_catalog(&result.datasets, needle)
                    .into_iter()
                    .cloned()
                    .collect();
            }
            if result.count == 0 {
                tracing::warn!("{}", t(lang, Key::CatalogEmpty));
            }
            JsonOutput::print_catalog(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut initial = vec![if args.refresh {
                "catalog refresh".to_string()
            } else {
                "catalog".to_string()
            }];
            if let Some(needle) = args.search {
                initial.push(format!("search {needle}"));
            }
            Tui::new(app, lang, config.default_max_rows).run(initial)
        }
    }
}

fn run_download(
    args: DownloadArgs,
    app: App<HttpTransport>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = args.resource.parse::<ResourceId>()?;
    let max_rows = args.max_rows.or(config.default_max_rows);
    let result = app.export(
        &id,
        max_rows,
        args.output.as_deref(),
        &JsonOutput,
        &CancelToken::new(),
    )?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_download(&result).into_diagnostic()?,
        OutputMode::Interactive => print_download_summary(&result),
    }
    Ok(())
}

fn print_download_summary(result: &DownloadResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let kind = match result.kind {
        ExportKind::Csv => "CSV export",
        ExportKind::Raw => "original file",
    };
    println!("{cyan}{} {kind}{reset}", result.resource_id);
    println!("{green}saved {}{reset}", result.path);
    match result.rows {
        Some(rows) => println!(
            "   {} rows, {} bytes, {}",
            group_thousands(rows),
            group_thousands(result.bytes),
            result.mime
        ),
        None => println!("   {} bytes, {}", group_thousands(result.bytes), result.mime),
    }
}
