use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "llm-docs-translator",
    version,
    about = "Incrementally translate Markdown / MDX documentation with LLM tool calls"
)]
struct Cli {
    /// Source language code (default from settings, usually zh)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Comma-separated target language codes (e.g. en,ja)
    #[arg(short = 'l', long = "target-langs", value_delimiter = ',')]
    target_langs: Vec<String>,

    /// Translate a single source file instead of the whole source directory
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Report what would be translated without calling the model or writing files
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Ignore the translation cache
    #[arg(long = "force")]
    force: bool,

    /// Empty the translation cache and exit
    #[arg(long = "clear-cache")]
    clear_cache: bool,

    /// Model name or openai:MODEL_ID
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a TOML file
    #[arg(short = 'r', long = "settings")]
    settings: Option<String>,

    /// Chunks of one file translated in parallel
    #[arg(long = "concurrency")]
    concurrency: Option<usize>,

    /// Minimum delay between model requests in milliseconds
    #[arg(long = "delay-ms")]
    delay_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = llm_docs_translator::logging::init(cli.verbose) {
        eprintln!("failed to initialize logging: {:#}", err);
    }

    let config = llm_docs_translator::Config {
        source_lang: cli.source_lang,
        target_langs: cli.target_langs,
        file: cli.file,
        dry_run: cli.dry_run,
        force: cli.force,
        clear_cache: cli.clear_cache,
        model: cli.model,
        key: cli.key,
        settings_path: cli.settings,
        concurrency: cli.concurrency,
        delay_ms: cli.delay_ms,
    };

    match llm_docs_translator::run(config).await {
        Ok(report) => {
            println!("{}", report);
            if report.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
