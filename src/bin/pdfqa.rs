//! CLI binary for edgequake-pdfqa.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdfqa::{
    parse_url_list, AnalysisConfig, AnalysisProgressCallback, AnalysisResult, Analyzer,
    BatchReport, CancellationToken, DocumentState, ProgressCallback, ResponseCache, RetryPolicy,
    DEFAULT_QUERY,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the documents of the request
/// plus a log line per finished document. Documents finish out of order in
/// batch mode, so start times are tracked per position.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Analysing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, position: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&position)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage(&self, position: usize, _total: usize, url: &str, state: DocumentState) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(position)
            .or_insert_with(Instant::now);
        self.bar.set_message(format!("{} {}", state.label(), dim(url)));
    }

    fn on_document_complete(&self, position: usize, total: usize, url: &str, cached: bool) {
        let secs = self.elapsed_secs(position);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            green("✓"),
            position + 1,
            total,
            url,
            dim(&if cached {
                "cached".to_string()
            } else {
                format!("{secs:.1}s")
            }),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, position: usize, total: usize, url: &str, error: &str) {
        let secs = self.elapsed_secs(position);
        // Keep output tidy.
        let msg = match error.char_indices().nth(80) {
            Some((i, _)) => format!("{}\u{2026}", &error[..i]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            position + 1,
            total,
            url,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total: usize, _succeeded: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise one document (default query)
  pdfqa https://arxiv.org/pdf/1706.03762

  # Ask a question
  pdfqa https://arxiv.org/pdf/1706.03762 -Q "What BLEU score does the model reach?"

  # Same question over several documents
  pdfqa --batch -Q "What dataset is used?" https://a.example/1.pdf https://b.example/2.pdf

  # URLs from a file, one per line, JSON report, persistent cache
  pdfqa --urls-file papers.txt --json --cache-file .pdfqa-cache.json

LIMITS:
  Documents larger than 32 MiB or longer than 100 pages are rejected before
  any embedding call is made.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY   Anthropic API key (answers, required for --provider anthropic)
  OPENAI_API_KEY      OpenAI API key (embeddings, always required)
  RUST_LOG            Override log filter (e.g. edgequake_pdfqa=debug)
"#;

/// Ask questions about PDF documents using retrieval-augmented generation.
#[derive(Parser, Debug)]
#[command(
    name = "pdfqa",
    version,
    about = "Ask questions about PDF documents using retrieval-augmented generation",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF URLs (HTTP/HTTPS).
    urls: Vec<String>,

    /// Question to ask about each document.
    #[arg(short = 'Q', long, env = "PDFQA_QUERY", default_value = DEFAULT_QUERY)]
    query: String,

    /// Batch mode: report every document, even when only one URL is given.
    #[arg(long, env = "PDFQA_BATCH")]
    batch: bool,

    /// Read additional URLs from a file, one per line.
    #[arg(long, env = "PDFQA_URLS_FILE")]
    urls_file: Option<PathBuf>,

    /// LLM model ID.
    #[arg(long, env = "PDFQA_MODEL", default_value = "claude-3-5-sonnet-20241022")]
    model: String,

    /// LLM provider: anthropic, openai, gemini, ollama, …
    #[arg(long, env = "PDFQA_PROVIDER", default_value = "anthropic")]
    provider: String,

    /// Embedding model ID.
    #[arg(long, env = "PDFQA_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Chunks retrieved per query.
    #[arg(long, env = "PDFQA_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Documents analysed in parallel.
    #[arg(short, long, env = "PDFQA_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFQA_FETCH_TIMEOUT", default_value_t = 120)]
    fetch_timeout: u64,

    /// Index build timeout in seconds.
    #[arg(long, env = "PDFQA_INDEX_TIMEOUT", default_value_t = 120)]
    index_timeout: u64,

    /// Per-query LLM timeout in seconds.
    #[arg(long, env = "PDFQA_QUERY_TIMEOUT", default_value_t = 60)]
    query_timeout: u64,

    /// Retries per stage on retriable failures.
    #[arg(long, env = "PDFQA_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles each retry).
    #[arg(long, env = "PDFQA_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Neither read nor write the answer cache.
    #[arg(long, env = "PDFQA_NO_CACHE")]
    no_cache: bool,

    /// Load the answer cache from this file and save it back afterwards.
    #[arg(long, env = "PDFQA_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDFQA_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output a JSON report instead of text.
    #[arg(long, env = "PDFQA_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFQA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFQA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFQA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Collect URLs ─────────────────────────────────────────────────────
    let mut urls: Vec<String> = cli.urls.iter().map(|u| u.trim().to_string()).collect();
    if let Some(ref path) = cli.urls_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read URL list {}", path.display()))?;
        urls.extend(parse_url_list(&text));
    }
    urls.retain(|u| !u.is_empty());
    if urls.is_empty() {
        bail!("No URLs given. Pass one or more PDF URLs or --urls-file.");
    }
    let batch_mode = cli.batch || urls.len() > 1;

    // ── Build config and analyzer ────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new(urls.len()) as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let cache = match cli.cache_file {
        Some(ref path) => ResponseCache::load(path).context("Failed to load answer cache")?,
        None => ResponseCache::new(),
    };
    let analyzer = Analyzer::from_env(config, Arc::new(cache))
        .context("Failed to initialise the analysis pipeline")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = if batch_mode {
        analyzer
            .analyze_batch_cancellable(&urls, &cli.query, cancel)
            .await
    } else {
        let result = analyzer
            .analyze_single_cancellable(&urls[0], &cli.query, cancel)
            .await;
        if let Some(ref cb) = analyzer.config().progress_callback {
            cb.on_batch_complete(1, usize::from(result.is_success()));
        }
        BatchReport::from_results(vec![result.clone()], result.duration_ms)
    };

    if let Some(ref path) = cli.cache_file {
        analyzer
            .cache()
            .save(path)
            .context("Failed to save answer cache")?;
    }

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        let json = if batch_mode {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string_pretty(&report.results[0])
        }
        .context("Failed to serialise report")?;
        println!("{json}");
    } else {
        print_report(&report, batch_mode, cli.quiet).context("Failed to write to stdout")?;
    }

    if report.summary.succeeded == 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .llm_provider(&cli.provider)
        .model(&cli.model)
        .embedding_model(&cli.embedding_model)
        .similarity_top_k(cli.top_k)
        .concurrency(cli.concurrency)
        .fetch_timeout_secs(cli.fetch_timeout)
        .index_timeout_secs(cli.index_timeout)
        .query_timeout_secs(cli.query_timeout)
        .retry(RetryPolicy {
            max_retries: cli.max_retries,
            backoff_ms: cli.retry_backoff_ms,
        })
        .use_cache(!cli.no_cache);

    if let Some(ref path) = cli.system_prompt {
        let prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_report(report: &BatchReport, batch_mode: bool, quiet: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (i, result) in report.results.iter().enumerate() {
        if batch_mode {
            writeln!(out, "{}", bold(&format!("## [{}] {}", i + 1, result.url)))?;
        }
        print_result(&mut out, result)?;
        if batch_mode {
            writeln!(out)?;
        }
    }

    if !quiet {
        let s = &report.summary;
        eprintln!(
            "{} {}/{} succeeded  ({} failed, {} from cache)  {}ms",
            if s.failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&s.succeeded.to_string()),
            s.total,
            s.failed,
            s.cached,
            s.total_duration_ms
        );
    }
    Ok(())
}

fn print_result(out: &mut impl Write, result: &AnalysisResult) -> io::Result<()> {
    match (result.answer(), result.error()) {
        (Some(answer), _) => writeln!(out, "{answer}"),
        (None, Some(error)) => writeln!(out, "{} [{}] {}", red("Error"), error.kind(), error),
        (None, None) => Ok(()),
    }
}
