//! CLI binary for docubot.
//!
//! A thin shim over the library crate: maps CLI flags to `SessionConfig`,
//! renders indexing progress, and runs the question loop.

use anyhow::{Context, Result};
use clap::Parser;
use docubot::{
    Answer, ChatBackend, ConversationTurn, EmbeddingBackend, HostedModel,
    IndexingProgressCallback, ProgressCallback, Session, SessionConfig, UploadOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while extracting, then a bar over the embedding batches.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        Arc::new(Self { bar })
    }

    fn start_spinner(&self, msg: String) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Indexing");
        self.bar.set_message(msg);
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} chunks  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Embedding");
    }
}

impl IndexingProgressCallback for CliProgressCallback {
    fn on_indexing_start(&self, document: &str) {
        self.start_spinner(format!("extracting text from {document}…"));
    }

    fn on_text_extracted(&self, pages_with_text: usize, total_pages: usize) {
        self.bar.println(format!(
            "  {} text found on {}/{} pages",
            green("✓"),
            pages_with_text,
            total_pages
        ));
        self.bar.set_message("chunking…");
    }

    fn on_chunked(&self, total_chunks: usize) {
        self.activate_bar(total_chunks);
    }

    fn on_batch_embedded(&self, embedded: usize, _total_chunks: usize) {
        self.bar.set_position(embedded as u64);
    }

    fn on_indexing_complete(&self, total_chunks: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} chunks indexed",
            green("✔"),
            bold(&total_chunks.to_string())
        );
    }

    fn on_indexing_failed(&self, error: &str) {
        self.bar.finish_and_clear();
        let msg = error.lines().next().unwrap_or(error);
        eprintln!("{} indexing failed: {}", red("✘"), red(msg));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start empty, upload from the prompt
  docubot

  # Index a PDF immediately and start asking
  docubot report.pdf

  # Smaller chunks, faster model
  docubot --model llama-3.1-8b-instant --chunk-size 600 --chunk-overlap 100 report.pdf

  # Fully offline embeddings (lower quality)
  docubot --embedding hashing report.pdf

  # Chat through another edgequake-llm provider
  docubot --provider openai report.pdf

INTERACTIVE COMMANDS:
  /upload <path>   Index a PDF (ignored once a document is indexed)
  /history         Show the conversation so far (JSON with --json)
  /sources         Show the chunks behind the last answer
  /reset           Drop the document and the conversation
  /help            Show this list
  /quit            Exit
  anything else    Ask a question about the document

ENVIRONMENT VARIABLES:
  GROQ_API_KEY            Groq API key (required for the default backend)
  DOCUBOT_EMBEDDING_URL   OpenAI-compatible /v1/embeddings endpoint
  DOCUBOT_EMBEDDING_MODEL Embedding model name
  EMBEDDING_API_KEY       Bearer token for the embedding endpoint
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Overrides -v / -q log filtering

  Variables can also be placed in a .env file in the working directory.
"#;

/// Chat with a PDF using a hosted LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docubot",
    version,
    about = "Chat with a PDF using a hosted LLM",
    long_about = "Upload one PDF, index its text, then ask questions answered by a hosted \
language model grounded in retrieved passages of the document.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF to index at startup.
    input: Option<PathBuf>,

    /// Hosted model answering questions.
    #[arg(long, env = "DOCUBOT_MODEL", value_enum, default_value = "gemma2-9b-it")]
    model: ModelArg,

    /// Chat backend: groq, or any edgequake-llm provider name.
    #[arg(long, env = "DOCUBOT_PROVIDER", default_value = "groq")]
    provider: String,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Embedding backend.
    #[arg(long, env = "DOCUBOT_EMBEDDING", value_enum, default_value = "http")]
    embedding: EmbeddingArg,

    /// Embeddings endpoint for `--embedding http`.
    #[arg(long, env = "DOCUBOT_EMBEDDING_URL", default_value = docubot::config::DEFAULT_EMBEDDING_URL)]
    embedding_url: String,

    /// Embedding model for `--embedding http`.
    #[arg(long, env = "DOCUBOT_EMBEDDING_MODEL", default_value = docubot::config::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Bearer token for the embeddings endpoint.
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Max chunk length in characters.
    #[arg(long, env = "DOCUBOT_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "DOCUBOT_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "DOCUBOT_TOP_K", default_value_t = 4)]
    top_k: usize,

    /// Map-step calls allowed in flight at once.
    #[arg(long, env = "DOCUBOT_MAP_CONCURRENCY", default_value_t = 1)]
    map_concurrency: usize,

    /// Max tokens generated per model call.
    #[arg(long, env = "DOCUBOT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "DOCUBOT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Directory uploads are stored in.
    #[arg(long, env = "DOCUBOT_WORKING_DIR", default_value = "uploads")]
    working_dir: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCUBOT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Rephrase follow-up questions before retrieval.
    #[arg(long, env = "DOCUBOT_CONDENSE_QUESTION")]
    condense_question: bool,

    /// Print `/history` as JSON.
    #[arg(long, env = "DOCUBOT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCUBOT_VERBOSE")]
    verbose: bool,

    /// Suppress everything except answers and errors.
    #[arg(short, long, env = "DOCUBOT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModelArg {
    #[value(name = "gemma2-9b-it")]
    Gemma2_9bIt,
    #[value(name = "llama-3.1-8b-instant")]
    Llama31_8bInstant,
}

impl From<ModelArg> for HostedModel {
    fn from(v: ModelArg) -> Self {
        match v {
            ModelArg::Gemma2_9bIt => HostedModel::Gemma2_9bIt,
            ModelArg::Llama31_8bInstant => HostedModel::Llama31_8bInstant,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EmbeddingArg {
    Http,
    Provider,
    Hashing,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would interleave with the progress bar and the answers, so
    // the default level is warn.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if cli.quiet {
        None
    } else {
        Some(CliProgressCallback::new() as Arc<dyn IndexingProgressCallback>)
    };
    let config = build_config(&cli, progress)?;

    let mut session = Session::new(config).context("Failed to start session")?;
    let mut last_answer: Option<Answer> = None;

    if let Some(ref path) = cli.input {
        upload(&mut session, path, cli.quiet).await;
    }

    if !cli.quiet {
        eprintln!(
            "{} {}  {}",
            cyan("◆"),
            bold("docubot"),
            dim("type /help for commands, /quit to exit")
        );
    }

    let mut rl = Editor::<(), DefaultHistory>::new().context("Failed to initialise line editor")?;

    loop {
        let line = match tokio::task::block_in_place(|| rl.readline(&prompt(&session))) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read input"),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        match Command::parse(input) {
            Command::Quit => break,
            Command::Help => println!("{}", help_text()),
            Command::Upload(None) => println!("{}", red("usage: /upload <path>")),
            Command::Upload(Some(path)) => upload(&mut session, Path::new(path), cli.quiet).await,
            Command::History => print_history(session.transcript(), cli.json)?,
            Command::Sources => print_sources(last_answer.as_ref()),
            Command::Reset => {
                session.reset();
                last_answer = None;
                println!("{} session cleared", green("✓"));
            }
            Command::Unknown(cmd) => println!("{} unknown command {cmd}; try /help", red("✗")),
            Command::Ask(question) => match session.ask(question).await {
                Ok(answer) => {
                    println!("{}", answer.text);
                    if !cli.quiet {
                        eprintln!(
                            "{}",
                            dim(&format!(
                                "{} calls  {} tokens in / {} out  {}ms",
                                answer.stats.model_calls,
                                answer.stats.input_tokens,
                                answer.stats.output_tokens,
                                answer.stats.total_duration_ms
                            ))
                        );
                    }
                    last_answer = Some(answer);
                }
                Err(e) => println!("{} {}", red("✗"), red(&format!("[{}] {e}", e.kind()))),
            },
        }
    }

    Ok(())
}

/// Map CLI args to `SessionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SessionConfig> {
    let chat_backend = match cli.provider.trim().to_lowercase().as_str() {
        "groq" => ChatBackend::Groq,
        other => ChatBackend::Provider(other.to_string()),
    };
    let embedding = match cli.embedding {
        EmbeddingArg::Http => EmbeddingBackend::Http {
            url: cli.embedding_url.clone(),
            model: cli.embedding_model.clone(),
            api_key: cli.embedding_api_key.clone().filter(|k| !k.is_empty()),
        },
        EmbeddingArg::Provider => EmbeddingBackend::Provider,
        EmbeddingArg::Hashing => EmbeddingBackend::Hashing { dimension: 1024 },
    };

    let mut builder = SessionConfig::builder()
        .model(cli.model.into())
        .chat_backend(chat_backend)
        .embedding(embedding)
        .chunk_size(cli.chunk_size)
        .chunk_overlap(cli.chunk_overlap)
        .top_k(cli.top_k)
        .map_concurrency(cli.map_concurrency)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .working_dir(cli.working_dir.clone())
        .condense_question(cli.condense_question);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One line of REPL input.
#[derive(Debug, PartialEq)]
enum Command<'a> {
    Upload(Option<&'a str>),
    History,
    Sources,
    Reset,
    Help,
    Quit,
    Unknown(&'a str),
    Ask(&'a str),
}

impl<'a> Command<'a> {
    fn parse(input: &'a str) -> Self {
        if !input.starts_with('/') {
            return Command::Ask(input);
        }
        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (input, ""),
        };
        match cmd {
            "/upload" => Command::Upload((!rest.is_empty()).then_some(rest)),
            "/history" => Command::History,
            "/sources" => Command::Sources,
            "/reset" => Command::Reset,
            "/help" | "/?" => Command::Help,
            "/quit" | "/exit" | "/q" => Command::Quit,
            other => Command::Unknown(other),
        }
    }
}

fn prompt(session: &Session) -> String {
    match session.document() {
        Some(doc) => format!("{} ❯ ", doc.name),
        None => "(no document) ❯ ".to_string(),
    }
}

fn help_text() -> String {
    AFTER_HELP
        .split("INTERACTIVE COMMANDS:\n")
        .nth(1)
        .and_then(|s| s.split("\n\n").next())
        .unwrap_or_default()
        .to_string()
}

async fn upload(session: &mut Session, path: &Path, quiet: bool) {
    match session.upload_file(path).await {
        Ok(UploadOutcome::Indexed {
            document,
            total_pages,
            chunks,
            ..
        }) => {
            if !quiet {
                eprintln!(
                    "{} {}  {} pages  {} chunks",
                    green("✔"),
                    bold(&document.name),
                    total_pages,
                    chunks
                );
            }
        }
        Ok(UploadOutcome::Ignored { current }) => println!(
            "{} '{}' is already indexed; /reset to load another document",
            cyan("⚠"),
            current.name
        ),
        Err(e) => println!("{} {}", red("✗"), red(&format!("[{}] {e}", e.kind()))),
    }
}

fn print_history(transcript: &[ConversationTurn], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(transcript).context("Failed to serialise transcript")?
        );
        return Ok(());
    }
    if transcript.is_empty() {
        println!("{}", dim("(no conversation yet)"));
    }
    for turn in transcript {
        match turn {
            ConversationTurn::User(q) => println!("{} {}", bold("you:"), q),
            ConversationTurn::Assistant(a) => println!("{} {}", cyan("bot:"), a),
            ConversationTurn::Failed(e) => println!("{} {}", red("err:"), red(e)),
        }
    }
    Ok(())
}

fn print_sources(answer: Option<&Answer>) {
    let Some(answer) = answer else {
        println!("{}", dim("(no answer yet)"));
        return;
    };
    if let Some(ref q) = answer.standalone_question {
        println!("{} {}", dim("retrieved for:"), q);
    }
    for (rank, source) in answer.sources.iter().enumerate() {
        let preview: String = source.chunk.text.chars().take(160).collect();
        println!(
            "{} {}  {}",
            bold(&format!("[{}]", rank + 1)),
            dim(&format!(
                "page {}  chunk {}  score {:.3}",
                source.chunk.page, source.chunk.index, source.score
            )),
            preview.replace('\n', " ")
        );
    }
}
