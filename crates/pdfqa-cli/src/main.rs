//! pdfqa CLI: Ask questions about a PDF

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdfqa_core::extract::{self, Document};
use pdfqa_core::{
    discover, Answer, Chunker, Config, DocumentSummary, Metric, ProgressEvent, Session,
    SessionState, Source, Stage, API_KEY_ENV, CONFIG_FILE,
};
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

#[derive(Parser)]
#[command(name = "pdfqa")]
#[command(about = "Ask questions about a PDF", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: GlobalOptions,
}

#[derive(Args)]
struct GlobalOptions {
    /// Config file (default: nearest .pdfqa.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key for the embedding and generation providers
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum chunk length in characters
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true)]
    chunk_overlap: Option<usize>,

    /// Chunks retrieved per question
    #[arg(short = 'k', long, global = true)]
    top_k: Option<usize>,

    /// Distance used to rank chunks
    #[arg(long, global = true, value_enum)]
    metric: Option<MetricArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    L2,
    Cosine,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::L2 => Metric::L2,
            MetricArg::Cosine => Metric::Cosine,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .pdfqa.json in the current directory
    Init,

    /// Print the effective configuration
    Config,

    /// Extract and chunk a PDF without embedding it
    Inspect {
        /// PDF file to read
        pdf: PathBuf,

        /// Print every chunk
        #[arg(long)]
        show: bool,
    },

    /// Answer a single question about a PDF
    Ask {
        /// PDF file to read
        pdf: PathBuf,

        /// Question to ask
        #[arg(required = true)]
        question: Vec<String>,

        /// Show the chunks the answer was based on
        #[arg(long)]
        sources: bool,
    },

    /// Interactive question answering
    Chat {
        /// PDF file to open at start
        pdf: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init()?,
        Commands::Config => cmd_config(&cli.options)?,
        Commands::Inspect { pdf, show } => cmd_inspect(&cli.options, &pdf, show)?,
        Commands::Ask {
            pdf,
            question,
            sources,
        } => {
            let question = question.join(" ");
            cmd_ask(&cli.options, &pdf, &question, sources)?;
        }
        Commands::Chat { pdf } => cmd_chat(&cli.options, pdf.as_deref())?,
    }

    Ok(())
}

/// Resolve the config file and apply command-line overrides.
fn load_config(options: &GlobalOptions) -> Result<Config> {
    let mut config = match &options.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir()?;
            Config::discover(&cwd)?
        }
    };

    if let Some(size) = options.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = options.chunk_overlap {
        config.chunk_overlap = overlap;
    }
    if let Some(k) = options.top_k {
        config.top_k = k;
    }
    if let Some(metric) = options.metric {
        config.metric = metric.into();
    }

    config.validate()?;
    Ok(config)
}

fn open_session(options: &GlobalOptions) -> Result<Session> {
    let config = load_config(options)?;
    let mut session = Session::new(config)?;

    if let Some(key) = options.api_key.as_deref() {
        session.set_credential(key)?;
    }

    Ok(session)
}

fn cmd_init() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let path = discover::config_path(&cwd);

    if path.exists() {
        anyhow::bail!("Already initialized: {} exists", path.display());
    }

    Config::default().save(&path)?;

    println!("Wrote default config to {}", path.display());
    println!("Set {} or pass --api-key to use OpenAI.", API_KEY_ENV);

    Ok(())
}

fn cmd_config(options: &GlobalOptions) -> Result<()> {
    let config = load_config(options)?;

    let source = match &options.config {
        Some(path) => Some(path.clone()),
        None => discover::find_config(&std::env::current_dir()?)?,
    };
    match source {
        Some(path) => println!("# {}", path.display()),
        None => println!("# defaults (no {} found)", CONFIG_FILE),
    }
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

fn cmd_inspect(options: &GlobalOptions, pdf: &Path, show: bool) -> Result<()> {
    let config = load_config(options)?;

    let bytes =
        extract::read_pdf(pdf).with_context(|| format!("Failed to read {}", pdf.display()))?;
    let document = extract::extract_text(&bytes)?;
    let chunks = Chunker::from_config(&config)?.split(&document.text);

    print_document(&document);
    println!(
        "  Chunks:      {} ({} chars, {} overlap)",
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    if show {
        println!();
        for chunk in &chunks {
            println!(
                "\x1b[1;36m[{}]\x1b[0m chars {}..{}",
                chunk.index,
                chunk.start,
                chunk.start + chunk.len()
            );
            println!("{}", format_preview(&chunk.text, chunk.start));
        }
    }

    Ok(())
}

fn cmd_ask(options: &GlobalOptions, pdf: &Path, question: &str, show_sources: bool) -> Result<()> {
    let mut session = open_session(options)?;
    if session.state().stage() == Stage::AwaitingCredential {
        anyhow::bail!("No API key. Set {} or pass --api-key.", API_KEY_ENV);
    }

    let renderer = MarkdownRenderer::new();

    load_pdf(&mut session, pdf)?;
    let answer = with_spinner(&mut session, "Thinking...", |s| s.ask(question))?;

    print_answer(&answer, &renderer);
    if show_sources {
        print_sources(&answer.sources);
    }

    Ok(())
}

fn cmd_chat(options: &GlobalOptions, pdf: Option<&Path>) -> Result<()> {
    let mut session = open_session(options)?;
    let renderer = MarkdownRenderer::new();
    let mut last_answer: Option<Answer> = None;

    println!("pdfqa chat. Type /help for commands.");

    if let Some(pdf) = pdf {
        if let Err(e) = load_pdf(&mut session, pdf) {
            eprintln!("\x1b[31merror:\x1b[0m {:#}", e);
        }
    }
    print_prompt_hint(&session);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("\x1b[1m>\x1b[0m ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        let result = match command {
            "/quit" | "/exit" => break,
            "/help" => {
                print_help();
                Ok(())
            }
            "/status" => {
                print_status(&session);
                Ok(())
            }
            "/key" => session
                .set_credential(arg)
                .map(|_| println!("API key set."))
                .map_err(anyhow::Error::from),
            "/open" if arg.is_empty() => Err(anyhow::anyhow!("Usage: /open <pdf>")),
            "/open" => load_pdf(&mut session, Path::new(arg)).map(|_| {
                last_answer = None;
            }),
            "/sources" => {
                match &last_answer {
                    Some(answer) => print_sources(&answer.sources),
                    None => println!("No answer yet."),
                }
                Ok(())
            }
            c if c.starts_with('/') => Err(anyhow::anyhow!("Unknown command {}. Type /help.", c)),
            _ => with_spinner(&mut session, "Thinking...", |s| s.ask(line))
                .map(|answer| {
                    print_answer(&answer, &renderer);
                    last_answer = Some(answer);
                })
                .map_err(anyhow::Error::from),
        };

        if let Err(e) = result {
            eprintln!("\x1b[31merror:\x1b[0m {:#}", e);
            print_prompt_hint(&session);
        }
    }

    Ok(())
}

/// Read, extract and index a PDF into the session.
fn load_pdf(session: &mut Session, pdf: &Path) -> Result<DocumentSummary> {
    let bytes =
        extract::read_pdf(pdf).with_context(|| format!("Failed to read {}", pdf.display()))?;

    let summary = with_spinner(session, "Reading PDF...", |s| s.load_document(&bytes))
        .with_context(|| format!("Failed to load {}", pdf.display()))?;

    println!(
        "✓ Loaded {}: {} pages, {} chars, {} chunks",
        pdf.display(),
        summary.pages,
        summary.chars,
        summary.chunks
    );
    if summary.empty_pages > 0 {
        println!(
            "  \x1b[33m{} page(s) had no extractable text\x1b[0m",
            summary.empty_pages
        );
    }

    Ok(summary)
}

/// Run a session action with a spinner that follows its progress events.
fn with_spinner<T>(
    session: &mut Session,
    message: &'static str,
    action: impl FnOnce(&mut Session) -> pdfqa_core::Result<T>,
) -> pdfqa_core::Result<T> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    session.set_progress_callback(Box::new({
        let pb = pb.clone();
        move |event| match event {
            ProgressEvent::Extracting => pb.set_message("Extracting text..."),
            ProgressEvent::Chunking { chars } => {
                pb.set_message(format!("Chunking {} chars...", chars));
            }
            ProgressEvent::Embedding { current, total } => {
                pb.set_style(bar_style());
                pb.set_length(total as u64);
                pb.set_position(current as u64);
                pb.set_message("Embedding chunks");
            }
            ProgressEvent::Indexing { chunks } => {
                pb.set_style(spinner_style());
                pb.set_message(format!("Indexing {} chunks...", chunks));
            }
            ProgressEvent::Retrieving => pb.set_message("Retrieving context..."),
            ProgressEvent::Generating => pb.set_message("Generating answer..."),
        }
    }));

    let result = action(session);
    pb.finish_and_clear();
    result
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn print_document(document: &Document) {
    println!("✓ Extracted text:");
    println!("  Fingerprint: {}", &document.fingerprint[..16]);
    println!(
        "  Pages:       {} ({} without text)",
        document.page_count, document.empty_pages
    );
    println!("  Characters:  {}", document.char_count());
}

fn print_answer(answer: &Answer, renderer: &MarkdownRenderer) {
    println!();
    println!("{}", renderer.render(&answer.text));
    println!();
}

fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        println!("No sources.");
        return;
    }

    for (i, source) in sources.iter().enumerate() {
        println!(
            "\x1b[1;36m[{}]\x1b[0m {:.3}  chunk \x1b[1m{}\x1b[0m at char \x1b[33m{}\x1b[0m",
            i + 1,
            source.distance,
            source.chunk_index,
            source.start,
        );
        println!("{}", format_preview(&source.text, source.start));
    }
}

fn print_status(session: &Session) {
    let config = session.config();

    match session.state() {
        SessionState::Active(stage) => println!("State:  {}", describe_stage(*stage)),
        SessionState::Error { message, resume } => {
            println!("State:  {} (last error: {})", describe_stage(*resume), message);
        }
    }
    println!(
        "Key:    {}",
        if session.has_credential() {
            "set"
        } else if config.requires_credential() {
            "missing"
        } else {
            "not needed"
        }
    );

    match (session.document(), session.index()) {
        (Some(document), Some(index)) => {
            print_document(document);
            println!(
                "  Chunks:      {} (dimension {}, {:?})",
                index.len(),
                index.dimension(),
                index.metric()
            );
        }
        _ => println!("No document loaded."),
    }
}

fn describe_stage(stage: Stage) -> &'static str {
    match stage {
        Stage::AwaitingCredential => "waiting for API key",
        Stage::AwaitingDocument => "waiting for a PDF",
        Stage::IndexReady => "ready for questions",
        Stage::AwaitingAnswer => "answering",
    }
}

fn print_prompt_hint(session: &Session) {
    match session.state().stage() {
        Stage::AwaitingCredential => println!("Set an API key with /key <key>."),
        Stage::AwaitingDocument => println!("Open a PDF with /open <pdf>."),
        Stage::IndexReady | Stage::AwaitingAnswer => {}
    }
}

fn print_help() {
    println!("  /open <pdf>   load a PDF, replacing the current one");
    println!("  /key <key>    set the API key");
    println!("  /sources      show the chunks behind the last answer");
    println!("  /status       show session state");
    println!("  /quit         leave");
    println!("Anything else is asked as a question.");
}

/// Lines shown before a preview is elided
const PREVIEW_MAX_LINES: usize = 12;
const PREVIEW_HEAD_LINES: usize = 5;
const PREVIEW_TAIL_LINES: usize = 3;

/// Chunk text with the document char offset of each line in the gutter.
///
/// Long chunks keep their first and last lines; the middle is elided.
fn format_preview(text: &str, start: usize) -> String {
    let mut offset = start;
    let lines: Vec<(usize, &str)> = text
        .split_inclusive('\n')
        .map(|line| {
            let at = offset;
            offset += line.chars().count();
            (at, line.trim_end_matches(['\n', '\r']))
        })
        .collect();

    let shown: Vec<&(usize, &str)> = if lines.len() <= PREVIEW_MAX_LINES {
        lines.iter().collect()
    } else {
        lines[..PREVIEW_HEAD_LINES]
            .iter()
            .chain(&lines[lines.len() - PREVIEW_TAIL_LINES..])
            .collect()
    };

    let mut result = String::new();
    for (i, (at, line)) in shown.iter().enumerate() {
        if lines.len() > PREVIEW_MAX_LINES && i == PREVIEW_HEAD_LINES {
            let hidden = lines.len() - PREVIEW_HEAD_LINES - PREVIEW_TAIL_LINES;
            result.push_str(&format!(
                "\x1b[2m       ┊  ... {} more lines ...\x1b[0m\n",
                hidden
            ));
        }
        result.push_str(&format!("\x1b[2m{:>6}\x1b[0m │ {}\n", at, line));
    }
    result
}

/// Renders answers as terminal-colored markdown.
struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme: Option<Theme>,
}

impl MarkdownRenderer {
    fn new() -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme: themes.remove("base16-ocean.dark"),
        }
    }

    fn render(&self, text: &str) -> String {
        let Some(theme) = &self.theme else {
            return text.to_string();
        };
        let syntax = self
            .syntax_set
            .find_syntax_by_extension("md")
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());
        let mut lines = HighlightLines::new(syntax, theme);

        let mut output: String = LinesWithEndings::from(text)
            .map(|line| match lines.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => as_24_bit_terminal_escaped(&ranges[..], false),
                Err(_) => line.to_string(),
            })
            .collect();
        output.push_str("\x1b[0m");
        output
    }
}
