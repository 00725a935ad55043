// crisis-guard - Crisis signal detection
// Main entry point
//
// Each invocation behaves like one page load: the stored session is read
// back, the lock re-applied if active, then the requested operation runs
// against a headless page and the resulting page state is printed.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crisis_guard::config::{load_config, load_config_from, Config};
use crisis_guard::crisis::{
    ActionKind, AlertSink, CrisisGuard, FileStore, HeadlessPage, HttpAlertSink, InputType,
    KeywordSet, MemoryStore, NoopAlertSink, PageContext, PageEffect, PageSnapshot, SessionStore,
};
use crisis_guard::errors::{alert_endpoint_error, keywords_file_error, UserFriendlyError};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "crisis-guard")]
#[command(about = "Crisis signal detection with sticky session lock", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ~/.crisis-guard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding session and audit state
    #[arg(long = "state-dir", global = true)]
    state_dir: Option<PathBuf>,

    /// Crisis alert endpoint (overrides config)
    #[arg(long = "alert-url", global = true)]
    alert_url: Option<String>,

    /// User agent of the simulated client
    #[arg(long = "user-agent", global = true)]
    user_agent: Option<String>,

    /// Page URL recorded in audit entries
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Scan one piece of text
    Scan {
        /// Text to analyze
        text: String,
        /// Field the text came from
        #[arg(long)]
        field: Option<String>,
        /// Treat the text as a form submission
        #[arg(long)]
        form: bool,
    },
    /// Read stdin line by line as keystrokes in one field (debounced)
    Watch {
        #[arg(long, default_value = "input")]
        field: String,
    },
    /// Show the current crisis session
    Status,
    /// Activate a crisis resource (call-hotline, text-line, chat-line, emergency-call)
    Action { kind: String },
    /// Clear the crisis session and lift the navigation lock
    Reset,
    /// Print the audit log as JSON
    Export {
        /// events, actions or all
        #[arg(default_value = "all")]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let mut config = match &args.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .user_context_with_suggestion(
        "Could not read the crisis-guard configuration",
        "Fix or remove ~/.crisis-guard/config.toml, or pass --config <file>",
    )?;
    if let Some(dir) = &args.state_dir {
        config.storage.state_dir = dir.clone();
    }
    if let Some(url) = &args.alert_url {
        config.alert.endpoint = Some(url.clone());
    }
    if args.user_agent.is_some() {
        config.user_agent = args.user_agent.clone();
    }

    let page = Arc::new(HeadlessPage::lesson_page());
    let guard = build_guard(&config, page.clone(), args.url.clone())?;
    guard.bootstrap_page_load();

    match args.command {
        Command::Scan { text, field, form } => {
            let input_type = if form {
                InputType::FormSubmission
            } else {
                InputType::TextInput
            };
            let result = guard.analyze(&text, input_type, field.as_deref());
            println!("{}", serde_json::to_string_pretty(&result)?);
            guard.flush().await;
            print_page(&page.snapshot());
        }
        Command::Watch { field } => {
            run_watch(&guard, &field).await?;
            print_page(&page.snapshot());
        }
        Command::Status => {
            let status = guard.status();
            println!("user:       {}", status.user_id);
            println!("active:     {}", status.session.active);
            println!("severity:   {}", status.session.severity);
            println!("events:     {}", guard.events().len());
            println!("actions:    {}", guard.actions().len());
            print_page(&page.snapshot());
        }
        Command::Action { kind } => {
            let action = ActionKind::parse(&kind).with_context(|| {
                format!(
                    "Unknown action '{}' (expected call-hotline, text-line, chat-line or emergency-call)",
                    kind
                )
            })?;
            guard.record_action(action);
            print_page(&page.snapshot());
        }
        Command::Reset => {
            guard.reset();
            println!("Crisis state cleared");
            print_page(&page.snapshot());
        }
        Command::Export { kind } => {
            let json = match kind.as_str() {
                "events" => serde_json::to_string_pretty(&guard.events())?,
                "actions" => serde_json::to_string_pretty(&guard.actions())?,
                _ => serde_json::to_string_pretty(&serde_json::json!({
                    "crisisEvents": guard.events(),
                    "crisisActions": guard.actions(),
                }))?,
            };
            println!("{}", json);
        }
    }

    guard.shutdown().await;
    Ok(())
}

fn build_guard(
    config: &Config,
    page: Arc<HeadlessPage>,
    url: Option<String>,
) -> Result<CrisisGuard> {
    let keywords = match &config.detection.keywords_path {
        Some(path) => KeywordSet::load_from_file(path)
            .user_context(&keywords_file_error(&path.display().to_string()))?,
        None => KeywordSet::default(),
    };

    let alerts: Arc<dyn AlertSink> = match &config.alert.endpoint {
        Some(endpoint) => {
            let mut sink = HttpAlertSink::with_timeout(
                endpoint.clone(),
                Duration::from_secs(config.alert.timeout_secs),
            )
            .map_err(anyhow::Error::from)
            .user_context(&alert_endpoint_error(endpoint))?;
            if let Some(analysis) = &config.alert.analysis_endpoint {
                sink = sink.with_analysis_url(analysis.clone());
            }
            Arc::new(sink)
        }
        None => {
            tracing::info!("No alert endpoint configured, crisis alerts stay local");
            Arc::new(NoopAlertSink)
        }
    };

    let guard = CrisisGuard::builder(page)
        .keywords(keywords)
        .settings(config.detection.guard_settings())
        .session_store(open_store(config.storage.session_path()))
        .audit_store(open_store(config.storage.audit_path()))
        .alert_sink(alerts)
        .context(PageContext {
            user_agent: config.user_agent.clone(),
            url,
        })
        .build();

    Ok(guard)
}

/// Open a file store, falling back to memory when the disk is unusable
fn open_store(path: PathBuf) -> Arc<dyn SessionStore> {
    match FileStore::open(&path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                "State directory unusable, crisis state will not survive this run: {}",
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run_watch(guard: &CrisisGuard, field: &str) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    // Blocking stdin reads stay off the runtime threads
    let reader = tokio::task::spawn_blocking(move || -> Result<()> {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("Failed to read stdin")?;
            if tx.send(line).is_err() {
                break;
            }
        }
        Ok(())
    });

    let mut text = String::new();
    while let Some(line) = rx.recv().await {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&line);
        guard.on_input_changed(field, &text);
    }

    reader.await.context("stdin reader panicked")??;

    // End of input is the field losing focus
    let result = guard.on_input_blurred(field, &text);
    println!("{}", serde_json::to_string_pretty(&result)?);
    guard.flush().await;
    Ok(())
}

fn print_page(page: &PageSnapshot) {
    println!();
    if let Some(banner) = &page.banner {
        println!("[banner] {}", banner);
    }
    if page.modal.open {
        let actions: Vec<&str> = page.modal.actions.iter().map(|a| a.label()).collect();
        println!("[modal] {}", actions.join(" | "));
        if let Some(focused) = page.modal.focused {
            println!("[focus] {}", focused.label());
        }
    }
    if let Some(overlay) = &page.overlay {
        println!("[overlay] {}: {}", overlay.title, overlay.message);
        println!("[overlay] {}", overlay.action.label());
    }
    for control in &page.controls {
        let state = if control.inert { "disabled" } else { "enabled" };
        println!("[nav] {:<14} {:<22} {}", control.id, control.href, state);
    }
    for effect in &page.effects {
        match effect {
            PageEffect::Uri(uri) => println!("[open] {}", uri),
            PageEffect::External(url) => println!("[tab] {}", url),
            PageEffect::Dialog(text) => println!("[dialog]\n{}", text),
        }
    }
}

/// Logs go to stderr so stdout stays parseable
fn init_tracing() {
    // Default: WARN level, can be overridden with RUST_LOG env var
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().ok();
}
