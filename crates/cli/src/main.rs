use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustyline::error::ReadlineError;
use steward_core::action::dispatch::ActionContext;
use steward_core::action::history::ActionHistory;
use steward_core::advisor::{Advisor, AdvisorError, TranscriptEntry};
use steward_core::config::StewardCfg;
use steward_core::io::output::{self, Toast, ToastLevel, ToastReceiver};
use steward_core::platform::LocalPlatform;
use steward_core::session::{Session, local_user};
use steward_core::store::{HostedStore, MemoryStore, PgStore};
use steward_llm::provider::LlmProvider;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

type TurnResult = Result<Vec<TranscriptEntry>, AdvisorError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // Tracing: write to file when RUST_LOG is set (the prompt owns the terminal)
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create(data_dir.join("steward.log"))?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    // DATABASE_URL (optional: no DB means ephemeral mode)
    let mut startup_notice: Option<String> = None;
    let pool = if let Ok(url) = std::env::var("DATABASE_URL") {
        let mut fallback = |reason: String| {
            tracing::warn!(reason = %reason, "falling back to ephemeral mode");
            startup_notice = Some(format!(
                "Note: {reason}; running in ephemeral mode. Nothing from this session will be saved."
            ));
        };
        match tokio::time::timeout(
            Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
            sqlx::postgres::PgPoolOptions::new()
                .max_connections(8)
                .connect(&url),
        )
        .await
        {
            Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(()) => {
                    tracing::info!("database connected and migrations applied");
                    Some(pool)
                }
                Err(e) => {
                    fallback(format!("database migration failed ({e})"));
                    None
                }
            },
            Ok(Err(e)) => {
                fallback(format!("could not connect to DATABASE_URL ({e})"));
                None
            }
            Err(_) => {
                fallback(format!("database connect timed out after {DB_CONNECT_TIMEOUT_SECS}s"));
                None
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set, running in ephemeral mode");
        None
    };

    let cfg = match &pool {
        Some(pool) => StewardCfg::load(pool).await?,
        None => StewardCfg::default(),
    };

    let store: Arc<dyn HostedStore> = match pool {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    let Some(provider) = steward_llm::http::from_env() else {
        anyhow::bail!("no language model configured: set STEWARD_LLM_MODEL and STEWARD_LLM_API_KEY");
    };
    tracing::info!(name = provider.name(), "LLM provider initialized");
    let provider: Arc<dyn LlmProvider> = Arc::new(provider);

    let session = Arc::new(Session::new());
    let platform = Arc::new(LocalPlatform::new(&data_dir));
    let (toast_tx, toast_rx) = output::channel(cfg.toast_buffer);
    if let Some(notice) = startup_notice {
        output::notify(&toast_tx, Toast::info(notice));
    }
    let ctx = ActionContext::new(
        store,
        session.clone(),
        platform,
        toast_tx,
        ActionHistory::new(cfg.history_capacity),
    );
    let advisor = Arc::new(Advisor::new(provider, ctx, cfg));

    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());
    run_repl(advisor, session, toast_rx, token).await
}

fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STEWARD_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".steward"),
        Err(_) => PathBuf::from(".steward"),
    }
}

async fn run_repl(
    advisor: Arc<Advisor>,
    session: Arc<Session>,
    mut toast_rx: ToastReceiver,
    token: CancellationToken,
) -> anyhow::Result<()> {
    const SPINNER: [&str; 4] = ["-", "\\", "|", "/"];

    println!("Steward is ready. /help lists commands.");
    for entry in advisor.transcript().await.iter().rev().take(4).rev() {
        render(entry);
    }

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    let (turn_tx, mut turn_rx) = mpsc::unbounded_channel::<TurnResult>();
    let mut in_flight: Option<JoinHandle<()>> = None;
    let mut spinner_idx: usize = 0;
    let mut spinner_interval = tokio::time::interval(Duration::from_millis(100));
    spinner_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                break;
            }
            _ = spinner_interval.tick(), if in_flight.is_some() => {
                spinner_idx = (spinner_idx + 1) % SPINNER.len();
                draw_thinking_frame(SPINNER[spinner_idx])?;
            }
            Some(toast) = toast_rx.recv() => {
                if in_flight.is_some() {
                    clear_current_line()?;
                }
                render_toast(&toast);
            }
            turn = turn_rx.recv() => {
                let Some(turn) = turn else {
                    break;
                };
                in_flight = None;
                clear_current_line()?;
                render_turn(turn);
                request_next_prompt(&ready_tx);
            }
            line = line_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                match line {
                    InputEvent::Line(line) => {
                        let text = line.trim();
                        if text.is_empty() {
                            request_next_prompt(&ready_tx);
                            continue;
                        }
                        match Command::parse(text) {
                            Command::Quit => break,
                            Command::Local(cmd) => {
                                run_local(cmd, &advisor, &session).await;
                                request_next_prompt(&ready_tx);
                            }
                            Command::Turn(turn) => {
                                let advisor = advisor.clone();
                                let tx = turn_tx.clone();
                                in_flight = Some(tokio::spawn(async move {
                                    let result = match turn {
                                        Turn::Submit(text) => advisor.submit(&text).await,
                                        Turn::Confirm => advisor.confirm().await,
                                        Turn::Cancel => advisor.cancel().await,
                                    };
                                    let _ = tx.send(result);
                                }));
                                spinner_idx = 0;
                                draw_thinking_frame(SPINNER[spinner_idx])?;
                            }
                        }
                    }
                    InputEvent::Interrupted => {
                        token.cancel();
                        break;
                    }
                    InputEvent::Eof => break,
                    InputEvent::Error(err) => {
                        eprintln!("input error: {err}");
                        break;
                    }
                }
            }
        }
    }
    drop(ready_tx);

    // In-flight calls are never aborted; let the last turn finish.
    if let Some(handle) = in_flight {
        clear_current_line()?;
        println!("waiting for the current request to finish...");
        let _ = handle.await;
        if let Ok(turn) = turn_rx.try_recv() {
            render_turn(turn);
        }
    }
    while let Ok(toast) = toast_rx.try_recv() {
        render_toast(&toast);
    }
    println!();
    Ok(())
}

enum Command {
    Quit,
    Local(LocalCommand),
    Turn(Turn),
}

enum LocalCommand {
    Help,
    Login(String),
    Logout,
    WhoAmI,
    History,
    Clear,
    Unknown(String),
}

enum Turn {
    Submit(String),
    Confirm,
    Cancel,
}

impl Command {
    fn parse(text: &str) -> Self {
        if !text.starts_with('/') {
            return Self::Turn(Turn::Submit(text.to_owned()));
        }
        let (name, arg) = text.split_once(' ').unwrap_or((text, ""));
        match name {
            "/q" | "/exit" | "/quit" => Self::Quit,
            "/confirm" | "/yes" => Self::Turn(Turn::Confirm),
            "/cancel" | "/no" => Self::Turn(Turn::Cancel),
            "/help" => Self::Local(LocalCommand::Help),
            "/login" => Self::Local(LocalCommand::Login(arg.trim().to_owned())),
            "/logout" => Self::Local(LocalCommand::Logout),
            "/whoami" => Self::Local(LocalCommand::WhoAmI),
            "/history" => Self::Local(LocalCommand::History),
            "/clear" => Self::Local(LocalCommand::Clear),
            other => Self::Local(LocalCommand::Unknown(other.to_owned())),
        }
    }
}

async fn run_local(cmd: LocalCommand, advisor: &Advisor, session: &Session) {
    match cmd {
        LocalCommand::Help => {
            println!("  /login <email>   sign in");
            println!("  /logout          sign out");
            println!("  /whoami          show the signed-in user");
            println!("  /confirm         run the action waiting for confirmation");
            println!("  /cancel          discard it");
            println!("  /history         recent actions");
            println!("  /clear           forget the conversation");
            println!("  /q               quit");
        }
        LocalCommand::Login(email) if email.contains('@') => {
            let user = local_user(&email);
            println!("Signed in as {}", user.email);
            session.sign_in(user);
        }
        LocalCommand::Login(_) => println!("usage: /login <email>"),
        LocalCommand::Logout => {
            session.sign_out();
            println!("Signed out");
        }
        LocalCommand::WhoAmI => match session.current_user() {
            Some(user) => println!("{} ({})", user.email, user.id),
            None => println!("not signed in"),
        },
        LocalCommand::History => {
            let recent = advisor.recent_actions(10).await;
            if recent.is_empty() {
                println!("no actions yet");
            }
            for e in recent {
                let mark = if e.success { "ok" } else { "failed" };
                println!("  {} {} [{mark}] {}", e.at.format("%H:%M:%S"), e.action_type, e.message);
            }
        }
        LocalCommand::Clear => {
            advisor.clear_transcript().await;
            println!("Conversation cleared");
        }
        LocalCommand::Unknown(name) => println!("unknown command {name}; try /help"),
    }
}

fn render_turn(turn: TurnResult) {
    match turn {
        Ok(entries) => entries.iter().for_each(render),
        Err(AdvisorError::Busy) => println!("Still working on the previous request."),
        Err(AdvisorError::NothingPending) => println!("Nothing is waiting for confirmation."),
    }
}

fn render(entry: &TranscriptEntry) {
    match entry {
        TranscriptEntry::User { text } => println!("You> {text}"),
        TranscriptEntry::Assistant { text } => println!("Steward> {text}"),
        TranscriptEntry::Advice { advice } => {
            println!(
                "Steward> [{} | {}] {}",
                advice.category,
                advice.priority.as_db_str(),
                advice.title
            );
            if !advice.content.is_empty() {
                println!("  {}", advice.content);
            }
            for item in &advice.action_items {
                println!("  - {item}");
            }
        }
        TranscriptEntry::ActionResult { action_type, result } => {
            let mark = if result.success { "done" } else { "failed" };
            println!("  [{action_type} {mark}] {}", result.message);
        }
        TranscriptEntry::Confirmation { prompt } => {
            println!("Steward> {prompt}  (/confirm or /cancel)");
        }
        TranscriptEntry::Notice { text } => println!("  ({text})"),
    }
}

fn render_toast(toast: &Toast) {
    let tag = match toast.level {
        ToastLevel::Success => "ok",
        ToastLevel::Error => "error",
        ToastLevel::Info => "info",
    };
    println!("  >> {tag}: {}", toast.message);
}

fn draw_thinking_frame(frame: &str) -> anyhow::Result<()> {
    print!("\rthinking... {frame}");
    io::stdout().flush()?;
    Ok(())
}

fn clear_current_line() -> anyhow::Result<()> {
    print!("\r\x1b[2K");
    io::stdout().flush()?;
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

fn spawn_input_thread(
    line_tx: mpsc::UnboundedSender<InputEvent>,
    ready_rx: std::sync::mpsc::Receiver<()>,
) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("You> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            if let Ok(mut sigint) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            {
                let _ = sigint.recv().await;
                token.cancel();
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_turn() {
        assert!(matches!(Command::parse("add a task"), Command::Turn(Turn::Submit(t)) if t == "add a task"));
    }

    #[test]
    fn slash_commands() {
        assert!(matches!(Command::parse("/q"), Command::Quit));
        assert!(matches!(Command::parse("/confirm"), Command::Turn(Turn::Confirm)));
        assert!(matches!(Command::parse("/cancel"), Command::Turn(Turn::Cancel)));
        assert!(matches!(
            Command::parse("/login  me@example.com "),
            Command::Local(LocalCommand::Login(e)) if e == "me@example.com"
        ));
        assert!(matches!(Command::parse("/dance"), Command::Local(LocalCommand::Unknown(_))));
    }
}
