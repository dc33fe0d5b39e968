//! Terminal front end for the support chat
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   CHAT_API_URL     backend base URL (required)
//!   CHAT_AUTH_TOKEN  bearer token for REST and the realtime channel
//!   CHAT_USER_ID     participant id of whoever runs the console
//!   LOG_FORMAT       `json` for JSON logs, human readable otherwise
//!
//! Usage:
//!   support-chat-console customer
//!   support-chat-console admin [--open chat_<userId>]

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use support_chat_client::{
    ChatContext, ChatWidget, Config, SessionDirectory, SessionSnapshot,
};
use support_chat_shared::{SessionId, SessionSummary};

/// Support chat console
#[derive(Parser, Debug)]
#[command(name = "support-chat-console")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Chat with support about your own session
    Customer,
    /// Browse customer sessions and answer them
    Admin {
        /// Session to focus right away
        #[arg(long)]
        open: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let context = ChatContext::from_config(&config)
        .context("Failed to set up the chat client")?;

    match cli.role {
        Role::Customer => run_customer(context).await,
        Role::Admin { open } => run_admin(context, open).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run_customer(context: ChatContext) -> anyhow::Result<()> {
    let mut widget = ChatWidget::new(context);
    widget.start();
    tracing::info!(session_id = %widget.session_id(), "Customer console started");

    println!("Session {}. Commands: /open, /close, /quit", widget.session_id());

    let mut unread = widget.unread().subscribe();
    let mut updates: Option<watch::Receiver<SessionSnapshot>> = None;
    let mut transcript = Transcript::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/open" => {
                        let view = widget.open_view().await;
                        let mut receiver = view.subscribe();
                        transcript = Transcript::default();
                        transcript.render(&receiver.borrow_and_update());
                        updates = Some(receiver);
                    }
                    "/close" => {
                        widget.close_view();
                        updates = None;
                        println!("-- chat closed, listening for replies");
                    }
                    text => match widget.view() {
                        Some(view) => {
                            view.input_changed(text);
                            view.send_message(text);
                        }
                        None => println!("-- /open the chat first"),
                    },
                }
            }
            snapshot = next_snapshot(&mut updates) => match snapshot {
                Some(snapshot) => transcript.render(&snapshot),
                None => updates = None,
            },
            changed = unread.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *unread.borrow_and_update();
                if count > 0 {
                    println!("-- {count} unread");
                }
            }
        }
    }

    Ok(())
}

async fn run_admin(context: ChatContext, open: Option<String>) -> anyhow::Result<()> {
    tracing::info!(user_id = %context.self_id, "Admin console started");
    let mut directory = SessionDirectory::start(context);
    let mut sessions = directory.subscribe();
    let mut updates: Option<watch::Receiver<SessionSnapshot>> = None;
    let mut transcript = Transcript::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Commands: /list, /open <chatId>, /back, /quit");

    if let Some(raw) = open {
        let session_id = SessionId::parse(raw)?;
        let mut receiver = directory.focus(&session_id).await.subscribe();
        transcript.render(&receiver.borrow_and_update());
        updates = Some(receiver);
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                } else if line == "/list" {
                    print_sessions(&sessions.borrow());
                } else if line == "/back" {
                    directory.leave();
                    updates = None;
                    print_sessions(&sessions.borrow());
                } else if let Some(raw) = line.strip_prefix("/open ") {
                    let session_id = match SessionId::parse(raw) {
                        Ok(session_id) => session_id,
                        Err(e) => {
                            println!("-- {e}");
                            continue;
                        }
                    };
                    let mut receiver = directory.focus(&session_id).await.subscribe();
                    transcript = Transcript::default();
                    transcript.render(&receiver.borrow_and_update());
                    updates = Some(receiver);
                } else {
                    match directory.focused() {
                        Some(view) => {
                            view.input_changed(line);
                            view.send_message(line);
                        }
                        None => println!("-- /open a session first"),
                    }
                }
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                if directory.focused().is_none() {
                    print_sessions(&sessions.borrow());
                }
            }
            snapshot = next_snapshot(&mut updates) => match snapshot {
                Some(snapshot) => transcript.render(&snapshot),
                None => updates = None,
            },
        }
    }

    directory.stop();
    Ok(())
}

/// Next snapshot of the focused view, pending forever when nothing is focused
async fn next_snapshot(
    updates: &mut Option<watch::Receiver<SessionSnapshot>>,
) -> Option<SessionSnapshot> {
    match updates {
        Some(receiver) => match receiver.changed().await {
            Ok(()) => Some(receiver.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

fn print_sessions(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("-- no sessions");
        return;
    }
    for summary in sessions {
        let presence = if summary.online { "online" } else { "offline" };
        println!(
            "{:<24} {:<20} {:<8} {}",
            summary.session_id.as_str(), summary.counterpart_name, presence, summary.last_message
        );
    }
}

/// Prints only what changed between snapshots
#[derive(Default)]
struct Transcript {
    printed: usize,
    remote_typing: bool,
    all_read: bool,
    online: Option<bool>,
}

impl Transcript {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.messages.len() < self.printed {
            self.printed = 0;
        }
        for message in &snapshot.messages[self.printed..] {
            println!(
                "[{}] {}: {}",
                message.created_at.format("%H:%M"),
                message.sender_name,
                message.message
            );
        }
        self.printed = snapshot.messages.len();

        if snapshot.remote_typing != self.remote_typing {
            self.remote_typing = snapshot.remote_typing;
            if self.remote_typing {
                println!("-- typing...");
            }
        }
        if snapshot.all_read && !self.all_read {
            println!("-- read");
        }
        self.all_read = snapshot.all_read;

        if snapshot.online != self.online {
            self.online = snapshot.online;
            if self.online == Some(true) {
                println!("-- customer online");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_roles() {
        let cli = Cli::try_parse_from(["support-chat-console", "customer"]).unwrap();
        assert!(matches!(cli.role, Role::Customer));

        let cli =
            Cli::try_parse_from(["support-chat-console", "admin", "--open", "chat_u1"]).unwrap();
        assert!(matches!(cli.role, Role::Admin { open: Some(ref id) } if id == "chat_u1"));
    }

    #[test]
    fn test_transcript_tracks_flags() {
        let mut transcript = Transcript::default();
        let snapshot = SessionSnapshot {
            session_id: SessionId::from("chat_u1"),
            messages: Vec::new(),
            all_read: true,
            remote_typing: false,
            online: Some(true),
        };
        transcript.render(&snapshot);
        assert!(transcript.all_read);
        assert_eq!(transcript.online, Some(true));
        assert_eq!(transcript.printed, 0);
    }
}
