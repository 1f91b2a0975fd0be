//! tgrelay: relays Telegram chats to a conversational model over long polling.

mod assistant;
mod classify;
mod config;
mod conversation;
mod cursor_store;
mod dispatch;
mod heartbeat;
mod init;
mod offset;
mod processor;
mod router;
mod server;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "tgrelay", version, about = "Telegram long-poll relay to a chat model")]
struct Cli {
    /// Config file. Defaults to ~/.tgrelay/config.toml.
    #[arg(long, global = true, env = "TGRELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll for updates and relay them (default).
    Serve {
        /// Start from offset 0 instead of the saved cursor.
        #[arg(long)]
        fresh: bool,
    },
    /// Initialize ~/.tgrelay with starter files (idempotent).
    Init,
    /// Validate config and check the bot token against Telegram.
    Doctor,
    /// One-shot send to a chat.
    Send { chat_id: i64, text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve { fresh: false });

    match command {
        Command::Serve { fresh } => server::serve(cli.config, fresh).await,
        Command::Init => {
            let report = init::initialize_default().await?;
            if report.created.is_empty() {
                println!("tgrelay init: already initialized at {}", report.root.display());
            } else {
                println!("tgrelay init: initialized {}", report.root.display());
                for path in &report.created {
                    println!("created {}", path.display());
                }
                if !report.skipped.is_empty() {
                    println!("kept {} existing file(s) unchanged", report.skipped.len());
                }
            }
            println!("next: set telegram.bot_token in {}", report.root.join("config.toml").display());
            Ok(())
        }
        Command::Doctor => server::doctor(cli.config).await,
        Command::Send { chat_id, text } => server::send_one_shot(cli.config, chat_id, &text).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tgrelay=debug,relay_app=debug,relay_channels=debug,relay_llm=debug")
    });
    let log_format = std::env::var("TGRELAY_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            return Err(anyhow::anyhow!(
                "unsupported TGRELAY_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(log_format = %log_format, "tracing initialized");
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(panic_location = %location, panic_payload = %payload, "panic");
        default_hook(info);
    }));
}
