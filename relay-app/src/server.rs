//! Process wiring for the `serve`, `doctor`, and `send` commands.

use crate::assistant::AssistantProcessor;
use crate::config::RelayConfig;
use crate::conversation::ConversationPath;
use crate::cursor_store::CursorStore;
use crate::dispatch::DispatchLoop;
use crate::heartbeat::Heartbeat;
use crate::offset::OffsetTracker;
use crate::router::SessionRouter;
use anyhow::Result;
use relay_channels::{TelegramBackend, UpdateBackend};
use relay_llm::LlmClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn build_backend(cfg: &RelayConfig, bot_token: &str) -> Result<TelegramBackend> {
    Ok(TelegramBackend::new(bot_token, cfg.telegram.request_timeout())?
        .with_api_base_url(&cfg.telegram.api_base_url)?)
}

fn build_llm(cfg: &RelayConfig) -> Result<LlmClient> {
    let api_key = cfg.processor.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "no api key for model {}; set processor.api_key or the provider env var",
            cfg.processor.model
        )
    })?;
    let mut llm = LlmClient::new(api_key, &cfg.processor.model)?;
    if let Some(base_url) = cfg.processor.api_base_url.as_deref() {
        llm = llm.with_base_url(base_url);
    }
    Ok(llm)
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = RelayConfig::load_with_path(config_path).await?;
    tracing::info!(
        config_path = %path.display(),
        model = %cfg.processor.model,
        api_key_present = cfg.processor.api_key().is_some(),
        cursor_enabled = cfg.cursor.enabled,
        heartbeat_enabled = cfg.heartbeat.enabled,
        "config ok"
    );

    let Some(bot_token) = cfg.telegram.bot_token() else {
        tracing::warn!("telegram.bot_token is not set; serve would not start the dispatch loop");
        return Ok(());
    };
    let backend = build_backend(&cfg, bot_token)?;
    let me = backend.get_me().await?;
    tracing::info!(
        bot_id = me.id,
        bot_username = me.username.as_deref().unwrap_or(""),
        "telegram reachable"
    );
    Ok(())
}

pub async fn send_one_shot(config_path: Option<PathBuf>, chat_id: i64, text: &str) -> Result<()> {
    let cfg = RelayConfig::load(config_path).await?;
    let bot_token = cfg
        .telegram
        .bot_token()
        .ok_or_else(|| anyhow::anyhow!("telegram.bot_token is required for send"))?;
    let backend = build_backend(&cfg, bot_token)?;
    backend.send_message(chat_id, text).await?;
    tracing::info!(chat_id, "message sent");
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>, fresh: bool) -> Result<()> {
    let (cfg, path) = RelayConfig::load_with_path(config_path).await?;
    tracing::info!(config_path = %path.display(), "config loaded");

    let Some(bot_token) = cfg.telegram.bot_token() else {
        tracing::warn!("telegram.bot_token is not set; dispatch loop not started");
        return Ok(());
    };

    let backend: Arc<dyn UpdateBackend> = Arc::new(build_backend(&cfg, bot_token)?);
    let assistant = Arc::new(AssistantProcessor::new(
        build_llm(&cfg)?,
        cfg.processor.system_prompt.clone(),
        cfg.processor.max_history_messages,
    ));
    let router = SessionRouter::new(
        cfg.dispatch.session_namespace.clone(),
        cfg.dispatch.reset_command.clone(),
    );
    let conversation = ConversationPath::new(backend, assistant.clone(), router);

    let mut dispatch = DispatchLoop::new(conversation.clone(), cfg.dispatch_settings());
    let mut start = 0;
    if cfg.cursor.enabled {
        let store = CursorStore::new(cfg.cursor_path()?);
        if fresh {
            tracing::info!(path = %store.path().display(), "--fresh: ignoring saved offset");
        } else if let Some(saved) = store.load().await {
            tracing::info!(path = %store.path().display(), offset = saved, "resuming from saved offset");
            start = saved;
        }
        dispatch = dispatch.with_cursor_store(store);
    }
    let mut cursor = OffsetTracker::new(start);

    let shutdown = CancellationToken::new();
    let heartbeat_handle = if cfg.heartbeat.enabled {
        match cfg.heartbeat.chat_id {
            Some(chat_id) => {
                let heartbeat = Heartbeat::new(
                    conversation.clone(),
                    cfg.heartbeat_prompt_path()?,
                    chat_id,
                    Duration::from_secs(cfg.heartbeat.interval_secs),
                );
                Some(tokio::spawn(heartbeat.run(shutdown.child_token())))
            }
            None => None,
        }
    } else {
        None
    };

    let dispatch_handle = tokio::spawn(async move {
        dispatch.run(&mut cursor).await;
    });

    shutdown_signal(shutdown.clone()).await;

    // The loop only stops by being dropped; in-flight work is redelivered on restart.
    dispatch_handle.abort();
    match dispatch_handle.await {
        Err(e) if !e.is_cancelled() => {
            tracing::error!(error = %e, "dispatch task join failed during shutdown");
        }
        _ => {}
    }
    if let Some(handle) = heartbeat_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "heartbeat task join failed during shutdown");
        }
    }
    tracing::info!(
        sessions = assistant.session_count(),
        "shutdown completed"
    );
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; shutting down");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; shutting down");
        }
    }
    shutdown.cancel();
}
