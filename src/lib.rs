pub mod api;
pub mod channels;
pub mod config;
pub mod core;
pub mod llm;
pub mod mcp;

use crate::channels::{ChannelAdapter, IncomingMessage, LoggingAdapter};
use crate::core::approval::ApprovalManager;
use crate::core::dispatch::Dispatcher;
use crate::core::hub::EventHub;
use crate::core::supervisor::{self, SupervisorSettings};
use crate::llm::{DevAnalyzer, MessageAnalyzer, OpenAiAnalyzer};
use crate::mcp::{LocalToolRegistry, ToolRegistry};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

const INBOUND_QUEUE_CAPACITY: usize = 256;

/// Wire the whole backend together and serve until ctrl-c: event hub,
/// approval manager with its sweeper, the supervised dispatch pipeline,
/// and the HTTP/WebSocket surface.
pub async fn run(config: config::Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let hub = EventHub::spawn();

    let approvals = ApprovalManager::new(hub.clone(), config.approval.settings());
    {
        let approvals = approvals.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { approvals.run_sweeper(cancel).await });
    }

    let analyzer: Arc<dyn MessageAnalyzer> = if config.llm.api_key.is_some() {
        Arc::new(OpenAiAnalyzer::new(&config.llm)?)
    } else {
        tracing::warn!("no LLM api key configured, using deterministic dev analyzer");
        Arc::new(DevAnalyzer)
    };
    let adapter: Arc<dyn ChannelAdapter> =
        Arc::new(LoggingAdapter::new(config.dispatch.platform.clone()));
    let tools: Arc<dyn ToolRegistry> = Arc::new(LocalToolRegistry);

    // The sender half is handed to channel adapters as they come online;
    // it must stay alive here or the dispatch loop sees a closed queue.
    let (inbound_tx, inbound_rx) = mpsc::channel::<IncomingMessage>(INBOUND_QUEUE_CAPACITY);
    let inbox = Arc::new(Mutex::new(inbound_rx));

    let dispatcher = Dispatcher::new(
        analyzer,
        adapter.clone(),
        tools,
        approvals.clone(),
        hub.clone(),
        config.dispatch.settings(),
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let supervised = supervisor::supervise(
                "dispatch",
                SupervisorSettings::default(),
                cancel.clone(),
                || {
                    let dispatcher = dispatcher.clone();
                    let inbox = inbox.clone();
                    let adapter = adapter.clone();
                    let cancel = cancel.clone();
                    async move {
                        adapter.connect().await?;
                        dispatcher.run(inbox, cancel).await
                    }
                },
            )
            .await;
            if let Err(e) = supervised {
                tracing::error!(error = %e, "dispatch pipeline terminated");
            }
        });
    }

    let app = api::router(api::AppState {
        hub: hub.clone(),
        approvals,
    });
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    hub.close();
    drop(inbound_tx);
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        _ = ctrl_c => tracing::info!("shutdown signal received"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
