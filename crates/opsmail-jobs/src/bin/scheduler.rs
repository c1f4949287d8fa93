//! opsmail-scheduler: runs the background pipeline jobs.
//!
//! Wires the in-memory store, the extraction backends, and the pipeline
//! services into a [`Scheduler`], then runs until SIGINT.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use opsmail_core::{NoOpSink, StructuredExtractor};
use opsmail_extract::{HeuristicExtractor, HttpExtractorBackend, TextExtractionBridge};
use opsmail_jobs::{BackfillQueue, Scheduler, SchedulerConfig};
use opsmail_pipeline::{AutoLinker, KnowledgeService, OperationCreator};
use opsmail_store::Store;

/// Organizations to process, from `OPSMAIL_ORG_IDS` (comma-separated UUIDs).
fn org_ids_from_env() -> Vec<Uuid> {
    std::env::var("OPSMAIL_ORG_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(value = part, "Ignoring invalid organization id");
                    None
                }
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    //
    // Environment variables:
    //   RUST_LOG - standard env filter (default: "opsmail_jobs=debug,opsmail_pipeline=debug")
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "opsmail_jobs=debug,opsmail_pipeline=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Store::in_memory();

    // Structured extraction: HTTP backend with heuristic fallback.
    let extractor = Arc::new(HttpExtractorBackend::from_env()?);
    let heuristic = Arc::new(HeuristicExtractor::new());
    match extractor.health_check().await {
        Ok(true) => info!(backend = extractor.name(), "Extraction backend reachable"),
        Ok(false) | Err(_) => warn!(
            backend = extractor.name(),
            "Extraction backend unreachable, heuristic fallback will carry extraction"
        ),
    }

    // Attachment text extraction, for visibility at startup.
    let bridge = TextExtractionBridge::new(store.attachments.clone());
    for (name, healthy) in bridge.health_report().await {
        if healthy {
            info!(adapter = name, "Attachment adapter available");
        } else {
            warn!(adapter = name, "Attachment adapter unavailable");
        }
    }

    let knowledge = Arc::new(KnowledgeService::new(store.knowledge.clone()));
    let creator = Arc::new(OperationCreator::new(
        store.rules.clone(),
        store.operations.clone(),
        store.clients.clone(),
        store.emails.clone(),
        knowledge.clone(),
        extractor,
        heuristic,
        Arc::new(NoOpSink),
    ));
    let linker = Arc::new(AutoLinker::new(
        store.rules.clone(),
        store.operations.clone(),
        store.clients.clone(),
        store.emails.clone(),
        creator.clone(),
    ));

    let queue = BackfillQueue::new();
    let scheduler = Scheduler::new(
        linker,
        creator,
        knowledge,
        queue,
        SchedulerConfig::from_env(),
    );

    let orgs = org_ids_from_env();
    if orgs.is_empty() {
        warn!("No organizations configured (OPSMAIL_ORG_IDS is empty)");
    }
    for org_id in orgs {
        scheduler.register_org(org_id).await;
    }

    let handle = scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, shutting down");
    handle.shutdown().await?;

    Ok(())
}
