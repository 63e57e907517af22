//! Builds the engine and its collaborators from configuration.

use std::sync::Arc;

use canopy_config::AppConfig;
use canopy_core::event::{DomainEvent, EventBus};
use canopy_core::grow::GrowStateProvider;
use canopy_core::notify::NotificationSink;
use canopy_core::provider::Provider;
use canopy_core::store::TurnStore;
use canopy_engine::{ChatOrchestrator, EngineSettings};
use canopy_memory::{InMemoryGrowRegistry, InMemoryKnowledgeIndex, InMemoryStore, SqliteStore};
use canopy_providers::{OpenAiCompatProvider, ProviderEmbedder, RetryPolicy, RetryingProvider};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Persistence collaborators for one run.
pub struct Backends {
    pub turns: Arc<dyn TurnStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub grows: Arc<dyn GrowStateProvider>,
    /// Present when grow records can be written durably.
    pub sqlite: Option<Arc<SqliteStore>>,
}

pub async fn open_backends(config: &AppConfig) -> Result<Backends, Box<dyn std::error::Error>> {
    match config.storage.backend.as_str() {
        "sqlite" => {
            let path = config.storage.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = Arc::new(SqliteStore::new(&format!("sqlite://{}", path.display())).await?);
            Ok(Backends {
                turns: store.clone(),
                notifier: store.clone(),
                grows: store.clone(),
                sqlite: Some(store),
            })
        }
        "in_memory" => {
            let store = Arc::new(InMemoryStore::new());
            Ok(Backends {
                turns: store.clone(),
                notifier: store,
                grows: Arc::new(InMemoryGrowRegistry::new()),
                sqlite: None,
            })
        }
        other => Err(format!(
            "Unknown storage backend '{other}' (expected \"sqlite\" or \"in_memory\")"
        )
        .into()),
    }
}

/// The configured model endpoint, without retries.
pub fn model_provider(config: &AppConfig) -> Arc<dyn Provider> {
    Arc::new(OpenAiCompatProvider::new(
        "openai_compat",
        config.base_url.clone(),
        config.api_key.clone().unwrap_or_default(),
    ))
}

/// Build a ready orchestrator over `backends`.
pub async fn build_orchestrator(config: &AppConfig, backends: &Backends) -> ChatOrchestrator {
    let raw = model_provider(config);
    let provider: Arc<dyn Provider> =
        Arc::new(RetryingProvider::new(raw.clone(), RetryPolicy::from(&config.retry)));

    let events = Arc::new(EventBus::default());
    spawn_event_logger(&events);

    let mut chat = ChatOrchestrator::new(provider, backends.turns.clone(), EngineSettings::from(config))
        .with_grow_state(backends.grows.clone())
        .with_notifier(backends.notifier.clone())
        .with_event_bus(events);

    if let Some(index) = load_knowledge(config, raw).await {
        chat = chat.with_knowledge(index);
    }
    chat
}

/// Index the configured knowledge documents, if any.
async fn load_knowledge(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Option<Arc<InMemoryKnowledgeIndex>> {
    let path = config.knowledge.documents_path.as_ref()?;
    let embedder = Arc::new(ProviderEmbedder::new(
        provider,
        config.knowledge.embedding_model.clone(),
    ));
    let index = InMemoryKnowledgeIndex::new(embedder);
    match index.load_json(path).await {
        Ok(_) => Some(Arc::new(index)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Knowledge base unavailable, continuing without it");
            None
        }
    }
}

fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::ErrorOccurred { context, error_message, .. } => {
                        warn!(context = %context, error = %error_message, "Engine error absorbed");
                    }
                    other => debug!(event = ?other, "Domain event"),
                },
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
