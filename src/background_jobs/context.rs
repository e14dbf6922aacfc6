use super::job::HookEvent;
use crate::catalog_store::CatalogStore;
use crate::enrichment_store::EnrichmentStore;
use crate::provider::MusicProvider;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Context provided to jobs during execution.
///
/// Contains references to shared resources and a cancellation token
/// for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub catalog_store: Arc<dyn CatalogStore>,

    /// Audio features and embeddings, same database as the catalog.
    pub enrichment_store: Arc<dyn EnrichmentStore>,

    pub provider: Arc<dyn MusicProvider>,

    /// Set when running under the scheduler.
    pub hook_sender: Option<mpsc::Sender<HookEvent>>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        catalog_store: Arc<dyn CatalogStore>,
        enrichment_store: Arc<dyn EnrichmentStore>,
        provider: Arc<dyn MusicProvider>,
    ) -> Self {
        Self {
            cancellation_token,
            catalog_store,
            enrichment_store,
            provider,
            hook_sender: None,
        }
    }

    pub fn with_hook_sender(mut self, hook_sender: mpsc::Sender<HookEvent>) -> Self {
        self.hook_sender = Some(hook_sender);
        self
    }

    /// Same resources, different cancellation token.
    pub fn with_cancellation_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Notify the scheduler of a hook event. No-op outside the scheduler.
    ///
    /// Never blocks: a full channel drops the event.
    pub fn emit(&self, event: HookEvent) {
        if let Some(sender) = &self.hook_sender {
            if let Err(e) = sender.try_send(event) {
                debug!("Dropped hook event {}: {}", event, e);
            }
        }
    }
}
