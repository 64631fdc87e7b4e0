//! Search-as-you-type over the backend's recipe search.

use std::sync::Arc;

use recipe_box_core::Recipe;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::sequence::SequenceGuard;
use crate::error::Result;
use crate::gateway::{RemoteGateway, decode};

#[derive(Debug, Default)]
struct SearchState {
    query: String,
    results: Vec<Recipe>,
    in_flight: usize,
    error: Option<String>,
}

/// Remote recipe search keeping only the newest query's results.
pub struct SearchStore {
    gateway: Arc<dyn RemoteGateway>,
    state: RwLock<SearchState>,
    seq: SequenceGuard,
}

impl SearchStore {
    #[must_use]
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(SearchState::default()),
            seq: SequenceGuard::new(),
        }
    }

    /// Run a search. A blank query clears the results without a request.
    ///
    /// Responses to queries superseded by a later call are dropped.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; previous results are kept.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<()> {
        let ticket = self.seq.issue();
        let trimmed = query.trim();

        {
            let mut state = self.state.write().await;
            state.query = query.to_string();
            state.error = None;
            if trimmed.is_empty() {
                state.results.clear();
                return Ok(());
            }
            state.in_flight += 1;
        }

        let result = self
            .gateway
            .get("recipes", &[("search", trimmed)])
            .await
            .and_then(decode::<Vec<Recipe>>);

        let mut state = self.state.write().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        if !self.seq.is_latest(ticket) {
            debug!(%ticket, "Discarding superseded search results");
            return Ok(());
        }

        match result {
            Ok(results) => {
                debug!(count = results.len(), "Search results");
                state.results = results;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Search failed");
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// The last query passed to [`search`](Self::search), untrimmed.
    pub async fn query(&self) -> String {
        self.state.read().await.query.clone()
    }

    pub async fn results(&self) -> Vec<Recipe> {
        self.state.read().await.results.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.in_flight > 0
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }
}
