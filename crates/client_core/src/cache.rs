use std::collections::HashMap;

use async_trait::async_trait;
use shared::{
    domain::{Network, RegistrationDraft, StepKey, StepScope},
    protocol::{RegisterReply, RegistrationStatus, StepReply},
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::gateway::{DraftGateway, GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    Absent,
    Loading,
    Fresh,
    Stale,
    Error,
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    state: CacheState,
    reply: Option<StepReply>,
    error: Option<GatewayError>,
    /// Bumped on every invalidation so a load that started earlier cannot mark the entry fresh.
    generation: u64,
}

/// Ticket handed out by [`DraftCache::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    scope: StepScope,
    generation: u64,
}

/// Remote reads keyed by step scope, with explicit invalidation.
#[derive(Debug, Default)]
pub struct DraftCache {
    entries: HashMap<StepScope, CacheEntry>,
}

impl DraftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, scope: StepScope) -> CacheState {
        self.entries
            .get(&scope)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Last known reply, fresh or not.
    pub fn get(&self, scope: StepScope) -> Option<&StepReply> {
        self.entries.get(&scope)?.reply.as_ref()
    }

    pub fn fresh(&self, scope: StepScope) -> Option<&StepReply> {
        let entry = self.entries.get(&scope)?;
        match entry.state {
            CacheState::Fresh => entry.reply.as_ref(),
            _ => None,
        }
    }

    pub fn last_error(&self, scope: StepScope) -> Option<&GatewayError> {
        self.entries.get(&scope)?.error.as_ref()
    }

    pub fn begin_load(&mut self, scope: StepScope) -> LoadTicket {
        let entry = self.entries.entry(scope).or_default();
        entry.state = CacheState::Loading;
        LoadTicket {
            scope,
            generation: entry.generation,
        }
    }

    pub fn complete(&mut self, ticket: LoadTicket, reply: StepReply) {
        let entry = self.entries.entry(ticket.scope).or_default();
        entry.state = if entry.generation == ticket.generation {
            CacheState::Fresh
        } else {
            CacheState::Stale
        };
        entry.reply = Some(reply);
        entry.error = None;
    }

    pub fn fail(&mut self, ticket: LoadTicket, error: GatewayError) {
        let entry = self.entries.entry(ticket.scope).or_default();
        entry.state = CacheState::Error;
        entry.error = Some(error);
    }

    /// Marks the entry for `scope` stale. A single step also stales the whole-draft entry,
    /// and `All` stales everything.
    pub fn invalidate(&mut self, scope: StepScope) {
        match scope {
            StepScope::All => self.invalidate_all(),
            StepScope::Step(_) => {
                self.mark_stale(scope);
                self.mark_stale(StepScope::All);
            }
        }
    }

    pub fn invalidate_all(&mut self) {
        let scopes: Vec<StepScope> = self.entries.keys().copied().collect();
        for scope in scopes {
            self.mark_stale(scope);
        }
    }

    fn mark_stale(&mut self, scope: StepScope) {
        if let Some(entry) = self.entries.get_mut(&scope) {
            entry.generation += 1;
            if entry.state != CacheState::Absent {
                entry.state = CacheState::Stale;
            }
        }
    }
}

/// Wraps a gateway with a [`DraftCache`]: reads are served from fresh entries, and every
/// successful mutation invalidates what it touched.
pub struct CachedDraftGateway<G> {
    inner: G,
    cache: Mutex<DraftCache>,
}

impl<G: DraftGateway> CachedDraftGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            cache: Mutex::new(DraftCache::new()),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub async fn cache_state(&self, scope: StepScope) -> CacheState {
        self.cache.lock().await.state(scope)
    }

    pub async fn step_state(&self, step: StepKey) -> CacheState {
        self.cache_state(StepScope::Step(step)).await
    }

    async fn invalidate_all(&self) {
        self.cache.lock().await.invalidate_all();
    }
}

#[async_trait]
impl<G: DraftGateway> DraftGateway for CachedDraftGateway<G> {
    async fn fetch_step(&self, scope: StepScope) -> Result<StepReply, GatewayError> {
        let ticket = {
            let mut cache = self.cache.lock().await;
            if let Some(reply) = cache.fresh(scope) {
                debug!(scope = %String::from(scope), "draft cache hit");
                return Ok(reply.clone());
            }
            cache.begin_load(scope)
        };

        match self.inner.fetch_step(scope).await {
            Ok(reply) => {
                self.cache.lock().await.complete(ticket, reply.clone());
                Ok(reply)
            }
            Err(err) => {
                self.cache.lock().await.fail(ticket, err.clone());
                Err(err)
            }
        }
    }

    async fn upsert_step(
        &self,
        scope: StepScope,
        form: &RegistrationDraft,
    ) -> Result<StepReply, GatewayError> {
        let reply = self.inner.upsert_step(scope, form).await?;
        self.cache.lock().await.invalidate(scope);
        Ok(reply)
    }

    async fn replace_draft(&self, draft: &RegistrationDraft) -> Result<StepReply, GatewayError> {
        let reply = self.inner.replace_draft(draft).await?;
        self.invalidate_all().await;
        Ok(reply)
    }

    async fn reset_draft(&self, scope: Option<StepScope>) -> Result<StepReply, GatewayError> {
        let reply = self.inner.reset_draft(scope).await?;
        self.invalidate_all().await;
        Ok(reply)
    }

    async fn submit(&self, network: Network) -> Result<RegisterReply, GatewayError> {
        let reply = self.inner.submit(network).await?;
        self.invalidate_all().await;
        Ok(reply)
    }

    async fn registration_status(&self) -> Result<RegistrationStatus, GatewayError> {
        self.inner.registration_status().await
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
