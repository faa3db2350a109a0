//! C12 Company-Intel Context Loader: read-through cache in front of the
//! `CompanyIntel` task (§4.1.1 "companies collection, 24h soft TTL — stale
//! entries are still returned, refreshed in the background on next read").

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::CompanyContext;

/// §4.1.1: entries older than this are considered stale, but are still
/// served — staleness only marks the entry eligible for a background refresh,
/// it never blocks the caller.
pub fn soft_ttl() -> Duration {
    Duration::hours(24)
}

pub struct CompanyIntelLoader {
    store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

pub struct CompanyIntelLookup {
    pub context: Option<CompanyContext>,
    pub freshness: Freshness,
}

impl CompanyIntelLoader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, company_id: &str) -> anyhow::Result<CompanyIntelLookup> {
        let context = self
            .store
            .get::<CompanyContext>(collections::COMPANIES, company_id)
            .await?;
        let freshness = match &context {
            None => Freshness::Missing,
            Some(ctx) if is_stale(ctx.updated_at, Utc::now()) => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        };
        Ok(CompanyIntelLookup { context, freshness })
    }

    pub async fn save(&self, context: &CompanyContext) -> anyhow::Result<()> {
        self.store
            .save(collections::COMPANIES, &context.company_id, context)
            .await
    }
}

fn is_stale(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - updated_at > soft_ttl()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::InMemoryStore;

    #[tokio::test]
    async fn missing_company_reports_missing_freshness() {
        let loader = CompanyIntelLoader::new(InMemoryStore::new());
        let lookup = loader.load("acme").await.unwrap();
        assert_eq!(lookup.freshness, Freshness::Missing);
        assert!(lookup.context.is_none());
    }

    #[tokio::test]
    async fn fresh_entry_within_ttl_reports_fresh() {
        let store = InMemoryStore::new();
        let loader = CompanyIntelLoader::new(store);
        let ctx = CompanyContext::empty("acme", Utc::now());
        loader.save(&ctx).await.unwrap();
        let lookup = loader.load("acme").await.unwrap();
        assert_eq!(lookup.freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn entry_past_soft_ttl_reports_stale_but_is_still_returned() {
        let store = InMemoryStore::new();
        let loader = CompanyIntelLoader::new(store);
        let old = Utc::now() - Duration::hours(25);
        let ctx = CompanyContext::empty("acme", old);
        loader.save(&ctx).await.unwrap();
        let lookup = loader.load("acme").await.unwrap();
        assert_eq!(lookup.freshness, Freshness::Stale);
        assert!(lookup.context.is_some());
    }
}
