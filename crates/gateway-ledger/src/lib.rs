//! C5 Credit Ledger (§4.5): reserve/commit/refund against a per-user
//! `CreditBalance`, plus append-only usage-row accounting.
//!
//! Modeled as a request/approve state machine: a reservation is created,
//! then later resolved exactly once (commit or refund), and the resolution
//! path is
//! guarded by a per-user serialization lock so `balance >= 0` never
//! transiently breaks under concurrent reserve/commit races (§5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use gateway_config::{AppConfig, CreditRatios};
use gateway_observability::{emit_event, ObservabilityEvent, ProcessKind};
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::{CreditBalance, UsageEntry, UsageStatus};
use tokio::sync::{Mutex, RwLock};
use tracing::Level;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Reservation {
    pub reservation_id: String,
    pub user_id: String,
    pub credits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveError {
    InsufficientCredits,
}

/// §4.5 text-token conversion: `credits = ceil(tokens/1000 * CREDIT_PER_1000_TOKENS)`.
pub fn text_credits(tokens: u64, ratios: CreditRatios) -> u64 {
    let raw = (tokens as f64 / 1000.0) * ratios.credit_per_1000_tokens;
    raw.ceil().max(0.0) as u64
}

pub fn image_credits(units: u32, ratios: CreditRatios) -> u64 {
    (ratios.image_unit_cost_credits * units as f64).ceil().max(0.0) as u64
}

pub fn video_credits(seconds: f64, ratios: CreditRatios) -> u64 {
    (ratios.video_per_second_credits * seconds).ceil().max(0.0) as u64
}

pub struct CreditLedger {
    store: Arc<dyn DocumentStore>,
    config: Arc<AppConfig>,
    user_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    reservations: RwLock<HashMap<String, Reservation>>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            config,
            user_locks: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    async fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.user_locks.read().await.get(user_id) {
            return lock.clone();
        }
        let mut guard = self.user_locks.write().await;
        guard
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_balance(&self, user_id: &str) -> anyhow::Result<CreditBalance> {
        Ok(self
            .store
            .get::<CreditBalance>(collections::CREDIT_BALANCES, user_id)
            .await?
            .unwrap_or_else(|| CreditBalance::new(user_id, 0, Utc::now())))
    }

    async fn save_balance(&self, balance: &CreditBalance) -> anyhow::Result<()> {
        self.store
            .save(collections::CREDIT_BALANCES, &balance.user_id, balance)
            .await
    }

    /// Out-of-band top-up. Billing settlement itself is an external
    /// collaborator; this is the seam a billing webhook handler would call
    /// into to grant credits after a purchase.
    pub async fn grant(&self, user_id: &str, credits: u64) -> anyhow::Result<CreditBalance> {
        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock().await;
        let mut balance = self.load_balance(user_id).await?;
        balance.balance = balance.balance.saturating_add(credits);
        balance.updated_at = Utc::now();
        self.save_balance(&balance).await?;
        Ok(balance)
    }

    pub async fn balance_of(&self, user_id: &str) -> anyhow::Result<CreditBalance> {
        self.load_balance(user_id).await
    }

    /// §4.5 `reserve(userId, credits) -> reservationId | insufficient`.
    pub async fn reserve(
        &self,
        user_id: &str,
        credits: u64,
        correlation_id: &str,
    ) -> anyhow::Result<Result<Reservation, ReserveError>> {
        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock().await;

        let mut balance = self.load_balance(user_id).await?;
        if balance.available() < credits {
            emit_event(
                Level::WARN,
                ProcessKind::Engine,
                ObservabilityEvent {
                    event: "credit_reserve_denied",
                    component: "gateway-ledger",
                    correlation_id: Some(correlation_id),
                    task_type: None,
                    provider_id: None,
                    model_id: None,
                    status: Some("insufficient_credits"),
                    error_code: None,
                    detail: Some(&format!(
                        "available={} requested={}",
                        balance.available(),
                        credits
                    )),
                },
            );
            return Ok(Err(ReserveError::InsufficientCredits));
        }

        balance.reserved += credits;
        balance.updated_at = Utc::now();
        self.save_balance(&balance).await?;

        let reservation = Reservation {
            reservation_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            credits,
        };
        self.reservations
            .write()
            .await
            .insert(reservation.reservation_id.clone(), reservation.clone());

        anyhow::ensure!(balance.reserved <= balance.balance, "reserved must not exceed balance");
        Ok(Ok(reservation))
    }

    /// §4.5 `commit(reservationId, actualCredits)` — caps overruns at the
    /// reservation amount and logs them rather than driving `balance` below
    /// zero.
    pub async fn commit(&self, reservation_id: &str, actual_credits: u64) -> anyhow::Result<u64> {
        let Some(reservation) = self.reservations.write().await.remove(reservation_id) else {
            anyhow::bail!("no such reservation {reservation_id}");
        };
        let lock = self.lock_for(&reservation.user_id).await;
        let _guard = lock.lock().await;

        let capped = if actual_credits > reservation.credits {
            emit_event(
                Level::WARN,
                ProcessKind::Engine,
                ObservabilityEvent {
                    event: "credit_commit_overrun",
                    component: "gateway-ledger",
                    correlation_id: None,
                    task_type: None,
                    provider_id: None,
                    model_id: None,
                    status: Some("capped"),
                    error_code: None,
                    detail: Some(&format!(
                        "reserved={} actual={}",
                        reservation.credits, actual_credits
                    )),
                },
            );
            reservation.credits
        } else {
            actual_credits
        };

        let mut balance = self.load_balance(&reservation.user_id).await?;
        balance.reserved = balance.reserved.saturating_sub(reservation.credits);
        balance.balance = balance.balance.saturating_sub(capped);
        balance.lifetime_used = balance.lifetime_used.saturating_add(capped);
        balance.updated_at = Utc::now();
        self.save_balance(&balance).await?;

        Ok(capped)
    }

    /// §4.5 `refund(reservationId)` — release reservation, no balance change.
    pub async fn refund(&self, reservation_id: &str) -> anyhow::Result<()> {
        let Some(reservation) = self.reservations.write().await.remove(reservation_id) else {
            // Idempotent: a refund on an already-resolved reservation is a
            // no-op rather than an error, since §5 abort/timeout paths may
            // race a commit that already happened.
            return Ok(());
        };
        let lock = self.lock_for(&reservation.user_id).await;
        let _guard = lock.lock().await;

        let mut balance = self.load_balance(&reservation.user_id).await?;
        balance.reserved = balance.reserved.saturating_sub(reservation.credits);
        balance.updated_at = Utc::now();
        self.save_balance(&balance).await?;
        Ok(())
    }

    /// §4.5 `append(usageEntry)` — best-effort observability log, not a
    /// source of truth (§4.1 step 10, "usage-row emission ... is not
    /// transactional with the document write").
    pub async fn append_usage(&self, entry: UsageEntry) -> anyhow::Result<()> {
        self.store.append(collections::USAGE_LOG, &entry).await
    }

    pub fn usage_entry(
        user_id: impl Into<String>,
        job_id: Option<String>,
        task_type: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        usage: &gateway_types::TokenUsage,
        credits_used: u64,
        estimated_cost_usd: f64,
        status: UsageStatus,
        error_reason: Option<String>,
    ) -> UsageEntry {
        UsageEntry {
            user_id: user_id.into(),
            job_id,
            task_type: task_type.into(),
            provider: provider.into(),
            model: model.into(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.candidates_tokens,
            thoughts_tokens: usage.thoughts_tokens,
            cached_tokens: usage.cached_tokens,
            image_count: usage.image_count,
            video_seconds: usage.video_seconds,
            estimated_cost_usd,
            credits_used,
            status,
            error_reason,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::InMemoryStore;

    fn ledger() -> CreditLedger {
        CreditLedger::new(InMemoryStore::new(), Arc::new(AppConfig::from_env().unwrap()))
    }

    #[tokio::test]
    async fn reserve_exactly_available_succeeds_one_more_fails() {
        let ledger = ledger();
        ledger.grant("u1", 100).await.unwrap();
        let r1 = ledger.reserve("u1", 100, "c1").await.unwrap();
        assert!(r1.is_ok());
        let r2 = ledger.reserve("u1", 1, "c1").await.unwrap();
        assert_eq!(r2, Err(ReserveError::InsufficientCredits));
    }

    #[tokio::test]
    async fn commit_reduces_balance_and_clears_reservation() {
        let ledger = ledger();
        ledger.grant("u1", 100).await.unwrap();
        let reservation = ledger.reserve("u1", 10, "c1").await.unwrap().unwrap();
        ledger.commit(&reservation.reservation_id, 7).await.unwrap();
        let balance = ledger.balance_of("u1").await.unwrap();
        assert_eq!(balance.balance, 93);
        assert_eq!(balance.reserved, 0);
        assert_eq!(balance.lifetime_used, 7);
    }

    #[tokio::test]
    async fn commit_overrun_is_capped_at_reservation() {
        let ledger = ledger();
        ledger.grant("u1", 100).await.unwrap();
        let reservation = ledger.reserve("u1", 10, "c1").await.unwrap().unwrap();
        let charged = ledger.commit(&reservation.reservation_id, 50).await.unwrap();
        assert_eq!(charged, 10);
        let balance = ledger.balance_of("u1").await.unwrap();
        assert_eq!(balance.balance, 90);
    }

    #[tokio::test]
    async fn refund_releases_reservation_without_touching_balance() {
        let ledger = ledger();
        ledger.grant("u1", 100).await.unwrap();
        let reservation = ledger.reserve("u1", 10, "c1").await.unwrap().unwrap();
        ledger.refund(&reservation.reservation_id).await.unwrap();
        let balance = ledger.balance_of("u1").await.unwrap();
        assert_eq!(balance.balance, 100);
        assert_eq!(balance.reserved, 0);
    }

    #[tokio::test]
    async fn refund_of_unknown_reservation_is_a_no_op() {
        let ledger = ledger();
        ledger.refund("does-not-exist").await.unwrap();
    }

    #[tokio::test]
    async fn balance_and_reserved_never_negative_after_sequence() {
        let ledger = ledger();
        ledger.grant("u1", 5).await.unwrap();
        let r = ledger.reserve("u1", 5, "c1").await.unwrap().unwrap();
        ledger.commit(&r.reservation_id, 5).await.unwrap();
        let balance = ledger.balance_of("u1").await.unwrap();
        assert_eq!(balance.balance, 0);
        assert_eq!(balance.reserved, 0);
    }

    #[test]
    fn text_credits_ceils_token_conversion() {
        let ratios = CreditRatios {
            credit_per_1000_tokens: 1.0,
            image_unit_cost_credits: 4.0,
            video_per_second_credits: 2.0,
        };
        assert_eq!(text_credits(1, ratios), 1);
        assert_eq!(text_credits(1000, ratios), 1);
        assert_eq!(text_credits(1001, ratios), 2);
    }
}
