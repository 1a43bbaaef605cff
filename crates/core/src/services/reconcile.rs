//! Counter reconciliation.

use std::sync::Arc;

use rankx_common::{AppError, AppResult};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, IsolationLevel,
    TransactionTrait,
};
use tracing::info;

use super::counters::{CounterSynchronizer, ReconcileReport};
use super::ranking::RankingEngine;

/// Corrective path that rebuilds counters from the vote ledger.
#[derive(Clone)]
pub struct ReconcileService {
    db: Arc<DatabaseConnection>,
    counters: CounterSynchronizer,
    ranking: RankingEngine,
}

impl ReconcileService {
    /// Create a new reconcile service.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>, ranking: RankingEngine) -> Self {
        Self {
            db,
            counters: CounterSynchronizer,
            ranking,
        }
    }

    /// Report drift without correcting it.
    pub async fn audit_counters(&self) -> AppResult<ReconcileReport> {
        let txn = self.snapshot().await?;
        let report = self.counters.audit(&txn).await?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(report)
    }

    /// Correct every drifted counter, then re-rank affected categories.
    pub async fn reconcile_counters(&self) -> AppResult<ReconcileReport> {
        let txn = self.snapshot().await?;
        let report = self.counters.reconcile(&txn).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for category_id in report.categories_to_rerank() {
            self.ranking.recalculate_or_retry(&category_id).await;
        }

        info!(
            drifts = report.drifts.len(),
            orphaned_votes = report.orphaned_votes.len(),
            "Counters reconciled"
        );
        Ok(report)
    }

    /// Open a transaction whose reads see one consistent snapshot.
    ///
    /// SQLite transactions are already serializable; the driver ignores the setting.
    async fn snapshot(&self) -> AppResult<DatabaseTransaction> {
        let isolation = match self.db.get_database_backend() {
            DatabaseBackend::Sqlite => None,
            _ => Some(IsolationLevel::Serializable),
        };

        self.db
            .begin_with_config(isolation, None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
