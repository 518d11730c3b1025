use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, Statement, TransactionTrait, Value,
};
use tracing::warn;

use crate::config::AdvisoryLockStrategy;

/// A transaction scoping one structural mutation.
///
/// On PostgreSQL the hierarchy's advisory lock is taken transaction-scoped, so concurrent writers
/// to the same closure table queue up instead of interleaving, and the lock goes away with the
/// commit or rollback however the transaction ends. Other backends rely on the transaction alone.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
}

impl LockedTransaction {
    pub async fn acquire<C>(strategy: &AdvisoryLockStrategy, db: &C) -> Result<Self, DbErr>
    where
        C: TransactionTrait,
    {
        let txn = db.begin().await?;

        if let AdvisoryLockStrategy::Namespaced(key) = strategy {
            if txn.get_database_backend() == DbBackend::Postgres {
                if let Err(err) = acquire_lock(&txn, key.as_str()).await {
                    if let Err(rollback_err) = txn.rollback().await {
                        warn!(
                            lock = key.as_str(),
                            error = %rollback_err,
                            "rollback after failed advisory lock failed"
                        );
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self { txn })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }

    pub async fn rollback(self) -> Result<(), DbErr> {
        self.txn.rollback().await
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), DbErr> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
