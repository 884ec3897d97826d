//! Database transaction utilities
//!
//! Multi-statement writes (media creation with its edges, vector replacement,
//! job claiming) run inside a [`TransactionGuard`].

use sqlx::{PgPool, Postgres, Transaction};
use std::ops::{Deref, DerefMut};

use vista_core::StoreResult;

/// A database transaction wrapper that must be explicitly committed
///
/// Dropping an uncommitted guard rolls the transaction back (sqlx rolls back
/// on drop) and logs a warning, so early returns through `?` never leave
/// partial writes behind.
///
/// # Example
///
/// ```ignore
/// use vista_db::db::transaction::TransactionGuard;
///
/// async fn example(pool: &sqlx::PgPool) -> vista_core::StoreResult<()> {
///     let mut tx = TransactionGuard::begin(pool).await?;
///     sqlx::query("INSERT INTO ...").execute(&mut **tx).await?;
///     tx.commit().await?;
///     Ok(())
/// }
/// ```
pub struct TransactionGuard<'a> {
    transaction: Option<Transaction<'a, Postgres>>,
    label: &'static str,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a new database transaction
    pub async fn begin(pool: &'a PgPool) -> StoreResult<Self> {
        Self::begin_labeled(pool, "unnamed").await
    }

    /// Begin a transaction with a label used in drop warnings
    pub async fn begin_labeled(pool: &'a PgPool, label: &'static str) -> StoreResult<Self> {
        let transaction = pool.begin().await?;

        Ok(Self {
            transaction: Some(transaction),
            label,
        })
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> StoreResult<()> {
        if let Some(tx) = self.transaction.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    /// Roll the transaction back
    pub async fn rollback(mut self) -> StoreResult<()> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

impl<'a> Deref for TransactionGuard<'a> {
    type Target = Transaction<'a, Postgres>;

    fn deref(&self) -> &Self::Target {
        self.transaction
            .as_ref()
            .expect("Transaction was already committed or rolled back")
    }
}

impl<'a> DerefMut for TransactionGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.transaction
            .as_mut()
            .expect("Transaction was already committed or rolled back")
    }
}

impl<'a> Drop for TransactionGuard<'a> {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            tracing::warn!(
                transaction = self.label,
                "Transaction dropped without commit - rolling back"
            );
        }
    }
}
