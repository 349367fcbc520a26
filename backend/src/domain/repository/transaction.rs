//! Transaction bracket and multi-operation execution policies.
//!
//! A [`Transaction`] is a small state machine: it starts `Active` and moves
//! exactly once to `Committed` or `RolledBack`. The bracket does not undo
//! operations that already reached the store; callers needing compensation
//! must provide it themselves.

use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::Repository;
use crate::domain::Error;

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Open; may be committed or rolled back.
    Active,
    /// Terminal.
    Committed,
    /// Terminal.
    RolledBack,
}

impl TransactionStatus {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Handle returned by [`Repository::begin_transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    id: Uuid,
    status: TransactionStatus,
    started_at: DateTime<Utc>,
}

impl Transaction {
    /// Transaction identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Instant the transaction was opened.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn finish(&mut self, next: TransactionStatus) -> Result<(), Error> {
        if self.status != TransactionStatus::Active {
            return Err(Error::invalid_transaction_state(format!(
                "transaction {} is already {}",
                self.id,
                self.status.as_str()
            ))
            .with_details(json!({
                "transactionId": self.id.to_string(),
                "status": self.status,
                "requested": next,
            })));
        }
        self.status = next;
        Ok(())
    }
}

/// Deferred unit of work run by [`Repository::execute_transaction`] or
/// [`Repository::execute_batch`].
pub type Operation<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<T, Error>> + Send + 'a>;

/// Box an async closure as an [`Operation`].
///
/// # Examples
/// ```
/// use dashboard_backend::domain::{Error, operation};
///
/// let op = operation(|| async { Ok::<_, Error>(42) });
/// # let _ = op;
/// ```
pub fn operation<'a, T, F, Fut>(f: F) -> Operation<'a, T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<T, Error>> + Send + 'a,
{
    Box::new(move || Box::pin(f()))
}

/// Failure of one batch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// Position of the operation in the submitted list.
    pub index: usize,
    /// Error it returned.
    pub error: Error,
}

/// Settled outcome of [`Repository::execute_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    /// Results of the successful operations, in submission order.
    pub successful_results: Vec<T>,
    /// Failures, in submission order.
    pub errors: Vec<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    /// Whether every operation succeeded.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<E, P> Repository<E, P> {
    /// Open a new transaction.
    pub fn begin_transaction(&self) -> Transaction {
        let transaction = Transaction {
            id: Uuid::new_v4(),
            status: TransactionStatus::Active,
            started_at: self.clock.utc(),
        };
        self.logger.info(
            "transaction started",
            json!({ "transactionId": transaction.id.to_string() }),
        );
        transaction
    }

    /// Commit an active transaction.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidTransactionState`] when the
    /// transaction is already committed or rolled back.
    pub fn commit(&self, transaction: &mut Transaction) -> Result<(), Error> {
        self.finish_transaction(transaction, TransactionStatus::Committed, "commit")
    }

    /// Roll back an active transaction.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::InvalidTransactionState`] when the
    /// transaction is already committed or rolled back.
    pub fn rollback(&self, transaction: &mut Transaction) -> Result<(), Error> {
        self.finish_transaction(transaction, TransactionStatus::RolledBack, "rollback")
    }

    fn finish_transaction(
        &self,
        transaction: &mut Transaction,
        next: TransactionStatus,
        action: &str,
    ) -> Result<(), Error> {
        let context = json!({ "transactionId": transaction.id.to_string() });
        self.logger.debug(&format!("transaction {action} started"), context.clone());
        match transaction.finish(next) {
            Ok(()) => {
                self.logger.info(&format!("transaction {action} succeeded"), context);
                Ok(())
            }
            Err(err) => {
                self.logger
                    .error_with(&format!("transaction {action} failed"), &err, context);
                Err(err)
            }
        }
    }

    /// Run `operations` one after another inside a transaction.
    ///
    /// The first failure rolls the transaction back and stops the run; later
    /// operations are never invoked.
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::TransactionAborted`] naming the index of
    /// the failing operation and embedding its error.
    pub async fn execute_transaction<'a, T>(
        &self,
        operations: Vec<Operation<'a, T>>,
    ) -> Result<Vec<T>, Error> {
        let started = Instant::now();
        let mut transaction = self.begin_transaction();
        let mut results = Vec::with_capacity(operations.len());
        for (index, run) in operations.into_iter().enumerate() {
            match run().await {
                Ok(value) => results.push(value),
                Err(cause) => {
                    self.rollback(&mut transaction)?;
                    let err = Error::transaction_aborted(index, &cause);
                    self.logger.error_with(
                        "transaction aborted",
                        &err,
                        json!({
                            "transactionId": transaction.id.to_string(),
                            "failedIndex": index,
                        }),
                    );
                    return Err(err);
                }
            }
        }
        self.commit(&mut transaction)?;
        self.logger.performance(
            "execute_transaction",
            started.elapsed(),
            json!({ "operations": results.len() }),
        );
        Ok(results)
    }

    /// Run `operations` concurrently and wait for all of them to settle.
    pub async fn execute_batch<'a, T>(&self, operations: Vec<Operation<'a, T>>) -> BatchOutcome<T> {
        let started = Instant::now();
        let total = operations.len();
        let settled = join_all(operations.into_iter().map(|run| run())).await;

        let mut outcome = BatchOutcome {
            successful_results: Vec::new(),
            errors: Vec::new(),
        };
        for (index, result) in settled.into_iter().enumerate() {
            match result {
                Ok(value) => outcome.successful_results.push(value),
                Err(error) => outcome.errors.push(BatchFailure { index, error }),
            }
        }

        let context = json!({ "operations": total, "failed": outcome.errors.len() });
        if outcome.success() {
            self.logger
                .performance("execute_batch", started.elapsed(), context);
        } else {
            self.logger.warn("batch completed with failures", context);
        }
        outcome
    }
}
