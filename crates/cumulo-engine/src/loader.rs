//! Dependency-retry loader
//!
//! Reconciliation units frequently fail on the first pass because a record
//! they reference has not been created yet (a listener needs its load
//! balancer, a role its policy). Rather than computing that ordering, the
//! loader runs every unit concurrently, then retries the failed subset for
//! as long as each round resolves at least one more unit. When a round
//! makes no progress the remaining failures are real, and they come back
//! aggregated into a single error.

use std::future::Future;
use std::pin::Pin;

use futures::future::join_all;
use thiserror::Error;
use tracing::debug;

/// One fallible unit of work, re-invocable for retries.
pub type Unit = Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// The failures left after retries stopped making progress.
#[derive(Debug, Error)]
#[error("{} unresolved: {}", errors.len(), errors.join("; "))]
pub struct LoaderError {
    /// One message per unresolved unit.
    pub errors: Vec<String>,
}

impl LoaderError {
    /// Number of units still failing.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.errors.len()
    }
}

/// Run units concurrently, retrying failures until none remain or a round
/// resolves nothing new.
pub async fn run_with_retries(units: Vec<Unit>) -> Result<(), LoaderError> {
    let mut pending: Vec<&Unit> = units.iter().collect();
    let mut last_failure_count = usize::MAX;

    while !pending.is_empty() {
        let results = join_all(pending.iter().map(|unit| unit())).await;

        let mut failed: Vec<&Unit> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        for (unit, result) in pending.into_iter().zip(results) {
            if let Err(message) = result {
                failed.push(unit);
                errors.push(message);
            }
        }

        if failed.is_empty() {
            return Ok(());
        }
        if failed.len() >= last_failure_count {
            return Err(LoaderError { errors });
        }
        debug!(
            remaining = failed.len(),
            "Retrying units that failed this round"
        );
        last_failure_count = failed.len();
        pending = failed;
    }
    Ok(())
}

/// Box a closure into a [`Unit`].
pub fn unit<F, Fut>(f: F) -> Unit
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_succeed_first_round() {
        let calls = Arc::new(AtomicUsize::new(0));
        let units: Vec<Unit> = (0..3)
            .map(|_| {
                let calls = calls.clone();
                unit(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
            })
            .collect();

        run_with_retries(units).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dependent_unit_succeeds_on_retry() {
        // The second unit fails until the first has run, emulating a record
        // that references one created by another unit.
        let created = Arc::new(AtomicBool::new(false));

        let c1 = created.clone();
        let first = unit(move || {
            let c1 = c1.clone();
            async move {
                c1.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        let c2 = created.clone();
        let second = unit(move || {
            let c2 = c2.clone();
            async move {
                if c2.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err("referenced record missing".to_string())
                }
            }
        });

        // Dependent listed first so at least one round must retry.
        run_with_retries(vec![second, first]).await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_units_aggregate() {
        let ok = unit(|| async { Ok(()) });
        let bad1 = unit(|| async { Err("queue q1: access denied".to_string()) });
        let bad2 = unit(|| async { Err("queue q2: access denied".to_string()) });

        let err = run_with_retries(vec![ok, bad1, bad2]).await.unwrap_err();
        assert_eq!(err.remaining(), 2);
        let message = err.to_string();
        assert!(message.contains("q1"));
        assert!(message.contains("q2"));
    }

    #[tokio::test]
    async fn test_retry_stops_without_progress() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let always_fails = unit(move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("permanent".to_string())
            }
        });

        run_with_retries(vec![always_fails]).await.unwrap_err();
        // The initial round plus one retry that makes no progress.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
