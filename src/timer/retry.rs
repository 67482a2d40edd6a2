//! Ordered-strategy retry with post-attempt verification.

use crate::error::Result;
use std::fmt::Debug;
use std::future::Future;
use tracing::{debug, warn};

/// Result of [`attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<S> {
    /// `strategy` applied and verified on attempt number `attempts` (1-based).
    Succeeded { strategy: S, attempts: usize },
    /// Every strategy failed to apply or to verify.
    Exhausted {
        attempts: usize,
        last_error: Option<String>,
    },
}

impl<S> AttemptOutcome<S> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Try `strategies` in order until one both applies and verifies.
///
/// A strategy whose `apply` returns `Ok` but whose `verify` returns `false`
/// counts as failed and the next one is tried.
pub async fn attempt<S, Apply, ApplyFut, Verify, VerifyFut>(
    strategies: &[S],
    mut apply: Apply,
    mut verify: Verify,
) -> AttemptOutcome<S>
where
    S: Copy + Debug,
    Apply: FnMut(S) -> ApplyFut,
    ApplyFut: Future<Output = Result<()>>,
    Verify: FnMut(S) -> VerifyFut,
    VerifyFut: Future<Output = bool>,
{
    let mut last_error = None;

    for (index, strategy) in strategies.iter().copied().enumerate() {
        let attempt_no = index + 1;
        match apply(strategy).await {
            Ok(()) => {
                if verify(strategy).await {
                    debug!(attempt = attempt_no, ?strategy, "strategy verified");
                    return AttemptOutcome::Succeeded {
                        strategy,
                        attempts: attempt_no,
                    };
                }
                warn!(
                    attempt = attempt_no,
                    ?strategy,
                    "strategy applied but verification failed"
                );
                last_error = Some(format!("{strategy:?} did not verify"));
            }
            Err(e) => {
                warn!(attempt = attempt_no, ?strategy, "strategy failed: {e}");
                last_error = Some(e.to_string());
            }
        }
    }

    AttemptOutcome::Exhausted {
        attempts: strategies.len(),
        last_error,
    }
}
