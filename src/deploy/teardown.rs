//! Best-effort teardown of provisioned resources
//!
//! Remote resources often delete asynchronously: removing a parent (a
//! project, a network) fails transiently while the backend is still
//! reclaiming its children. The coordinator therefore retries each
//! deletion with a linearly growing backoff, records exhausted retries as
//! warnings, and always continues to the next resource kind: leaving one
//! stubborn resource behind beats aborting the whole cleanup.
//!
//! Confirmation gates are a separate concern from the retry mechanics:
//! [`confirm_destroy`] and [`confirm_reset`] talk to the user, while
//! [`TeardownCoordinator::run`] only deletes.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;

use super::interaction::UserInteraction;
use crate::error::{CapstanError, ErrorCode};

type DeleteFn = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// One deletable resource: an opaque provider-specific reference plus the
/// deletion mechanics, which the coordinator never looks inside
pub struct ResourcePlan {
    pub kind: String,
    delete: DeleteFn,
}

impl ResourcePlan {
    pub fn new<F, Fut>(kind: impl Into<String>, delete: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            kind: kind.into(),
            delete: Box::new(move || Box::pin(delete())),
        }
    }
}

/// Bounded linear backoff for eventually-consistent remote deletion
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay inserted after failed attempt `attempt` (1-based); grows
    /// linearly, so it is non-decreasing in the attempt number
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

/// What happened to one resource kind
#[derive(Debug)]
pub struct ResourceOutcome {
    pub kind: String,
    pub attempts: u32,
    pub result: Result<(), String>,
}

impl ResourceOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregated result of a teardown pass over all resource kinds
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub outcomes: Vec<ResourceOutcome>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(ResourceOutcome::succeeded)
    }

    pub fn failed_kinds(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.kind.as_str())
            .collect()
    }
}

pub struct TeardownCoordinator {
    policy: RetryPolicy,
}

impl Default for TeardownCoordinator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl TeardownCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Delete every resource in plan order, best-effort
    ///
    /// A resource that fails all retry attempts is reported as a warning
    /// and the coordinator moves on; later kinds are always attempted.
    pub async fn run(
        &self,
        plans: &[ResourcePlan],
        interaction: &dyn UserInteraction,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();

        for plan in plans {
            interaction.display_info(&format!("Removing {}...", plan.kind));
            let outcome = self.delete_with_retry(plan).await;

            match &outcome.result {
                Ok(()) => {
                    interaction.display_success(&format!("{} removed", plan.kind));
                }
                Err(error) => {
                    interaction.display_warning(&format!(
                        "Could not remove {} after {} attempts: {}",
                        plan.kind, outcome.attempts, error
                    ));
                }
            }
            report.outcomes.push(outcome);
        }

        if !report.is_clean() {
            interaction.display_warning(&format!(
                "Some resources need manual cleanup: {}",
                report.failed_kinds().join(", ")
            ));
        }
        report
    }

    /// Retry one deletion up to the policy bound
    async fn delete_with_retry(&self, plan: &ResourcePlan) -> ResourceOutcome {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match (plan.delete)().await {
                Ok(()) => {
                    return ResourceOutcome {
                        kind: plan.kind.clone(),
                        attempts: attempt,
                        result: Ok(()),
                    }
                }
                Err(err) => {
                    last_error = format!("{err:#}");
                    tracing::debug!(
                        kind = %plan.kind,
                        attempt,
                        error = %last_error,
                        "resource deletion attempt failed"
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        ResourceOutcome {
            kind: plan.kind.clone(),
            attempts: self.policy.max_attempts,
            result: Err(last_error),
        }
    }
}

/// First gate: every destructive flow starts with an explicit confirmation
pub async fn confirm_destroy(
    interaction: &dyn UserInteraction,
    project_name: &str,
    kinds: &[&str],
) -> anyhow::Result<bool> {
    interaction.display_warning(&format!(
        "This will permanently delete: {}",
        kinds.join(", ")
    ));
    let confirmed = interaction
        .prompt_yes_no(&format!("Destroy deployment '{project_name}'?"))
        .await?;
    if !confirmed {
        interaction.display_info("Aborted, nothing was deleted");
    }
    Ok(confirmed)
}

/// Second, distinct gate for cascading deletions: resetting removes the
/// application AND its parent project, so a stray "y" is not enough
pub async fn confirm_reset(
    interaction: &dyn UserInteraction,
    project_name: &str,
) -> anyhow::Result<bool> {
    let first = interaction
        .prompt_yes_no(&format!(
            "Reset will delete the application and the project '{project_name}' itself. Continue?"
        ))
        .await?;
    if !first {
        interaction.display_info("Aborted, nothing was deleted");
        return Ok(false);
    }

    let second = interaction
        .prompt_phrase("This cannot be undone.", project_name)
        .await?;
    if !second {
        interaction.display_info("Confirmation phrase did not match, nothing was deleted");
    }
    Ok(second)
}

/// Turn a non-clean report into the error surfaced to the CLI
pub fn report_to_error(report: &TeardownReport) -> Option<CapstanError> {
    if report.is_clean() {
        None
    } else {
        Some(CapstanError::teardown_with_code(
            ErrorCode::TEARDOWN_PARTIAL,
            format!(
                "resources left behind: {}",
                report.failed_kinds().join(", ")
            ),
            None,
        ))
    }
}
