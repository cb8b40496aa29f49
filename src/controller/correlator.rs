//! Maps engine result reports back onto steps

use crate::controller::{Controller, ControllerError};
use crate::core::{Step, StepStatus};
use crate::echoer::FlowRunReport;
use chrono::Utc;
use tracing::{debug, error, info, warn};

/// Tally of one report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    /// The report was not issued by this controller (or its name is malformed)
    pub ignored: bool,
    /// Steps whose status was written
    pub updated: usize,
    /// Steps already carrying the reported outcome
    pub unchanged: usize,
    /// Actions the engine has not finished yet
    pub running: usize,
    /// Actions that could not be correlated
    pub skipped: usize,
}

/// Attempts at writing one outcome when the step keeps changing underneath
const APPLY_ATTEMPTS: usize = 3;

enum Recorded {
    Updated,
    Unchanged,
    Skipped,
}

/// Split a request name into `(prefix, timestamp)`
///
/// Only names with exactly one `_` qualify.
pub fn parse_request_name(name: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = name.split('_').collect();
    match parts.as_slice() {
        [prefix, timestamp] => Some((*prefix, *timestamp)),
        _ => None,
    }
}

/// Split an action name into `(kind, step_uuid)`
pub fn parse_step_name(name: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = name.split('_').collect();
    match parts.as_slice() {
        [kind, uuid] if !kind.is_empty() && !uuid.is_empty() => Some((*kind, *uuid)),
        _ => None,
    }
}

impl Controller {
    /// Subscribe to the engine's result stream and correlate every report
    ///
    /// Replays the last `result_lookback_secs` of reports on subscribe. Only
    /// returns when the subscription fails or the stream ends.
    pub async fn watch_results(&self) -> Result<(), ControllerError> {
        let since = Utc::now().timestamp() - self.config.result_lookback_secs;
        let mut reports = self.engine.watch_reports(since).await?;
        info!("[echoer] start watching results since {}", since);

        while let Some(item) = reports.recv().await {
            match item {
                Ok(report) => {
                    let this = self.clone();
                    self.spawn(async move {
                        this.handle_report(&report).await;
                    });
                }
                Err(e) => warn!("[echoer] skipping bad report: {}", e),
            }
        }

        Err(ControllerError::StreamClosed("execution result"))
    }

    /// Apply the outcome of every finished action in a report to its step
    pub async fn handle_report(&self, report: &FlowRunReport) -> CorrelationSummary {
        let mut summary = CorrelationSummary::default();

        match parse_request_name(report.name()) {
            Some((prefix, _)) if prefix == self.config.server_name => {}
            _ => {
                debug!("[echoer] ignoring flow run {}", report.name());
                summary.ignored = true;
                return summary;
            }
        }
        info!("[echoer] get flow run {}", report.name());

        for action in report.steps() {
            if !action.is_done() {
                summary.running += 1;
                continue;
            }

            let Some((_, step_uuid)) = parse_step_name(action.name()) else {
                warn!(
                    "[echoer] flow run {} has malformed step name {}",
                    report.name(),
                    action.name()
                );
                summary.skipped += 1;
                continue;
            };

            let outcome = if action.succeeded() {
                StepStatus::Finish
            } else {
                StepStatus::Fail
            };
            match self.record_outcome(step_uuid, outcome).await {
                Recorded::Updated => summary.updated += 1,
                Recorded::Unchanged => summary.unchanged += 1,
                Recorded::Skipped => summary.skipped += 1,
            }
        }

        summary
    }

    /// Write an outcome onto a step, re-reading it when a concurrent write
    /// (typically the dispatcher's `Sending`) got there first
    async fn record_outcome(&self, step_uuid: &str, outcome: StepStatus) -> Recorded {
        for attempt in 1..=APPLY_ATTEMPTS {
            let mut step = match self.resources.get::<Step>(step_uuid).await {
                Ok(Some(step)) => step,
                Ok(None) => {
                    warn!("[echoer] step {} not found", step_uuid);
                    return Recorded::Skipped;
                }
                Err(e) => {
                    error!("[echoer] get step {} error: {}", step_uuid, e);
                    return Recorded::Skipped;
                }
            };
            if step.status() == outcome {
                return Recorded::Unchanged;
            }

            step.spec.step_status = outcome;
            match self.resources.apply(&step).await {
                Ok(_) => {
                    info!("[echoer] step {} -> {:?}", step_uuid, outcome);
                    return Recorded::Updated;
                }
                Err(e) if e.is_conflict() => {
                    debug!("[echoer] step {} changed, retrying ({}): {}", step_uuid, attempt, e);
                }
                Err(e) => {
                    error!("[echoer] apply step {} error: {}", step_uuid, e);
                    return Recorded::Skipped;
                }
            }
        }

        warn!(
            "[echoer] giving up on step {} after {} conflicting writes",
            step_uuid, APPLY_ATTEMPTS
        );
        Recorded::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_name() {
        assert_eq!(parse_request_name("myserver_170000"), Some(("myserver", "170000")));
        assert_eq!(parse_request_name("myserver-170000"), None);
        assert_eq!(parse_request_name("my_server_170000"), None);
    }

    #[test]
    fn test_parse_step_name() {
        assert_eq!(parse_step_name("CI_abc123"), Some(("CI", "abc123")));
        assert_eq!(parse_step_name("CD-abc123"), None);
        assert_eq!(parse_step_name("CI_"), None);
        assert_eq!(parse_step_name("CI_a_b"), None);
    }
}
