use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::config::ThresholdConfig;
use crate::models::{Decision, ScrapeOutcome};
use crate::notifier::{Dispatch, Notifier};
use crate::policy;
use crate::scheduler::{Clock, ScheduledJob};
use crate::session::PriceSource;

/// What one tick produced, end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: ScrapeOutcome,
    pub decision: Decision,
    pub dispatch: Dispatch,
}

/// Scrape, decide, notify.
pub struct PricePipeline {
    source: Arc<dyn PriceSource>,
    thresholds: ThresholdConfig,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl PricePipeline {
    pub fn new(
        source: Arc<dyn PriceSource>,
        thresholds: ThresholdConfig,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            thresholds,
            notifier,
            clock,
        }
    }

    pub async fn run_tick(&self) -> TickReport {
        let outcome = self.source.fetch().await;
        let decision = policy::decide(&outcome, &self.thresholds, self.clock.now());

        // Send errors are already logged by the notifier.
        let dispatch = match self.notifier.dispatch(&decision).await {
            Ok(dispatch) => dispatch,
            Err(e) => Dispatch::Failed { error: e.to_string() },
        };

        TickReport {
            outcome,
            decision,
            dispatch,
        }
    }
}

#[async_trait]
impl ScheduledJob for PricePipeline {
    async fn run(&self, scheduled_for: NaiveDateTime) -> Result<()> {
        let report = self.run_tick().await;
        tracing::info!(
            scheduled_for = %scheduled_for,
            outcome = report.outcome.kind(),
            decision = report.decision.kind(),
            dispatch = ?report.dispatch,
            "Tick finished"
        );
        Ok(())
    }
}
