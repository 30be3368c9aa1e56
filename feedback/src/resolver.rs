//! Maps the page a visitor came from to a lab or experiment in the catalog.
//!
//! Strategies are tried in a fixed order and the first one that finds a
//! match wins:
//!
//! ```text
//! referrer ─┬─ absent ───────────────────────────────► Generic
//!           └─ labs?hosted_url ─┬─ match ────────────► Lab
//!                               └─ experiments?content_url ─┬─ match ──► Experiment
//!                                                           └─ experiments?simulation_url
//!                                                                ├─ match ──► Experiment
//!                                                                └─ none ───► Generic
//! ```
//!
//! A failing lookup ends the chain with `Generic`. The form still renders,
//! just without context.

use crate::data_service::DataService;
use crate::errors::DataServiceError;
use crate::metrics_defs::{LOOKUP_FAILURES, RESOLUTIONS, RESOLUTION_DURATION};
use crate::types::{EntityId, Experiment, Lab};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedContext {
    /// No referrer or no catalog match
    Generic,
    Lab {
        lab_id: EntityId,
        lab_name: String,
    },
    Experiment {
        lab_id: EntityId,
        lab_name: String,
        experiment_id: EntityId,
        experiment_name: String,
    },
}

impl ResolvedContext {
    fn outcome(&self) -> &'static str {
        match self {
            ResolvedContext::Generic => "generic",
            ResolvedContext::Lab { .. } => "lab",
            ResolvedContext::Experiment { .. } => "experiment",
        }
    }
}

impl From<Lab> for ResolvedContext {
    fn from(lab: Lab) -> Self {
        ResolvedContext::Lab {
            lab_id: lab.id,
            lab_name: lab.name,
        }
    }
}

impl From<Experiment> for ResolvedContext {
    fn from(experiment: Experiment) -> Self {
        ResolvedContext::Experiment {
            lab_id: experiment.lab.id,
            lab_name: experiment.lab.name,
            experiment_id: experiment.id,
            experiment_name: experiment.name,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    LabByHostedUrl,
    ExperimentByContentUrl,
    ExperimentBySimulationUrl,
}

pub const DEFAULT_PRECEDENCE: [Strategy; 3] = [
    Strategy::LabByHostedUrl,
    Strategy::ExperimentByContentUrl,
    Strategy::ExperimentBySimulationUrl,
];

impl Strategy {
    pub const fn name(&self) -> &'static str {
        match self {
            Strategy::LabByHostedUrl => "lab_by_hosted_url",
            Strategy::ExperimentByContentUrl => "experiment_by_content_url",
            Strategy::ExperimentBySimulationUrl => "experiment_by_simulation_url",
        }
    }

    /// Runs the lookup and keeps only the first match.
    async fn lookup(
        &self,
        data_service: &dyn DataService,
        referrer: &str,
    ) -> Result<Option<ResolvedContext>, DataServiceError> {
        let context = match self {
            Strategy::LabByHostedUrl => data_service
                .find_lab_by_hosted_url(referrer)
                .await?
                .into_iter()
                .next()
                .map(ResolvedContext::from),
            Strategy::ExperimentByContentUrl => data_service
                .find_experiment_by_content_url(referrer)
                .await?
                .into_iter()
                .next()
                .map(ResolvedContext::from),
            Strategy::ExperimentBySimulationUrl => data_service
                .find_experiment_by_simulation_url(referrer)
                .await?
                .into_iter()
                .next()
                .map(ResolvedContext::from),
        };

        Ok(context)
    }
}

pub struct ReferrerResolver {
    data_service: Arc<dyn DataService>,
    strategies: Vec<Strategy>,
}

impl ReferrerResolver {
    pub fn new(data_service: Arc<dyn DataService>) -> Self {
        Self::with_strategies(data_service, DEFAULT_PRECEDENCE.to_vec())
    }

    pub fn with_strategies(data_service: Arc<dyn DataService>, strategies: Vec<Strategy>) -> Self {
        ReferrerResolver {
            data_service,
            strategies,
        }
    }

    pub async fn resolve(&self, referrer: Option<&str>) -> ResolvedContext {
        let start = Instant::now();
        let context = match referrer {
            Some(referrer) => self.resolve_referrer(referrer).await,
            None => ResolvedContext::Generic,
        };

        counter!(RESOLUTIONS, "outcome" => context.outcome()).increment(1);
        histogram!(RESOLUTION_DURATION).record(start.elapsed().as_secs_f64());

        context
    }

    async fn resolve_referrer(&self, referrer: &str) -> ResolvedContext {
        for strategy in &self.strategies {
            match strategy.lookup(self.data_service.as_ref(), referrer).await {
                Ok(Some(context)) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        referrer,
                        "Resolved referrer"
                    );
                    return context;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        referrer,
                        error = %e,
                        "Referrer lookup failed, rendering the generic form"
                    );
                    counter!(LOOKUP_FAILURES, "strategy" => strategy.name()).increment(1);
                    return ResolvedContext::Generic;
                }
            }
        }

        ResolvedContext::Generic
    }
}
