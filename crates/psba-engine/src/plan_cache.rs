//! Plan parameter cache
//!
//! Keeps a snapshot of every plan's template parameters. Each refresh
//! reloads the full table from the [`PlanParameterSource`] and swaps the new
//! map in whole; a failed refresh keeps the previous snapshot. Readers take
//! an `Arc` of the current map and never block the refresh task.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum PlanCacheError {
    #[error("Plan parameter source error: {0}")]
    Source(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanParameter {
    pub name: String,
    pub value: String,
}

impl PlanParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        PlanParameter {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Plan name to its ordered parameters
pub type PlanParameters = HashMap<String, Vec<PlanParameter>>;

/// Where the parameter table lives
#[async_trait]
pub trait PlanParameterSource: Send + Sync {
    /// Load the complete parameter table
    async fn load(&self) -> Result<PlanParameters, PlanCacheError>;
}

/// Source serving a fixed table
#[derive(Debug, Clone, Default)]
pub struct StaticPlanParameters(pub PlanParameters);

#[async_trait]
impl PlanParameterSource for StaticPlanParameters {
    async fn load(&self) -> Result<PlanParameters, PlanCacheError> {
        Ok(self.0.clone())
    }
}

pub struct PlanParameterCache {
    source: Arc<dyn PlanParameterSource>,
    snapshot: ArcSwap<PlanParameters>,
    /// Flag to stop the background refresh task
    refresh_running: Arc<AtomicBool>,
}

impl PlanParameterCache {
    /// Create the cache and perform the initial load
    ///
    /// A failed initial load is logged and leaves the cache empty.
    pub async fn new(source: Arc<dyn PlanParameterSource>) -> Arc<Self> {
        let cache = Arc::new(PlanParameterCache {
            source,
            snapshot: ArcSwap::from_pointee(PlanParameters::new()),
            refresh_running: Arc::new(AtomicBool::new(false)),
        });

        if let Err(e) = cache.refresh().await {
            error!(error = %e, "Initial plan parameter load failed");
        }
        cache
    }

    /// Reload the table and swap it in; returns the number of plans
    pub async fn refresh(&self) -> Result<usize, PlanCacheError> {
        let parameters = self.source.load().await?;
        let plans = parameters.len();
        self.snapshot.store(Arc::new(parameters));
        debug!(plans = plans, "Plan parameters refreshed");
        Ok(plans)
    }

    /// Current complete snapshot
    pub fn snapshot(&self) -> Arc<PlanParameters> {
        self.snapshot.load_full()
    }

    /// Parameters for one plan, empty if unknown
    pub fn parameters(&self, plan: &str) -> Vec<PlanParameter> {
        self.snapshot
            .load()
            .get(plan)
            .cloned()
            .unwrap_or_default()
    }

    /// Start refreshing every `period` until [`PlanParameterCache::stop`]
    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let running = Arc::clone(&self.refresh_running);
        running.store(true, Ordering::Relaxed);

        info!(period_secs = period.as_secs_f64(), "Starting plan parameter refresh");

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            // first tick completes immediately and the initial load already ran
            interval.tick().await;

            while running.load(Ordering::Relaxed) {
                interval.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = cache.refresh().await {
                    error!(error = %e, "Plan parameter refresh failed; keeping previous snapshot");
                }
            }

            debug!("Plan parameter refresh task stopped");
        })
    }

    pub fn stop(&self) {
        self.refresh_running.store(false, Ordering::Relaxed);
    }
}
