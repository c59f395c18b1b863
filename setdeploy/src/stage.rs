//! Numbered deployment stages and their progress marker.
//!
//! `state.last_deployment_stage` holds the number of the next stage to run.
//! It only moves forward, and only after a stage body succeeded. Stages must
//! still be idempotent on their own: a stage that fails half way is re-run
//! from the start.

use std::{collections::BTreeMap, future::Future, path::Path};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use setdeploy_contract::Chain;
use tracing::info;

use crate::{
    context::DeployContext,
    outputs::{LAST_DEPLOYMENT_STAGE, OutputStore, OutputsError},
};

/// The number in front of the first `_` of a stage file name:
/// `deploy/003_bed_manager_migrations.rs` is stage 3.
pub fn stage_number(file_name: &str) -> Option<u64> {
    let name = Path::new(file_name).file_name()?.to_str()?;
    name.split('_').next()?.parse().ok()
}

#[derive(Debug, Clone, Copy)]
pub struct StageTracker<'a> {
    store: &'a OutputStore,
}

impl<'a> StageTracker<'a> {
    pub fn new(store: &'a OutputStore) -> Self {
        Self { store }
    }

    pub async fn is_already_finished(&self, stage: u64) -> Result<bool, OutputsError> {
        Ok(stage < self.store.last_deployment_stage().await?)
    }

    /// Run `body` and mark `stage` as finished if it succeeds.
    pub async fn track<F, T>(&self, stage: u64, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let value = body.await?;
        let last = self.store.last_deployment_stage().await?;
        let next = last.max(stage + 1);
        self.store.set_state(LAST_DEPLOYMENT_STAGE, next).await?;
        info!(stage, next, "stage finished");
        Ok(value)
    }
}

#[async_trait]
pub trait Stage<C: Chain>: Send + Sync {
    /// `{number}_{name}`, e.g. `002_issuance_module`.
    fn id(&self) -> &str;

    async fn run(&self, cx: &DeployContext<C>) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub ran: Vec<String>,
    pub skipped: Vec<String>,
}

/// Stages of one network, run in number order.
pub struct Pipeline<C: Chain> {
    stages: BTreeMap<u64, Box<dyn Stage<C>>>,
}

impl<C: Chain> Default for Pipeline<C> {
    fn default() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }
}

impl<C: Chain> Pipeline<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage<S: Stage<C> + 'static>(mut self, stage: S) -> Result<Self> {
        let Some(number) = stage_number(stage.id()) else {
            bail!("stage id {:?} does not start with a number", stage.id())
        };
        if let Some(existing) = self.stages.get(&number) {
            bail!(
                "stages {:?} and {:?} share number {number}",
                existing.id(),
                stage.id()
            )
        }
        self.stages.insert(number, Box::new(stage));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stages.values().map(|s| s.id())
    }

    pub async fn run(&self, cx: &DeployContext<C>) -> Result<PipelineReport> {
        cx.prepare().await?;
        let tracker = StageTracker::new(&cx.store);
        let mut report = PipelineReport::default();
        for (number, stage) in &self.stages {
            if tracker.is_already_finished(*number).await? {
                info!(stage = stage.id(), "already finished, skipping");
                report.skipped.push(stage.id().to_string());
                continue;
            }
            info!(stage = stage.id(), "running");
            tracker
                .track(*number, stage.run(cx))
                .await
                .with_context(|| format!("stage {} failed", stage.id()))?;
            report.ran.push(stage.id().to_string());
        }
        Ok(report)
    }
}
