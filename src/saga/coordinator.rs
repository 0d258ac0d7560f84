//! Saga coordinator: runs steps in order, compensates on failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};

use super::{Saga, SagaDefinition, SagaStatus, StepStatus};

/// Timeouts and sweeping intervals for saga execution.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Budget for each action step.
    pub step_timeout: Duration,
    /// Budget for each compensation step.
    pub compensation_timeout: Duration,
    /// How often the stale sweeper runs.
    pub sweep_interval: Duration,
    /// An executing saga untouched for this long is marked failed.
    pub stale_after: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            compensation_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(600),
        }
    }
}

/// Runs saga instances against their registered definitions.
///
/// Steps execute strictly in order. The first failure stops forward
/// progress and triggers a best-effort rollback: compensations for the
/// already completed steps run in reverse order, and a compensation
/// failure is recorded but never halts the walk.
pub struct SagaCoordinator {
    definitions: RwLock<HashMap<String, Arc<SagaDefinition>>>,
    sagas: RwLock<HashMap<Uuid, Saga>>,
    config: SagaConfig,
}

impl SagaCoordinator {
    pub fn new(config: SagaConfig) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            sagas: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a saga blueprint under its name.
    pub async fn register_definition(&self, definition: SagaDefinition) -> Result<()> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(definition.name()) {
            return Err(CoreError::HandlerAlreadyRegistered(
                definition.name().to_string(),
            ));
        }
        info!(saga.name = definition.name(), "saga definition registered");
        definitions.insert(definition.name().to_string(), Arc::new(definition));
        Ok(())
    }

    /// Create a pending saga instance from a registered definition.
    pub async fn start_saga(&self, definition_name: &str, data: Value) -> Result<Uuid> {
        let definition = self.definition(definition_name).await?;
        let saga = definition.instantiate(data);
        let id = saga.id;
        info!(saga.name = definition_name, saga.id = %id, "saga started");
        self.sagas.write().await.insert(id, saga);
        Ok(id)
    }

    /// Run a pending saga to its terminal status.
    pub async fn execute_saga(&self, saga_id: Uuid) -> Result<SagaStatus> {
        // claim the saga atomically: check pending and flip to executing
        // under one write lock, so a concurrent caller can never also pass
        // the guard and run the steps a second time. The clone keeps the
        // lock from being held across handler awaits.
        let mut saga = {
            let mut sagas = self.sagas.write().await;
            let saga = sagas
                .get_mut(&saga_id)
                .ok_or(CoreError::SagaNotFound(saga_id))?;
            if saga.status != SagaStatus::Pending {
                return Err(CoreError::SagaNotExecutable {
                    saga_id,
                    status: saga.status.to_string(),
                });
            }
            saga.status = SagaStatus::Executing;
            saga.updated_at = Utc::now();
            saga.clone()
        };

        let definition = match self.definition(&saga.name).await {
            Ok(definition) => definition,
            Err(e) => {
                // the claim already happened; don't leave the saga stuck
                saga.status = SagaStatus::Failed;
                self.store(&mut saga).await;
                return Err(e);
            }
        };

        for index in 0..saga.steps.len() {
            saga.steps[index].status = StepStatus::Executing;
            self.store(&mut saga).await;

            match self.run_action(&definition, &mut saga, index).await {
                Ok(()) => {
                    saga.steps[index].status = StepStatus::Completed;
                    saga.steps[index].executed_at = Some(Utc::now());
                    self.store(&mut saga).await;
                }
                Err(e) => {
                    error!(
                        saga.id = %saga_id,
                        saga.step = %saga.steps[index].name,
                        error = %e,
                        "saga step failed"
                    );
                    saga.steps[index].status = StepStatus::Failed;
                    saga.steps[index].error = Some(e.to_string());
                    saga.status = SagaStatus::Compensating;
                    self.store(&mut saga).await;

                    self.compensate(&definition, &mut saga, index).await;

                    saga.status = SagaStatus::Compensated;
                    self.store(&mut saga).await;
                    return Ok(SagaStatus::Compensated);
                }
            }
        }

        saga.status = SagaStatus::Completed;
        self.store(&mut saga).await;
        info!(saga.id = %saga_id, saga.name = %saga.name, "saga completed");
        Ok(SagaStatus::Completed)
    }

    pub async fn get_saga(&self, saga_id: Uuid) -> Option<Saga> {
        self.sagas.read().await.get(&saga_id).cloned()
    }

    /// Run one action under its timeout and merge its output into the
    /// saga's data document.
    async fn run_action(
        &self,
        definition: &SagaDefinition,
        saga: &mut Saga,
        index: usize,
    ) -> Result<()> {
        let step = &saga.steps[index];
        let handler = definition
            .handler_for(&step.action)
            .ok_or_else(|| CoreError::HandlerNotFound(step.action.clone()))?;

        let outcome = tokio::time::timeout(self.config.step_timeout, handler.execute(&saga.data))
            .await
            .map_err(|_| CoreError::StepTimeout {
                saga_id: saga.id,
                step: step.name.clone(),
                timeout: self.config.step_timeout,
            })?;

        let output = outcome.map_err(|e| CoreError::StepFailed {
            step: step.name.clone(),
            reason: e.to_string(),
        })?;

        merge_into(&mut saga.data, output);
        Ok(())
    }

    /// Walk the completed steps before `failed_index` in reverse and run
    /// their compensations. Failures are recorded on the step and the
    /// walk continues.
    async fn compensate(&self, definition: &SagaDefinition, saga: &mut Saga, failed_index: usize) {
        for index in (0..failed_index).rev() {
            if saga.steps[index].status != StepStatus::Completed {
                continue;
            }

            let Some(compensation) = saga.steps[index].compensation.clone() else {
                debug!(
                    saga.id = %saga.id,
                    saga.step = %saga.steps[index].name,
                    "step has no compensation"
                );
                saga.steps[index].status = StepStatus::Compensated;
                self.store(saga).await;
                continue;
            };

            let Some(handler) = definition.handler_for(&compensation) else {
                warn!(
                    saga.id = %saga.id,
                    saga.step = %saga.steps[index].name,
                    compensation = %compensation,
                    "compensation handler missing"
                );
                saga.steps[index].error =
                    Some(format!("compensation handler not found: {compensation}"));
                self.store(saga).await;
                continue;
            };

            let outcome = tokio::time::timeout(
                self.config.compensation_timeout,
                handler.execute(&saga.data),
            )
            .await;

            match outcome {
                Ok(Ok(_)) => {
                    saga.steps[index].status = StepStatus::Compensated;
                }
                Ok(Err(e)) => {
                    warn!(
                        saga.id = %saga.id,
                        saga.step = %saga.steps[index].name,
                        error = %e,
                        "compensation failed"
                    );
                    saga.steps[index].error = Some(format!("compensation failed: {e}"));
                }
                Err(_) => {
                    warn!(
                        saga.id = %saga.id,
                        saga.step = %saga.steps[index].name,
                        "compensation timed out"
                    );
                    saga.steps[index].error = Some("compensation timed out".to_string());
                }
            }
            self.store(saga).await;
        }
    }

    async fn definition(&self, name: &str) -> Result<Arc<SagaDefinition>> {
        self.definitions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSagaDefinition(name.to_string()))
    }

    /// Checkpoint the saga back into the instance map.
    async fn store(&self, saga: &mut Saga) {
        saga.updated_at = Utc::now();
        self.sagas.write().await.insert(saga.id, saga.clone());
    }

    /// Background worker that fails sagas stuck in `Executing`, e.g.
    /// after the task driving them was dropped mid-flight.
    pub fn spawn_stale_sweeper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let cutoff = Utc::now()
                            - chrono::Duration::from_std(coordinator.config.stale_after)
                                .unwrap_or_else(|_| chrono::Duration::seconds(600));
                        let mut sagas = coordinator.sagas.write().await;
                        for saga in sagas.values_mut() {
                            if saga.status == SagaStatus::Executing && saga.updated_at < cutoff {
                                warn!(saga.id = %saga.id, saga.name = %saga.name, "marking stale saga failed");
                                saga.status = SagaStatus::Failed;
                                saga.updated_at = Utc::now();
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("saga sweeper stopping");
                        return;
                    }
                }
            }
        })
    }
}

/// Merge the fields of an object into the data document. Non-object
/// outputs are ignored.
fn merge_into(data: &mut Value, output: Value) {
    if let (Value::Object(target), Value::Object(fields)) = (data, output) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
}
