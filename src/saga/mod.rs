//! Saga types and definitions.
//!
//! A saga is an ordered sequence of steps executed by the
//! [`coordinator::SagaCoordinator`]. Each step names an action handler
//! and optionally a compensation handler that undoes it if a later step
//! fails.

pub mod coordinator;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

pub use coordinator::{SagaConfig, SagaCoordinator};

/// Lifecycle of a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SagaStatus::Pending => "pending",
            SagaStatus::Executing => "executing",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Compensated => "compensated",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Compensated,
}

/// One step of a running saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStep {
    pub id: Uuid,
    pub name: String,
    pub action: String,
    pub compensation: Option<String>,
    pub status: StepStatus,
    pub error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// A saga instance with its accumulated data document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saga {
    pub id: Uuid,
    pub name: String,
    pub status: SagaStatus,
    pub steps: Vec<SagaStep>,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Executes one saga action or compensation.
///
/// The handler receives the saga's current data document. On success it
/// returns an object whose fields are merged back into the document for
/// later steps to read.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, data: &Value) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> StepHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn execute(&self, data: &Value) -> Result<Value> {
        (self.0)(data.clone()).await
    }
}

/// Wrap an async closure as a [`StepHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn StepHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Blueprint for one step.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub name: String,
    pub action: String,
    pub compensation: Option<String>,
}

/// A named saga blueprint: ordered steps plus the handlers for their
/// actions and compensations.
pub struct SagaDefinition {
    name: String,
    steps: Vec<StepDefinition>,
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl SagaDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Add a step with no compensation. If it succeeds and a later step
    /// fails, the rollback walk records it as compensated without
    /// running anything.
    pub fn step(mut self, name: &str, action: &str) -> Self {
        self.steps.push(StepDefinition {
            name: name.to_string(),
            action: action.to_string(),
            compensation: None,
        });
        self
    }

    /// Add a step whose effects `compensation` undoes.
    pub fn compensated_step(mut self, name: &str, action: &str, compensation: &str) -> Self {
        self.steps.push(StepDefinition {
            name: name.to_string(),
            action: action.to_string(),
            compensation: Some(compensation.to_string()),
        });
        self
    }

    /// Bind a handler to an action or compensation name.
    pub fn handler(mut self, action: &str, handler: Arc<dyn StepHandler>) -> Self {
        self.handlers.insert(action.to_string(), handler);
        self
    }

    pub fn handler_for(&self, action: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(action).cloned()
    }

    /// Instantiate a pending saga from this blueprint.
    pub fn instantiate(&self, data: Value) -> Saga {
        let now = Utc::now();
        Saga {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            status: SagaStatus::Pending,
            steps: self
                .steps
                .iter()
                .map(|step| SagaStep {
                    id: Uuid::new_v4(),
                    name: step.name.clone(),
                    action: step.action.clone(),
                    compensation: step.compensation.clone(),
                    status: StepStatus::Pending,
                    error: None,
                    executed_at: None,
                })
                .collect(),
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_builder_preserves_step_order() {
        let definition = SagaDefinition::new("onboarding")
            .compensated_step("create", "player.create", "player.delete")
            .step("announce", "roster.announce");

        let steps = definition.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "create");
        assert_eq!(steps[0].compensation.as_deref(), Some("player.delete"));
        assert_eq!(steps[1].name, "announce");
        assert!(steps[1].compensation.is_none());
    }

    #[test]
    fn test_instantiate_builds_pending_saga() {
        let definition = SagaDefinition::new("onboarding").step("create", "player.create");
        let saga = definition.instantiate(json!({"username": "neo"}));

        assert_eq!(saga.name, "onboarding");
        assert_eq!(saga.status, SagaStatus::Pending);
        assert!(saga
            .steps
            .iter()
            .all(|step| step.status == StepStatus::Pending));
        assert_eq!(saga.data["username"], "neo");
    }

    #[tokio::test]
    async fn test_handler_fn_wraps_closures() {
        let handler = handler_fn(|data: Value| async move {
            Ok(json!({"echo": data["input"]}))
        });
        let out = handler.execute(&json!({"input": 7})).await.unwrap();
        assert_eq!(out["echo"], 7);
    }
}
