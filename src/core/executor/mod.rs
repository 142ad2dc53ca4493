//! The opaque executor channel. The router reads scene state through it
//! and hands finished call sequences to it; everything behind it is an
//! external collaborator.

use crate::core::error::AppError;
use async_trait::async_trait;
use serde_json::{json, Value};
use signalbox_types::{CorrectedToolCall, ErrorCategory};
use std::sync::Mutex;

/// Side-effect-free request forms the router may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorRequest {
    /// Full scene state: mode, objects, topology.
    SceneState,
    /// Just the selection counts; cheap, used to keep cached scene
    /// contexts hot.
    SelectionCounts,
}

#[async_trait]
pub trait ExecutorChannel: Send + Sync {
    async fn query(&self, request: ExecutorRequest) -> Result<Value, AppError>;

    /// Hand an ordered call sequence to the executor.
    async fn dispatch(&self, calls: &[CorrectedToolCall]) -> Result<(), AppError>;
}

/// Channel used when no executor is configured; every query fails so the
/// analyzer degrades.
pub struct NullExecutor;

#[async_trait]
impl ExecutorChannel for NullExecutor {
    async fn query(&self, _request: ExecutorRequest) -> Result<Value, AppError> {
        Err(AppError::new(ErrorCategory::ExecutorError, "no executor configured")
            .with_code("RTR-EXE-001"))
    }

    async fn dispatch(&self, _calls: &[CorrectedToolCall]) -> Result<(), AppError> {
        Err(AppError::new(ErrorCategory::ExecutorError, "no executor configured")
            .with_code("RTR-EXE-001"))
    }
}

/// Scripted channel for tests: serves a fixed scene payload and records
/// dispatched calls.
pub struct MockExecutor {
    scene: Mutex<Value>,
    fail_queries: bool,
    dispatched: Mutex<Vec<CorrectedToolCall>>,
}

impl MockExecutor {
    pub fn new(scene: Value) -> Self {
        MockExecutor {
            scene: Mutex::new(scene),
            fail_queries: false,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        MockExecutor {
            scene: Mutex::new(Value::Null),
            fail_queries: true,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub fn set_scene(&self, scene: Value) {
        *self.scene.lock().expect("mock lock poisoned") = scene;
    }

    pub fn dispatched(&self) -> Vec<CorrectedToolCall> {
        self.dispatched.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl ExecutorChannel for MockExecutor {
    async fn query(&self, request: ExecutorRequest) -> Result<Value, AppError> {
        if self.fail_queries {
            return Err(
                AppError::new(ErrorCategory::ExecutorError, "executor unreachable")
                    .with_code("RTR-EXE-002"),
            );
        }
        let scene = self.scene.lock().expect("mock lock poisoned").clone();
        match request {
            ExecutorRequest::SceneState => Ok(scene),
            ExecutorRequest::SelectionCounts => {
                let topology = scene.get("topology").cloned().unwrap_or_else(|| json!({}));
                Ok(json!({
                    "selected_verts": topology.get("selected_verts").cloned().unwrap_or(json!(0)),
                    "selected_edges": topology.get("selected_edges").cloned().unwrap_or(json!(0)),
                    "selected_faces": topology.get("selected_faces").cloned().unwrap_or(json!(0)),
                }))
            }
        }
    }

    async fn dispatch(&self, calls: &[CorrectedToolCall]) -> Result<(), AppError> {
        self.dispatched
            .lock()
            .expect("mock lock poisoned")
            .extend_from_slice(calls);
        Ok(())
    }
}
