//! Test utilities for the pipeline controller
#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_controller::core::{
    ControllerConfig, Pipeline, Resource, Stage, Step, StepStatus, StepType,
};
use pipeline_controller::echoer::{
    EngineError, ExecutionEngine, FlowRun, FlowRunReport, ReportStream, StepReport,
};
use pipeline_controller::store::{InMemoryResourceStore, ResourceClient};
use pipeline_controller::Controller;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const SERVER: &str = "myserver";

/// Engine fake that records submissions and lets tests push reports
pub struct RecordingEngine {
    submitted: Mutex<Vec<FlowRun>>,
    reports_tx: Mutex<Option<mpsc::Sender<Result<FlowRunReport, EngineError>>>>,
    reports_rx: Mutex<Option<ReportStream>>,
    reject_submissions: AtomicBool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            submitted: Mutex::new(Vec::new()),
            reports_tx: Mutex::new(Some(tx)),
            reports_rx: Mutex::new(Some(rx)),
            reject_submissions: AtomicBool::new(false),
        }
    }

    /// Make every following submission fail with a 503
    pub fn reject_submissions(&self) {
        self.reject_submissions.store(true, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<FlowRun> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Push a report onto the result stream
    pub async fn push_report(&self, report: FlowRunReport) {
        let tx = self.reports_tx.lock().unwrap().clone();
        tx.expect("result stream already closed")
            .send(Ok(report))
            .await
            .expect("result stream receiver dropped");
    }

    /// Report every action of a submitted request as done with `state`
    pub async fn complete(&self, request: &FlowRun, state: &str) {
        let steps = request
            .steps
            .iter()
            .map(|step| StepReport::new(&step.name, true, state))
            .collect();
        self.push_report(FlowRunReport::new(&request.name, steps)).await;
    }

    /// End the result stream
    pub fn close_reports(&self) {
        self.reports_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn submit(&self, request: &FlowRun) -> Result<(), EngineError> {
        self.submitted.lock().unwrap().push(request.clone());
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(EngineError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn watch_reports(&self, _since: i64) -> Result<ReportStream, EngineError> {
        self.reports_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| EngineError::Status {
                status: 409,
                body: "already watching".to_string(),
            })
    }
}

/// A controller wired to an in-memory store and a recording engine
pub struct Harness {
    pub store: Arc<InMemoryResourceStore>,
    pub engine: Arc<RecordingEngine>,
    pub controller: Controller,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let store = Arc::new(InMemoryResourceStore::new());
        let engine = Arc::new(RecordingEngine::new());
        let controller = Controller::new(config, store.clone(), engine.clone());
        Self {
            store,
            engine,
            controller,
        }
    }

    pub fn resources(&self) -> &ResourceClient {
        self.controller.resources()
    }

    pub async fn seed(&self, pipeline_uuid: &str, stages: &[(&str, &[&str])], trigger: bool) {
        seed(self.resources(), pipeline_uuid, stages, trigger).await;
    }

    pub async fn step(&self, uuid: &str) -> Step {
        self.resources().get::<Step>(uuid).await.unwrap().expect("step exists")
    }

    pub async fn stage(&self, uuid: &str) -> Stage {
        self.resources().get::<Stage>(uuid).await.unwrap().expect("stage exists")
    }

    pub async fn pipeline(&self, uuid: &str) -> Pipeline {
        self.resources()
            .get::<Pipeline>(uuid)
            .await
            .unwrap()
            .expect("pipeline exists")
    }

    /// Overwrite a step's status and return the stored snapshot
    pub async fn set_status(&self, uuid: &str, status: StepStatus) -> Step {
        let mut step = self.step(uuid).await;
        step.spec.step_status = status;
        self.resources().apply(&step).await.unwrap()
    }
}

/// Seed a pipeline: `stages` lists `(stage_uuid, step_uuids)`
///
/// Steps are CI, `Initializing`, and untriggered unless `trigger` is set.
pub async fn seed(
    resources: &ResourceClient,
    pipeline_uuid: &str,
    stages: &[(&str, &[&str])],
    trigger: bool,
) {
    let pipeline = Pipeline::new(
        pipeline_uuid,
        stages.iter().map(|(stage, _)| stage.to_string()).collect(),
    );
    resources.apply(&pipeline).await.unwrap();

    for (stage_uuid, steps) in stages {
        let stage = Stage::new(
            *stage_uuid,
            pipeline_uuid,
            steps.iter().map(|s| s.to_string()).collect(),
        );
        resources.apply(&stage).await.unwrap();
    }
    for (stage_uuid, steps) in stages {
        for step_uuid in steps.iter() {
            let step = Step::new(*step_uuid, *stage_uuid, StepType::Ci).with_trigger(trigger);
            resources.apply(&step).await.unwrap();
        }
    }
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        server_name: SERVER.to_string(),
        max_concurrent_tasks: 8,
        ..ControllerConfig::default()
    }
}

/// Poll `check` until it holds, for up to two seconds
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn assert_status(step: &Step, expected: StepStatus) {
    assert_eq!(
        step.status(),
        expected,
        "step {} expected {:?}, was {:?}",
        step.uuid(),
        expected,
        step.status()
    );
}
