//! Step watch: catch-up pass followed by the change stream

use crate::controller::{Controller, ControllerError};
use crate::core::{Resource, Step};
use crate::persistence::STEP_WATCH;
use crate::store::{ResourceClient, WatchEvent};
use tracing::{debug, info, warn};

impl Controller {
    /// List every step, hand each to the state machine, then follow changes
    ///
    /// The watch resumes strictly after the highest listed version, so
    /// together with the list no change is missed. Steps left mid-flight by a
    /// previous run are picked up by the catch-up pass. Only returns when the
    /// initial list or subscription fails, or the stream ends.
    pub async fn watch_steps(&self) -> Result<(), ControllerError> {
        let steps = self.resources.list::<Step>().await?;
        let mut version = steps.iter().map(Step::version).max().unwrap_or(0);
        info!("[watch] catch-up over {} steps, up to version {}", steps.len(), version);
        for step in steps {
            self.dispatch_step(step);
        }

        self.check_checkpoint(version).await;
        self.record_checkpoint(version).await;

        let mut events = self.resources.watch::<Step>(version).await?;
        info!("[watch] watching steps after version {}", version);

        while let Some(event) = events.recv().await {
            if let Some(seen) = self.handle_watch_event(event) {
                if seen > version {
                    version = seen;
                    self.record_checkpoint(version).await;
                }
            }
        }

        Err(ControllerError::StreamClosed("step watch"))
    }

    /// Hand one change event to the state machine
    ///
    /// Returns the version of the dispatched step, or `None` for heartbeats
    /// and undecodable events.
    pub fn handle_watch_event(&self, event: WatchEvent) -> Option<u64> {
        if event.is_heartbeat() {
            return None;
        }
        match ResourceClient::decode::<Step>(event.object) {
            Ok(step) => {
                let version = step.version();
                self.dispatch_step(step);
                Some(version)
            }
            Err(e) => {
                warn!("[watch] receive step {} decode error: {}", event.uuid, e);
                None
            }
        }
    }

    fn dispatch_step(&self, step: Step) {
        let this = self.clone();
        self.spawn(async move {
            let uuid = step.uuid().to_string();
            let action = this.handle_step(step).await;
            debug!("[watch] step {}: {:?}", uuid, action);
        });
    }

    /// Compare the stored checkpoint with the listed snapshot
    ///
    /// A checkpoint ahead of the store means the store was rebuilt or rolled
    /// back; resuming after it would skip changes, so the snapshot wins.
    async fn check_checkpoint(&self, listed: u64) {
        match self.checkpoints.load(STEP_WATCH).await {
            Ok(Some(stored)) if stored > listed => warn!(
                "[watch] checkpoint {} is ahead of the store (version {}); store was rewound",
                stored, listed
            ),
            Ok(Some(stored)) => debug!("[watch] previous run stopped at version {}", stored),
            Ok(None) => {}
            Err(e) => warn!("[watch] load checkpoint error: {:#}", e),
        }
    }

    async fn record_checkpoint(&self, version: u64) {
        if let Err(e) = self.checkpoints.save(STEP_WATCH, version).await {
            warn!("[watch] save checkpoint {} error: {:#}", version, e);
        }
    }
}
