//! Entry point for request layers: start, status, stop and shutdown per job class.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::PanelConfig;
use crate::error::ValidationError;
use crate::job::{JobClass, JobKind, StartAck, StopAck};
use crate::resolver::{CatalogResolver, JobPlan, JobRequest, Resolver};
use crate::status::JobStatus;

pub struct Engine {
    resolver: Arc<dyn Resolver>,
    classes: BTreeMap<JobKind, Arc<JobClass>>,
}

impl Engine {
    /// Engine resolving requests against `catalog`.
    pub fn with_catalog(config: PanelConfig, catalog: Arc<dyn Catalog>) -> Self {
        let config = Arc::new(config);
        let classes = JobKind::ALL
            .iter()
            .map(|&kind| (kind, Arc::new(JobClass::new(kind, &config))))
            .collect();
        Self {
            resolver: Arc::new(CatalogResolver::new(config, catalog)),
            classes,
        }
    }

    fn class(&self, kind: JobKind) -> &Arc<JobClass> {
        &self.classes[&kind]
    }

    /// Validate `request` and launch it on `kind`. Validation failures and a
    /// busy class are reported in the ack; no worker is created for them.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, kind: JobKind, request: JobRequest) -> StartAck {
        let plan = match self.plan(kind, &request) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::info!(class = %kind, "start rejected: {}", e);
                return StartAck::rejected(e.to_string());
            }
        };
        self.class(kind).start(plan)
    }

    fn plan(&self, kind: JobKind, request: &JobRequest) -> Result<JobPlan, ValidationError> {
        let expected = match request {
            JobRequest::Single { .. } => JobKind::Single,
            JobRequest::Batch { .. } => JobKind::Batch,
            JobRequest::InstallTool { .. } => JobKind::Tool,
        };
        if expected != kind {
            return Err(ValidationError::WrongClass(kind.as_str()));
        }
        self.resolver.resolve(request)
    }

    pub fn status(&self, kind: JobKind) -> JobStatus {
        self.class(kind).status()
    }

    pub async fn stop(&self, kind: JobKind) -> StopAck {
        self.class(kind).stop().await
    }

    /// Stop every active job class concurrently.
    pub async fn shutdown(&self) {
        let mut stops = tokio::task::JoinSet::new();
        for class in self.classes.values().filter(|c| c.is_active()) {
            let class = Arc::clone(class);
            stops.spawn(async move { (class.kind(), class.stop().await) });
        }
        while let Some(res) = stops.join_next().await {
            match res {
                Ok((kind, ack)) => tracing::info!(class = %kind, ?ack, "stopped on shutdown"),
                Err(e) => tracing::warn!("stop task failed during shutdown: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::status::JobState;

    fn engine() -> Engine {
        Engine::with_catalog(PanelConfig::default(), Arc::new(StaticCatalog::default()))
    }

    #[tokio::test]
    async fn request_for_wrong_class_is_rejected() {
        let ack = engine().start(
            JobKind::Batch,
            JobRequest::InstallTool {
                tool: "kohya".into(),
            },
        );
        assert!(!ack.accepted);
        assert!(ack.reason.unwrap().contains("batch"));
    }

    #[tokio::test]
    async fn validation_failure_leaves_class_idle() {
        let engine = engine();
        let ack = engine.start(
            JobKind::Batch,
            JobRequest::Batch {
                item_ids: vec![],
                auth_token: None,
                destination_override: None,
            },
        );
        assert_eq!(ack.reason.as_deref(), Some("no items selected"));
        assert_eq!(engine.status(JobKind::Batch).state, JobState::Idle);
    }

    #[tokio::test]
    async fn shutdown_with_nothing_running() {
        let engine = engine();
        engine.shutdown().await;
        for kind in JobKind::ALL {
            assert_eq!(engine.status(kind).state, JobState::Idle);
        }
    }
}
