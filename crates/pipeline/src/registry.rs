//! Lookup from pipeline kind to adapter.

use std::collections::HashMap;
use std::sync::Arc;

use vimax_core::generation::PipelineKind;

use crate::adapter::{Artifact, PipelineAdapter, PipelineRequest};
use crate::error::PipelineError;

/// Adapters keyed by pipeline kind. Owned by the service; built once at startup.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    adapters: HashMap<PipelineKind, Arc<dyn PipelineAdapter>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: PipelineKind, adapter: Arc<dyn PipelineAdapter>) {
        tracing::info!(pipeline = %kind, adapter = adapter.name(), "Registered pipeline");
        self.adapters.insert(kind, adapter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: PipelineKind, adapter: Arc<dyn PipelineAdapter>) -> Self {
        self.register(kind, adapter);
        self
    }

    /// Adapter for `kind`, falling back to the kind's backing pipeline.
    pub fn resolve(&self, kind: PipelineKind) -> Option<Arc<dyn PipelineAdapter>> {
        self.adapters
            .get(&kind)
            .or_else(|| self.adapters.get(&kind.backing()))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub async fn invoke(&self, request: &PipelineRequest) -> Result<Artifact, PipelineError> {
        let adapter = self
            .resolve(request.kind)
            .ok_or(PipelineError::NotRegistered(request.kind))?;
        adapter.invoke(request).await
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use vimax_core::generation::{GenerationRequest, Uploads};

    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl PipelineAdapter for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn invoke(&self, _request: &PipelineRequest) -> Result<Artifact, PipelineError> {
            Ok(Artifact::new(self.0))
        }
    }

    fn request(kind: PipelineKind) -> PipelineRequest {
        PipelineRequest {
            job_id: "job_1".into(),
            kind,
            request: GenerationRequest::default(),
            uploads: Uploads::default(),
            output_dir: "/tmp".into(),
        }
    }

    #[tokio::test]
    async fn cameo_falls_back_to_idea2video() {
        let registry = PipelineRegistry::new().with(PipelineKind::Idea2Video, Arc::new(Fixed("idea")));

        let artifact = registry.invoke(&request(PipelineKind::Cameo)).await.unwrap();
        assert_eq!(artifact, Artifact::new("idea"));
    }

    #[tokio::test]
    async fn dedicated_adapter_wins_over_backing() {
        let registry = PipelineRegistry::new()
            .with(PipelineKind::Idea2Video, Arc::new(Fixed("idea")))
            .with(PipelineKind::Cameo, Arc::new(Fixed("cameo")));

        let artifact = registry.invoke(&request(PipelineKind::Cameo)).await.unwrap();
        assert_eq!(artifact, Artifact::new("cameo"));
    }

    #[tokio::test]
    async fn missing_pipeline_is_an_error() {
        let registry = PipelineRegistry::new();
        assert_matches!(
            registry.invoke(&request(PipelineKind::Script2Video)).await,
            Err(PipelineError::NotRegistered(PipelineKind::Script2Video))
        );
    }
}
