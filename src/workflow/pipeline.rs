use std::sync::Arc;

use super::{Orchestrator, ReportService};
use crate::{
    agent::PromptBuilder,
    config::PipelineConfig,
    error::Result,
    knowledge::{Checkpointer, KnowledgeBase, Retriever},
    model::{EmbeddingModel, LangModel},
    report::ReportAssembler,
    storage::BlobStore,
};

/// Owns the long-lived pieces of the system: the knowledge base, its
/// checkpoint task and the report service built on top of them.
pub struct Pipeline {
    config: PipelineConfig,
    knowledge: Arc<KnowledgeBase>,
    blob_store: Arc<dyn BlobStore>,
    checkpointer: Option<Checkpointer>,
    service: ReportService,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("knowledge", &self.knowledge)
            .finish()
    }
}

impl Pipeline {
    /// Loads the knowledge base from its checkpoint and starts periodic
    /// checkpointing. A zero interval disables the periodic task.
    pub async fn init(
        config: PipelineConfig,
        lm: LangModel,
        embedding_model: EmbeddingModel,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        config.validate()?;
        let key = config.knowledge.checkpoint_key.clone();
        let knowledge = Arc::new(
            KnowledgeBase::load(
                config.knowledge.clone(),
                embedding_model,
                blob_store.as_ref(),
                &key,
            )
            .await?,
        );
        let interval = config.knowledge.checkpoint_interval();
        let checkpointer = (!interval.is_zero())
            .then(|| knowledge.spawn_checkpointer(blob_store.clone(), key, interval));

        let orchestrator = Orchestrator::new(
            Retriever::new(knowledge.clone(), config.retrieval.clone()),
            lm,
            Arc::new(PromptBuilder::new()?),
            config.generation.clone(),
            config.orchestrator.clone(),
        );
        let service = ReportService::new(orchestrator, ReportAssembler::new()?);
        log::info!(
            "pipeline ready: {} workers, {} live chunks",
            service.pool().size(),
            knowledge.stats().live_chunks
        );
        Ok(Self {
            config,
            knowledge,
            blob_store,
            checkpointer,
            service,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn service(&self) -> &ReportService {
        &self.service
    }

    pub async fn checkpoint(&self) -> Result<()> {
        self.knowledge
            .checkpoint(self.blob_store.as_ref(), &self.config.knowledge.checkpoint_key)
            .await
    }

    /// Stops accepting runs, stops the checkpoint task and writes a final
    /// checkpoint. Runs already holding a worker finish normally.
    pub async fn shutdown(mut self) -> Result<()> {
        self.service.pool().close();
        if let Some(checkpointer) = self.checkpointer.take() {
            checkpointer.stop().await;
        }
        self.checkpoint().await?;
        log::info!("pipeline shut down");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.checkpointer.is_some() {
            log::warn!("pipeline dropped without shutdown; the last changes may not be checkpointed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::MemoryBlobStore,
        utils::test::{ScriptedLangModel, chest_pain_patient, init_logger},
        value::{ReportType, SourceDocument},
        workflow::{ReportRequest, ResponseStatus},
    };

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.knowledge.checkpoint_interval_secs = 0;
        config.orchestrator.backoff_base_ms = 1;
        config.orchestrator.backoff_max_ms = 2;
        config
    }

    #[tokio::test]
    async fn shutdown_checkpoints_and_init_restores() {
        init_logger();
        let store = MemoryBlobStore::new();
        let blob_store: Arc<dyn BlobStore> = Arc::new(store.clone());
        let lm = ScriptedLangModel::new();

        let pipeline = Pipeline::init(config(), lm.model(), EmbeddingModel::new_hashing(128), blob_store.clone())
            .await
            .unwrap();
        assert_eq!(pipeline.knowledge().stats().live_chunks, 0);
        pipeline
            .knowledge()
            .ingest(SourceDocument::new("guideline/hypertension", "Stage 2 hypertension starts at 160/100 mmHg.").with_tags(["hypertension"]))
            .await
            .unwrap();
        let response = pipeline
            .service()
            .submit(ReportRequest::new(chest_pain_patient(), ReportType::PreliminaryDiagnosis))
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        let service = pipeline.service().clone();
        pipeline.shutdown().await.unwrap();
        assert_eq!(store.keys(), ["knowledge-index"]);

        let response = service
            .submit(ReportRequest::new(chest_pain_patient(), ReportType::PreliminaryDiagnosis))
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Failed);

        let restored = Pipeline::init(config(), lm.model(), EmbeddingModel::new_hashing(128), blob_store)
            .await
            .unwrap();
        assert_eq!(restored.knowledge().stats().live_chunks, 1);
        restored.shutdown().await.unwrap();
    }
}
