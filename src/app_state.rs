use std::sync::Arc;

use crate::{
    config::Config,
    database::Database,
    embedding::{EmbeddingProvider, HuggingFaceEmbedder},
    scorer::{HttpRecommendationScorer, RecommendationScorer},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub scorer: Arc<dyn RecommendationScorer>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(&config.database).await?;
        db.init().await?;

        let embedder = HuggingFaceEmbedder::new(&config.embedding)?;
        let scorer = HttpRecommendationScorer::new(&config.scorer)?;

        Ok(Self {
            db: Arc::new(db),
            embedder: Arc::new(embedder),
            scorer: Arc::new(scorer),
            config,
        })
    }
}
