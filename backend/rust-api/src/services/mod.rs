use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, LocalStoreKind};
use crate::error::QuizError;
use crate::models::AttemptBackend;
use crate::utils::time::{Clock, SystemClock};
use attempt_store::memory::InMemoryAttemptRepository;
use attempt_store::mongo::MongoAttemptRepository;
use attempt_store::storage::{FileStorage, MemoryStorage, RedisStorage};
use attempt_store::{
    AttemptRepository, AttemptStore, KeyValueStorage, LocalAttemptStore, RemoteAttemptStore,
};
use processing_service::ProcessingClient;
use question_service::{InMemoryQuestionRepository, MongoQuestionRepository, QuestionRepository};
use session_registry::SessionRegistry;

pub mod attempt_store;
pub mod processing_service;
pub mod question_service;
pub mod quiz_session;
pub mod scrambler;
pub mod session_registry;
pub mod stats;
pub mod trophies;

pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
    pub questions: Arc<dyn QuestionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub local_storage: Arc<dyn KeyValueStorage>,
    pub processing: ProcessingClient,
    pub clock: Arc<dyn Clock>,
    pub mongo: Option<Database>,
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Connects to MongoDB, and to Redis when `redis.uri` is set.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mongo_uri = config
            .mongo_uri
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MONGO_URI must be set"))?;
        let mongo_client = MongoClient::with_uri_str(&mongo_uri).await?;
        let mongo: Database = mongo_client.database(&config.mongo_database);
        tracing::info!("MongoDB connected: database={}", config.mongo_database);

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => None,
        };

        let local_storage: Arc<dyn KeyValueStorage> = match config.local_store {
            LocalStoreKind::File => Arc::new(FileStorage::new(
                config.local_store_dir.clone(),
                config.local_store_quota_bytes,
            )),
            LocalStoreKind::Memory => Arc::new(MemoryStorage::default()),
            LocalStoreKind::Redis => {
                let redis = redis
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("REDIS_URI must be set for the redis local store"))?;
                Arc::new(RedisStorage::new(redis))
            }
        };

        let processing = ProcessingClient::new(config.processing_api_url.clone())?;

        Ok(Self {
            sessions: SessionRegistry::default(),
            questions: Arc::new(MongoQuestionRepository::new(mongo.clone())),
            attempts: Arc::new(MongoAttemptRepository::new(mongo.clone())),
            local_storage,
            processing,
            clock: Arc::new(SystemClock),
            mongo: Some(mongo),
            redis,
            config,
        })
    }

    /// State over in-process repositories only.
    pub fn in_memory(
        config: Config,
        questions: Arc<InMemoryQuestionRepository>,
        attempts: Arc<InMemoryAttemptRepository>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let processing = ProcessingClient::new(config.processing_api_url.clone())?;
        Ok(Self {
            sessions: SessionRegistry::default(),
            questions,
            attempts,
            local_storage: Arc::new(MemoryStorage::default()),
            processing,
            clock,
            mongo: None,
            redis: None,
            config,
        })
    }

    /// Opens a fresh attempt store for a new session.
    pub async fn open_store(
        &self,
        backend: AttemptBackend,
        user_id: &str,
        repository_id: &str,
    ) -> Result<Box<dyn AttemptStore>, QuizError> {
        match backend {
            AttemptBackend::Remote => Ok(Box::new(RemoteAttemptStore::new(
                self.attempts.clone(),
                user_id,
                repository_id,
            ))),
            AttemptBackend::Local => Ok(Box::new(
                LocalAttemptStore::open(self.local_storage.clone(), user_id, repository_id)
                    .await?,
            )),
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(uri)?;

    tracing::info!("Attempting to connect to Redis...");
    let redis = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
