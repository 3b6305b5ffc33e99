use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use audiocast_backend::controllers::{health::HealthState, tts::TtsController};
use audiocast_backend::domain::tts::voice::STANDARD_POOL;
use audiocast_backend::domain::tts::{
    default_pools, polly_pools, NarrationService, NarrationServiceApi, Synthesizer, VoicePool,
    VoiceSelector,
};
use audiocast_backend::domain::usage::UsageTracker;
use audiocast_backend::infrastructure::config::{Config, LogFormat, TtsProvider};
use audiocast_backend::infrastructure::db::{check_connection, create_pool, run_migrations};
use audiocast_backend::infrastructure::http::start_http_server;
use audiocast_backend::infrastructure::repositories::{
    ArtifactStore, FilesystemArtifactStore, GoogleTtsRepository, IndexRepository,
    JsonIndexRepository, JsonUsageRepository, PgIndexRepository, PgUsageRepository,
    PollyTtsRepository, TtsRepository, UsageRepository,
};

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting Audiocast Backend on {}:{}",
        config.host,
        config.port
    );

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Durable index and usage ledger
    let index_repo: Arc<dyn IndexRepository>;
    let usage_repo: Arc<dyn UsageRepository>;
    match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            tracing::info!("Database connection pool created");

            check_connection(&pool).await?;
            run_migrations(&pool).await?;
            tracing::info!("Database connection verified and migrations applied");

            let pool = Arc::new(pool);
            index_repo = Arc::new(PgIndexRepository::new(pool.clone()));
            usage_repo = Arc::new(PgUsageRepository::new(pool));
        }
        None => {
            tokio::fs::create_dir_all(&config.data_dir).await?;
            if !config.is_development() {
                tracing::warn!("Running in production without DATABASE_URL, JSON documents only support a single process");
            }
            tracing::info!(
                data_dir = %config.data_dir.display(),
                "No DATABASE_URL set, using JSON documents (single process only)"
            );
            index_repo = Arc::new(JsonIndexRepository::new(config.index_path()));
            usage_repo = Arc::new(JsonUsageRepository::new(config.usage_path()));
        }
    }

    // 2. Artifact store
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FilesystemArtifactStore::new(
        config.artifacts_dir(),
        config.public_base_url.clone(),
    ));
    tracing::info!(
        backend = artifacts.backend(),
        path = %config.artifacts_dir().display(),
        "Artifact store initialized"
    );

    // 3. Speech provider and its voices
    let (tts_repo, pools) = create_tts_repository(&config).await?;
    tracing::info!(
        provider = tts_repo.provider(),
        max_input_bytes = tts_repo.max_input_bytes(),
        "Speech provider initialized"
    );

    // 4. Services
    tracing::info!("Instantiating services...");
    let usage_tracker = Arc::new(UsageTracker::new(usage_repo.clone(), config.pricing()));
    let synthesizer = Synthesizer::new(
        tts_repo.clone(),
        config.audio_config(),
        config.synthesis_policy(),
    );
    let voices = VoiceSelector::new(pools, config.voice_seed)
        .with_quota_degrade(STANDARD_POOL, config.voice_degrade_on_quota);
    let narration_service = Arc::new(NarrationService::new(
        synthesizer,
        voices,
        artifacts,
        index_repo.clone(),
        usage_tracker,
        config.narration_settings(),
    ));

    if let Some(max_age) = config.retention() {
        tracing::info!(retention_days = max_age.num_days(), "Retention sweep enabled");
        spawn_retention_task(narration_service.clone(), max_age);
    }

    // 5. Controllers
    let health_state = Arc::new(HealthState::new(index_repo, usage_repo, tts_repo.provider()));
    let tts_controller = Arc::new(TtsController::new(narration_service, config.pricing()));

    start_http_server(Arc::new(config), health_state, tts_controller).await?;

    Ok(())
}

async fn create_tts_repository(
    config: &Config,
) -> Result<(Arc<dyn TtsRepository>, Vec<VoicePool>), Box<dyn std::error::Error>> {
    match config.tts_provider {
        TtsProvider::Google => {
            let api_key = config
                .google_tts_api_key
                .clone()
                .ok_or("GOOGLE_TTS_API_KEY is required for the google provider")?;
            let repo: Arc<dyn TtsRepository> =
                Arc::new(GoogleTtsRepository::new(api_key, config.tts_request_timeout())?);
            Ok((repo, default_pools(&config.voice_language)))
        }
        TtsProvider::Polly => {
            tracing::info!("Initializing AWS Polly client with region: {}", config.aws_region);

            let has_access_key = std::env::var("AWS_ACCESS_KEY_ID").is_ok();
            let has_secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").is_ok();
            if !has_access_key || !has_secret_key {
                tracing::warn!("AWS credentials not found in environment variables. Will attempt to use other credential providers (instance metadata, etc.)");
            }

            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(config.aws_region.clone()))
                .load()
                .await;
            tracing::info!(region = ?aws_config.region(), "AWS configuration loaded");

            let polly_client = Arc::new(aws_sdk_polly::Client::new(&aws_config));
            let repo: Arc<dyn TtsRepository> = Arc::new(PollyTtsRepository::new(polly_client));
            Ok((repo, polly_pools(&config.voice_language)))
        }
    }
}

fn spawn_retention_task(service: Arc<NarrationService>, max_age: chrono::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match service.purge_expired(max_age).await {
                Ok(purged) => tracing::debug!(purged = purged, "Retention sweep finished"),
                Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
            }
        }
    });
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "audiocast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "audiocast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
