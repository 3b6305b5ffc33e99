use audiocast_backend::{
    controllers::{health::HealthState, tts::TtsController},
    domain::{
        tts::{
            default_pools, ChunkerConfig, NarrationService, NarrationSettings, SynthesisPolicy,
            Synthesizer, VoiceSelector,
        },
        usage::{Pricing, UsageTracker},
    },
    infrastructure::{
        http::create_router,
        repositories::{
            ArtifactStore, AudioConfig, FilesystemArtifactStore, IndexRepository,
            JsonIndexRepository, JsonUsageRepository, TtsRepository, UsageRepository,
        },
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;

pub mod api_client;
pub mod assertions;

use api_client::TestClient;
use fake_tts::ScriptedTts;

pub const PUBLIC_BASE_URL: &str = "http://cdn.test";

pub struct TestContext {
    pub client: TestClient,
    pub tts: Arc<ScriptedTts>,
    pub artifacts_dir: PathBuf,
    // Dropped last: removes every file the server wrote
    _data_dir: TempDir,
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async {
            let data_dir = tempfile::tempdir().expect("Failed to create data dir");
            let artifacts_dir = data_dir.path().join("artifacts");
            let tts = Arc::new(ScriptedTts::new());

            let index_repo: Arc<dyn IndexRepository> =
                Arc::new(JsonIndexRepository::new(data_dir.path().join("index.json")));
            let usage_repo: Arc<dyn UsageRepository> =
                Arc::new(JsonUsageRepository::new(data_dir.path().join("usage.json")));
            let artifacts: Arc<dyn ArtifactStore> = Arc::new(FilesystemArtifactStore::new(
                artifacts_dir.clone(),
                Some(PUBLIC_BASE_URL.to_string()),
            ));

            let pricing = Pricing::default();
            let usage_tracker = Arc::new(UsageTracker::new(usage_repo.clone(), pricing));

            // Small chunks keep request bodies short while still exercising splitting
            let settings = NarrationSettings {
                chunker: ChunkerConfig {
                    target_chars: 100,
                    safety_factor: 0.8,
                    ..ChunkerConfig::default()
                },
                pipeline_timeout: Duration::from_secs(10),
            };
            let policy = SynthesisPolicy {
                max_service_retries: 1,
                retry_base_delay: Duration::from_millis(1),
                retry_max_delay: Duration::from_millis(5),
                ..SynthesisPolicy::default()
            };

            let synthesizer = Synthesizer::new(tts.clone(), AudioConfig::default(), policy);
            let voices = VoiceSelector::new(default_pools("en-US"), Some(7));
            let narration_service = Arc::new(NarrationService::new(
                synthesizer,
                voices,
                artifacts,
                index_repo.clone(),
                usage_tracker,
                settings,
            ));

            let health_state = Arc::new(HealthState::new(index_repo, usage_repo, tts.provider()));
            let tts_controller = Arc::new(TtsController::new(narration_service, pricing));
            let app = create_router(health_state, tts_controller);

            // Start server
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind listener");
            let addr = listener.local_addr().expect("Failed to get local addr");
            let base_url = format!("http://{}", addr);

            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            // Wait for server to be ready
            tokio::time::sleep(Duration::from_millis(100)).await;

            Self {
                client: TestClient::new(&base_url),
                tts,
                artifacts_dir,
                _data_dir: data_dir,
            }
        }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async {
            // Temp directory is removed on drop
        }
    }
}

/// Article long enough to span several chunks
pub fn sample_article(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence number {} talks about narrated articles.", i))
        .collect::<Vec<_>>()
        .join(" ")
}
