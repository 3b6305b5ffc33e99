use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use super::error::NarrationError;

pub const PREMIUM_FEMALE_POOL: &str = "premium-female";
pub const PREMIUM_MALE_POOL: &str = "premium-male";
pub const STANDARD_POOL: &str = "standard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceGender {
    Female,
    Male,
    Neutral,
}

impl std::fmt::Display for VoiceGender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceGender::Female => write!(f, "FEMALE"),
            VoiceGender::Male => write!(f, "MALE"),
            VoiceGender::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Voice used for every chunk of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub language_code: String,
    pub name: String,
    pub gender: VoiceGender,
    pub pool: String,
}

impl VoiceProfile {
    pub fn new(language_code: &str, name: &str, gender: VoiceGender, pool: &str) -> Self {
        Self {
            language_code: language_code.to_string(),
            name: name.to_string(),
            gender,
            pool: pool.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), NarrationError> {
        if self.name.trim().is_empty() || self.language_code.trim().is_empty() {
            return Err(NarrationError::Fatal(format!(
                "malformed voice profile in pool '{}': name and language code are required",
                self.pool
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePool {
    pub name: String,
    pub voices: Vec<VoiceProfile>,
}

impl VoicePool {
    pub fn new(name: &str, voices: Vec<VoiceProfile>) -> Self {
        Self {
            name: name.to_string(),
            voices,
        }
    }
}

/// Google Neural2 / Standard voices for a language, e.g. `en-US`
pub fn default_pools(language_code: &str) -> Vec<VoicePool> {
    let voice = |suffix: &str, gender: VoiceGender, pool: &str| {
        VoiceProfile::new(
            language_code,
            &format!("{}-{}", language_code, suffix),
            gender,
            pool,
        )
    };

    vec![
        VoicePool::new(
            PREMIUM_FEMALE_POOL,
            vec![
                voice("Neural2-C", VoiceGender::Female, PREMIUM_FEMALE_POOL),
                voice("Neural2-F", VoiceGender::Female, PREMIUM_FEMALE_POOL),
                voice("Neural2-H", VoiceGender::Female, PREMIUM_FEMALE_POOL),
            ],
        ),
        VoicePool::new(
            PREMIUM_MALE_POOL,
            vec![
                voice("Neural2-A", VoiceGender::Male, PREMIUM_MALE_POOL),
                voice("Neural2-D", VoiceGender::Male, PREMIUM_MALE_POOL),
                voice("Neural2-J", VoiceGender::Male, PREMIUM_MALE_POOL),
            ],
        ),
        VoicePool::new(
            STANDARD_POOL,
            vec![
                voice("Standard-C", VoiceGender::Female, STANDARD_POOL),
                voice("Standard-D", VoiceGender::Male, STANDARD_POOL),
            ],
        ),
    ]
}

/// AWS Polly voices. Names carry the locale prefix so every provider sees
/// the same profile shape; the Polly client strips it.
pub fn polly_pools(language_code: &str) -> Vec<VoicePool> {
    let voice = |id: &str, gender: VoiceGender, pool: &str| {
        VoiceProfile::new(
            language_code,
            &format!("{}-{}", language_code, id),
            gender,
            pool,
        )
    };

    vec![
        VoicePool::new(
            PREMIUM_FEMALE_POOL,
            vec![
                voice("Joanna", VoiceGender::Female, PREMIUM_FEMALE_POOL),
                voice("Kendra", VoiceGender::Female, PREMIUM_FEMALE_POOL),
                voice("Salli", VoiceGender::Female, PREMIUM_FEMALE_POOL),
            ],
        ),
        VoicePool::new(
            PREMIUM_MALE_POOL,
            vec![
                voice("Matthew", VoiceGender::Male, PREMIUM_MALE_POOL),
                voice("Joey", VoiceGender::Male, PREMIUM_MALE_POOL),
                voice("Stephen", VoiceGender::Male, PREMIUM_MALE_POOL),
            ],
        ),
        VoicePool::new(
            STANDARD_POOL,
            vec![
                voice("Ivy", VoiceGender::Female, STANDARD_POOL),
                voice("Justin", VoiceGender::Male, STANDARD_POOL),
            ],
        ),
    ]
}

/// Picks a pool at random, then a voice uniformly from it.
///
/// With `degrade_on_quota` enabled, items processed after the monthly free
/// quota is exhausted draw from the economy pool instead.
pub struct VoiceSelector {
    pools: Vec<VoicePool>,
    economy_pool: String,
    degrade_on_quota: bool,
    rng: Mutex<StdRng>,
}

impl VoiceSelector {
    pub fn new(pools: Vec<VoicePool>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            pools,
            economy_pool: STANDARD_POOL.to_string(),
            degrade_on_quota: false,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_quota_degrade(mut self, economy_pool: &str, enabled: bool) -> Self {
        self.economy_pool = economy_pool.to_string();
        self.degrade_on_quota = enabled;
        self
    }

    pub fn degrades_on_quota(&self) -> bool {
        self.degrade_on_quota
    }

    pub fn select(&self, quota_exhausted: bool) -> Result<VoiceProfile, NarrationError> {
        if self.degrade_on_quota && quota_exhausted {
            tracing::info!(pool = %self.economy_pool, "Monthly quota exhausted, using economy voices");
            return self.select_from_pool(&self.economy_pool);
        }

        let candidates: Vec<&VoicePool> = self
            .pools
            .iter()
            .filter(|pool| pool.name != self.economy_pool && !pool.voices.is_empty())
            .collect();

        let voice = {
            let mut rng = self.rng.lock();
            candidates
                .choose(&mut *rng)
                .and_then(|pool| pool.voices.choose(&mut *rng))
                .cloned()
        };

        let voice = voice.ok_or_else(|| {
            NarrationError::Fatal("no voice pools configured".to_string())
        })?;
        voice.validate()?;

        tracing::debug!(voice = %voice.name, pool = %voice.pool, "Voice selected");
        Ok(voice)
    }

    pub fn select_from_pool(&self, pool_name: &str) -> Result<VoiceProfile, NarrationError> {
        let pool = self
            .pools
            .iter()
            .find(|pool| pool.name == pool_name)
            .ok_or_else(|| NarrationError::Fatal(format!("unknown voice pool '{}'", pool_name)))?;

        let voice = {
            let mut rng = self.rng.lock();
            pool.voices.choose(&mut *rng).cloned()
        };

        let voice = voice.ok_or_else(|| {
            NarrationError::Fatal(format!("voice pool '{}' is empty", pool_name))
        })?;
        voice.validate()?;
        Ok(voice)
    }
}
