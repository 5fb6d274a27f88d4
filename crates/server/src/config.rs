use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

use hearth_categorize::classifier::AiSettings;
use hearth_categorize::{DetectorConfig, PipelineConfig};

/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub listen_addr: SocketAddr,
    /// Hex SHA-256 digest of the API bearer token.
    pub api_token_sha256: String,
    /// AI classifier endpoint; `None` disables the AI stage.
    pub ai: Option<AiSettings>,
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = env::var("HEARTH_DB_PATH")
            .unwrap_or_else(|_| "hearth.db".to_string())
            .into();

        let listen_addr = env::var("HEARTH_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8787".to_string())
            .parse()
            .context("invalid HEARTH_LISTEN_ADDR")?;

        let api_token_sha256 = env::var("HEARTH_API_TOKEN_SHA256")
            .context("HEARTH_API_TOKEN_SHA256 must be set to the hex SHA-256 of the API token")?
            .to_lowercase();

        let ai = match (env::var("HEARTH_AI_URL"), env::var("HEARTH_AI_API_KEY")) {
            (Ok(base_url), Ok(api_key)) => Some(AiSettings {
                base_url,
                api_key,
                model: env::var("HEARTH_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            }),
            _ => None,
        };

        let mut pipeline = PipelineConfig::default();
        if let Ok(value) = env::var("HEARTH_AI_CONFIDENCE") {
            pipeline.ai_confidence_threshold =
                value.parse().context("invalid HEARTH_AI_CONFIDENCE")?;
        }
        if let Ok(value) = env::var("HEARTH_TRANSFER_WINDOW_DAYS") {
            pipeline.transfer_window_days =
                value.parse().context("invalid HEARTH_TRANSFER_WINDOW_DAYS")?;
        }
        if let Ok(value) = env::var("HEARTH_TRANSFER_TOLERANCE_CENTS") {
            pipeline.transfer_tolerance_cents =
                value.parse().context("invalid HEARTH_TRANSFER_TOLERANCE_CENTS")?;
        }

        Ok(Self {
            db_path,
            listen_addr,
            api_token_sha256,
            ai,
            pipeline,
            detector: DetectorConfig::default(),
        })
    }
}
