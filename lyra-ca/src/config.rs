//! Configuration resolution for lyra-ca
//!
//! The annotation API key resolves with Database → ENV → TOML priority.

use lyra_common::config::TomlConfig;
use lyra_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable carrying the annotation API key
pub const ANNOTATION_API_KEY_ENV: &str = "LYRA_ANNOTATION_API_KEY";

/// Resolve the annotation service API key
///
/// **Priority:** Database → ENV → TOML. Blank values are ignored. Returns
/// `None` when no source has a key; the service is then called without
/// credentials.
pub async fn resolve_annotation_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_annotation_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(ANNOTATION_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .annotation
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        ("database", db_key.is_some()),
        ("environment", env_key.is_some()),
        ("TOML", toml_key.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Annotation API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Annotation API key loaded from database");
        return Ok(Some(key));
    }

    if let Some(key) = env_key {
        info!("Annotation API key loaded from environment variable");
        return Ok(Some(key));
    }

    if let Some(key) = toml_key {
        info!("Annotation API key loaded from TOML config");
        return Ok(Some(key));
    }

    warn!(
        "Annotation API key not configured; set {} or [annotation] api_key",
        ANNOTATION_API_KEY_ENV
    );
    Ok(None)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
