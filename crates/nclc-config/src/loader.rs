use std::path::Path;

use tracing::debug;

use crate::error::ConfigError;
use crate::options::Options;
use crate::raw::RawOptions;

/// `NCLC_`-prefixed env vars that override the matching YAML field (§6).
/// Matches the teacher's convention of one small, explicit conversion table
/// rather than a generic env-deserializer crate.
const ENV_PREFIX: &str = "NCLC_";

/// Load the controller-wide options document from `path`, then apply any
/// `NCLC_*` environment overrides on top.
pub fn load_options(path: &Path) -> Result<Options, ConfigError> {
    let raw = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_yaml::from_str::<RawOptions>(&content).map_err(|e| ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        })?
    } else {
        debug!(path = %path.display(), "options file not found, using defaults + env");
        RawOptions::default()
    };

    let raw = apply_env_overrides(raw)?;
    Options::from_raw(raw)
}

/// Load options from environment variables only — used by the server binary
/// when no options file is configured.
pub fn load_options_from_env() -> Result<Options, ConfigError> {
    Options::from_raw(apply_env_overrides(RawOptions::default())?)
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn apply_env_overrides(mut raw: RawOptions) -> Result<RawOptions, ConfigError> {
    if let Some(v) = env_var("PROVISION_MODE") {
        raw.provision_mode = Some(v);
    }
    if let Some(v) = env_var("MANAGE_EXISTING_AKS_MACHINES") {
        raw.manage_existing_aks_machines = Some(parse_bool("MANAGE_EXISTING_AKS_MACHINES", &v)?);
    }
    if let Some(v) = env_var("BATCH_CREATION_ENABLED") {
        raw.batch_creation_enabled = Some(parse_bool("BATCH_CREATION_ENABLED", &v)?);
    }
    if let Some(v) = env_var("BATCH_IDLE_TIMEOUT_MS") {
        raw.batch_idle_timeout_ms = Some(parse_u64("BATCH_IDLE_TIMEOUT_MS", &v)?);
    }
    if let Some(v) = env_var("BATCH_MAX_TIMEOUT_MS") {
        raw.batch_max_timeout_ms = Some(parse_u64("BATCH_MAX_TIMEOUT_MS", &v)?);
    }
    if let Some(v) = env_var("MAX_BATCH_SIZE") {
        raw.max_batch_size = Some(parse_u64("MAX_BATCH_SIZE", &v)? as usize);
    }
    if let Some(v) = env_var("USE_SIG") {
        raw.use_sig = Some(parse_bool("USE_SIG", &v)?);
    }
    if let Some(v) = env_var("SUBNET_ID") {
        raw.subnet_id = Some(v);
    }
    if let Some(v) = env_var("NODE_RESOURCE_GROUP") {
        raw.node_resource_group = Some(v);
    }
    if let Some(v) = env_var("CLUSTER_NAME") {
        raw.cluster_name = Some(v);
    }
    if let Some(v) = env_var("CLUSTER_ID") {
        raw.cluster_id = Some(v);
    }
    if let Some(v) = env_var("AKS_MACHINES_POOL_NAME") {
        raw.aks_machines_pool_name = Some(v);
    }
    if let Some(v) = env_var("KUBELET_IDENTITY_CLIENT_ID") {
        raw.kubelet_identity_client_id = Some(v);
    }
    Ok(raw)
}

fn parse_bool(var: &str, v: &str) -> Result<bool, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::EnvOverride {
            var: format!("{ENV_PREFIX}{var}"),
            message: format!("'{v}' is not a boolean"),
        }),
    }
}

fn parse_u64(var: &str, v: &str) -> Result<u64, ConfigError> {
    v.parse::<u64>().map_err(|e| ConfigError::EnvOverride {
        var: format!("{ENV_PREFIX}{var}"),
        message: e.to_string(),
    })
}
