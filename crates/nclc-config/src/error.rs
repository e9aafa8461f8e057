use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error in {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration value for '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("env override for '{var}' could not be parsed: {message}")]
    EnvOverride { var: String, message: String },

    #[error("domain error: {0}")]
    Domain(#[from] nclc_domain::DomainError),
}
