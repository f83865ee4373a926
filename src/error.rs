use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "Unrecognized model identifier in {identifier}. Should contain one of {}",
        markers.join(", ")
    )]
    UnrecognizedIdentifier {
        identifier: String,
        markers: Vec<String>,
    },

    #[error(
        "Unrecognized configuration class {family} for this kind of {backend} auto model ({task}).\nModel type should be one of {}.",
        expected.join(", ")
    )]
    UnrecognizedConfiguration {
        family: String,
        task: String,
        backend: String,
        expected: Vec<String>,
    },

    #[error("A configuration must be supplied explicitly when loading weights from {0}")]
    ConfigurationRequired(String),

    #[error("Loading {path} requires the cross-backend flag: it holds {backend} weights")]
    AlternateWeights { path: PathBuf, backend: String },

    #[error("Unknown configuration overrides: {}", .0.join(", "))]
    UnknownOverrides(Vec<String>),

    #[error("Invalid model identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Artifact {file} not found for {identifier}")]
    ArtifactNotFound { identifier: String, file: String },

    #[error("Offline mode is enabled and {0} is not cached")]
    Offline(String),

    #[error(
        "Error(s) in loading state dict: missing keys [{}], unexpected keys [{}]{}",
        missing.join(", "),
        unexpected.join(", "),
        errors.iter().map(|e| format!("\n\t{}", e)).collect::<String>()
    )]
    StrictLoad {
        missing: Vec<String>,
        unexpected: Vec<String>,
        errors: Vec<String>,
    },

    #[error("Label mismatch: {0}")]
    LabelMismatch(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Unsupported tensor dtype {0}")]
    UnsupportedDtype(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
