use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Duplicate stage order {order}: '{first}' and '{second}'")]
    DuplicateStageOrder {
        order: u32,
        first: String,
        second: String,
    },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Invalid stage range: {0}")]
    InvalidRange(String),

    #[error("Invalid artifact name: {0}")]
    InvalidArtifactName(String),

    #[error("Stage '{stage}' failed with exit code {code}")]
    StageExecutionFailed { stage: String, code: i32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::DuplicateStageOrder { .. } => "DUPLICATE_STAGE_ORDER",
            Error::UnknownStage(_) => "UNKNOWN_STAGE",
            Error::InvalidRange(_) => "INVALID_RANGE",
            Error::InvalidArtifactName(_) => "INVALID_ARTIFACT_NAME",
            Error::StageExecutionFailed { .. } => "STAGE_EXECUTION_FAILED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Toml(_) => "TOML_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }

    /// Exit code the process should report for this error.
    ///
    /// A failed stage propagates the external command's own exit code;
    /// everything else maps to a generic failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::StageExecutionFailed { code, .. } if *code > 0 => *code,
            _ => 1,
        }
    }
}
