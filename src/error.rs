use thiserror::Error;

pub type Result<T> = std::result::Result<T, PreprocessError>;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: Box<PreprocessError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreprocessError {
    /// Wrap an error with the name of the pipeline stage that raised it
    pub fn in_stage(stage: &str, source: PreprocessError) -> Self {
        PreprocessError::StageFailure {
            stage: stage.to_string(),
            source: Box::new(source),
        }
    }

    /// Stable machine-readable code, used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            PreprocessError::Decode(_) => "DECODE_ERROR",
            PreprocessError::Encode(_) => "ENCODE_ERROR",
            PreprocessError::Config(_) => "CONFIG_ERROR",
            PreprocessError::StageFailure { .. } => "STAGE_FAILURE",
            PreprocessError::Io(_) => "IO_ERROR",
        }
    }

    /// The innermost error, skipping stage wrappers
    pub fn root(&self) -> &PreprocessError {
        match self {
            PreprocessError::StageFailure { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_keeps_root_cause() {
        let err = PreprocessError::in_stage(
            "05_resized",
            PreprocessError::Config("target width must be positive".to_string()),
        );

        assert!(matches!(err.root(), PreprocessError::Config(_)));
        assert_eq!(err.root().code(), "CONFIG_ERROR");
        assert_eq!(err.code(), "STAGE_FAILURE");
        assert!(err.to_string().contains("05_resized"));
        assert!(err.to_string().contains("target width must be positive"));
    }
}
