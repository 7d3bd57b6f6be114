//! Analysis error taxonomy

use std::time::Duration;

use sa_cad::CadError;
use thiserror::Error;

/// Everything that can stop a STEP analysis
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Empty or missing file, bad extension, bad URL
    #[error("{0}")]
    Input(String),

    /// Non-200 response, timeout or transport failure while downloading
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Download exceeds the limit of {limit} bytes")]
    DownloadTooLarge { limit: u64 },

    #[error("Upload exceeds the limit of {limit} bytes")]
    UploadTooLarge { limit: u64 },

    /// The kernel could not read the file or found nothing to transfer
    #[error("STEP file could not be read: {0}")]
    Parse(String),

    #[error("Geometry kernel unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Analysis did not finish within {0:?}")]
    Timeout(Duration),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis(message.into())
    }
}

impl From<CadError> for AnalysisError {
    fn from(err: CadError) -> Self {
        match err {
            CadError::KernelNotAvailable(msg) => AnalysisError::BackendUnavailable(msg),
            CadError::StepImport(msg) => AnalysisError::Parse(msg),
            other => AnalysisError::Analysis(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_errors_map_to_taxonomy() {
        assert!(matches!(
            AnalysisError::from(CadError::KernelNotAvailable("none".into())),
            AnalysisError::BackendUnavailable(_)
        ));
        assert!(matches!(
            AnalysisError::from(CadError::StepImport("bad".into())),
            AnalysisError::Parse(_)
        ));
        assert!(matches!(
            AnalysisError::from(CadError::FileIo("disk".into())),
            AnalysisError::Analysis(_)
        ));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            AnalysisError::DownloadTooLarge { limit: 10 }.to_string(),
            "Download exceeds the limit of 10 bytes"
        );
        assert_eq!(AnalysisError::input("File is empty").to_string(), "File is empty");
    }
}
