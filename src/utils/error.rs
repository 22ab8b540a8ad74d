use thiserror::Error;

#[derive(Error, Debug)]
pub enum FactorError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Division by zero: {message}")]
    DivisionByZero { message: String },

    #[error("Degenerate spread: {message}")]
    DegenerateSpread { message: String },

    #[error("No factor for country '{country}'")]
    MissingFactor { country: String },

    #[error("Source error: {message}")]
    SourceError { message: String },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

/// 錯誤分類，用於日誌
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Model,
    Source,
    Output,
    Configuration,
}

/// 錯誤嚴重程度，CLI 依此決定退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl FactorError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn division_by_zero(message: impl Into<String>) -> Self {
        Self::DivisionByZero {
            message: message.into(),
        }
    }

    pub fn degenerate_spread(message: impl Into<String>) -> Self {
        Self::DegenerateSpread {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } | Self::CsvError(_) | Self::SerializationError(_) => {
                ErrorCategory::Input
            }
            Self::DivisionByZero { .. }
            | Self::DegenerateSpread { .. }
            | Self::MissingFactor { .. } => ErrorCategory::Model,
            Self::SourceError { .. } | Self::ApiError(_) => ErrorCategory::Source,
            Self::ZipError(_) | Self::IoError(_) => ErrorCategory::Output,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Source => ErrorSeverity::Medium,
            ErrorCategory::Input | ErrorCategory::Model | ErrorCategory::Configuration => {
                ErrorSeverity::High
            }
            ErrorCategory::Output => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => {
                "Check that every entry has a two-letter country code and a probability between 0 and 1"
            }
            Self::DivisionByZero { .. } => {
                "The sample has no spread; use a snapshot with differing exit probabilities or another strategy"
            }
            Self::DegenerateSpread { .. } => {
                "Adjust the estimator cutoffs or switch strategy; the model is undefined for this sample"
            }
            Self::MissingFactor { .. } => {
                "Regenerate the factors file so it covers every relay country"
            }
            Self::SourceError { .. } | Self::ApiError(_) => {
                "Verify the probability source is reachable and returns the expected JSON document"
            }
            Self::CsvError(_) | Self::SerializationError(_) => {
                "Inspect the input document for malformed fields"
            }
            Self::ZipError(_) | Self::IoError(_) => {
                "Check that the output directory exists and is writable"
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "Review the configuration file and command line flags",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("The probability data was rejected: {}", self),
            ErrorCategory::Model => format!("The factor model cannot be evaluated: {}", self),
            ErrorCategory::Source => format!("Could not obtain exit probabilities: {}", self),
            ErrorCategory::Output => format!("Could not write results: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, FactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_errors_are_high_severity() {
        let err = FactorError::degenerate_spread("weighted value is zero for 'us'");
        assert_eq!(err.category(), ErrorCategory::Model);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.user_friendly_message().contains("weighted value is zero"));
    }

    #[test]
    fn test_source_errors_are_medium_severity() {
        let err = FactorError::SourceError {
            message: "compass exited with status 1".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }
}
