use thiserror::Error;

#[derive(Error, Debug)]
pub enum BagFilterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Bag metadata error: {0}")]
    MetadataError(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Bag not found: {path}")]
    BagNotFound { path: String },

    #[error("No SQLite database found in bag directory: {path}")]
    NoDatabaseFile { path: String },

    #[error("Unsupported storage identifier: {identifier}")]
    UnsupportedStorage { identifier: String },

    #[error("No topics selected")]
    NoTopicsSelected,

    #[error("Topic not found in bag: {name}")]
    UnknownTopic { name: String },

    #[error("Invalid time range: start={start}, end={end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("Output bag already exists: {path}")]
    OutputExists { path: String },

    #[error("Output directory {output} contains input bag {input}")]
    OutputContainsInput { output: String, input: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Storage,
    Output,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BagFilterError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. }
            | Self::NoTopicsSelected
            | Self::InvalidTimeRange { .. } => ErrorCategory::Configuration,
            Self::BagNotFound { .. }
            | Self::NoDatabaseFile { .. }
            | Self::UnsupportedStorage { .. }
            | Self::UnknownTopic { .. }
            | Self::MetadataError(_) => ErrorCategory::Input,
            Self::IoError(_) | Self::DatabaseError(_) => ErrorCategory::Storage,
            Self::OutputExists { .. }
            | Self::OutputContainsInput { .. }
            | Self::SerializationError(_) => ErrorCategory::Output,
            Self::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 資料庫被其他程序鎖住時可以重試
            Self::DatabaseError(sqlx::Error::PoolTimedOut) => ErrorSeverity::Medium,
            Self::DatabaseError(sqlx::Error::Database(db)) if db.message().contains("locked") => {
                ErrorSeverity::Medium
            }
            Self::IoError(_) | Self::DatabaseError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 對應的程序退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NoTopicsSelected => "No topics selected!".to_string(),
            Self::UnknownTopic { name } => format!("Topic '{}' does not exist in the input bag", name),
            Self::InvalidTimeRange { .. } => "Invalid time values".to_string(),
            Self::BagNotFound { path } => format!("Input bag '{}' does not exist", path),
            Self::NoDatabaseFile { path } => {
                format!("No SQLite database (.db3) found in '{}'", path)
            }
            Self::UnsupportedStorage { identifier } => format!(
                "Bag uses the '{}' storage plugin; only sqlite3 bags can be filtered",
                identifier
            ),
            Self::OutputExists { path } => {
                format!("Output directory '{}' already contains files", path)
            }
            Self::OutputContainsInput { output, input } => format!(
                "Output directory '{}' contains the input bag '{}'",
                output, input
            ),
            Self::MissingConfigError { field } => {
                format!("Required setting '{}' is missing", field)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            Self::ConfigValidationError { field, message } => {
                format!("Invalid configuration '{}': {}", field, message)
            }
            Self::DatabaseError(e) => format!("Bag database error: {}", e),
            Self::MetadataError(e) => format!("Could not read bag metadata: {}", e),
            other => format!("Processing failed: {}", other),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::NoTopicsSelected => "Pass --topics with at least one topic or use --all-topics",
            Self::UnknownTopic { .. } => "Run with --list to see the topics recorded in the bag",
            Self::InvalidTimeRange { .. } => {
                "Start must be >= 0 and end must not be smaller than start (seconds)"
            }
            Self::BagNotFound { .. } | Self::NoDatabaseFile { .. } => {
                "Point --input at a rosbag2 directory or a .db3 file"
            }
            Self::UnsupportedStorage { .. } => {
                "Convert the bag to sqlite3 storage with `ros2 bag convert` first"
            }
            Self::OutputExists { .. } => "Choose another output directory or pass --overwrite",
            Self::OutputContainsInput { .. } => {
                "Write the filtered bag next to the input bag, not around it"
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "Check the command line flags or the TOML job file",
            Self::DatabaseError(_) => "Make sure the bag is not being recorded and is not corrupted",
            Self::MetadataError(_) => "Check that metadata.yaml in the bag directory is valid YAML",
            Self::IoError(_) => "Check file permissions and free disk space",
            Self::SerializationError(_) | Self::ProcessingError { .. } => {
                "Re-run with --verbose for more details"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BagFilterError>;
