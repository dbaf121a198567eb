//! Error type of the userspace side

use sonar_sched::SchedError;

pub type Result<T> = std::result::Result<T, SonarError>;

#[derive(Debug, thiserror::Error)]
pub enum SonarError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The policy could not be attached; nothing stays resident.
    #[error("Attach failed: {0}")]
    Attach(SchedError),

    #[error("Detach failed: {0}")]
    Detach(String),

    #[error("Statistics snapshot failed: {0}")]
    Snapshot(String),

    #[error("Process filter error: {0}")]
    Filter(String),

    #[error("Reporting failed: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<SchedError> for SonarError {
    fn from(e: SchedError) -> Self {
        SonarError::Attach(e)
    }
}
