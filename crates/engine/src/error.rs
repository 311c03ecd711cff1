use database::DbError;
use sandbox::SandboxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[source] DbError),
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Storage(other),
        }
    }
}

impl From<SandboxError> for EngineError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Configuration(msg) => EngineError::Configuration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_records_stay_not_found() {
        let err = EngineError::from(DbError::NotFound("Strategy 4".to_string()));
        assert!(matches!(err, EngineError::NotFound(ref what) if what == "Strategy 4"));
        assert_eq!(err.to_string(), "Strategy 4 not found");

        let err = EngineError::from(DbError::InvalidData("status 9".to_string()));
        assert!(matches!(err, EngineError::Storage(_)));
    }

    #[test]
    fn storage_errors_keep_their_cause() {
        let err = EngineError::from(DbError::InvalidData("status 9".to_string()));
        let source = std::error::Error::source(&err).expect("storage error has a source");
        assert_eq!(source.to_string(), DbError::InvalidData("status 9".to_string()).to_string());
    }
}
