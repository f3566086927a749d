use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditVerifyError {
    #[error("audit source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("audit source unparseable: {0}")]
    SourceUnparseable(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
}

impl AuditVerifyError {
    pub fn code(&self) -> AuditErrorCode {
        match self {
            Self::SourceUnavailable(_) => AuditErrorCode::E001SourceUnavailable,
            Self::SourceUnparseable(_) => AuditErrorCode::E002SourceUnparseable,
            Self::InvalidConfig(_) => AuditErrorCode::E003ConfigInvalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditErrorCode {
    E001SourceUnavailable,
    E002SourceUnparseable,
    E003ConfigInvalid,
}

impl AuditErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001SourceUnavailable => "E001_SOURCE_UNAVAILABLE",
            Self::E002SourceUnparseable => "E002_SOURCE_UNPARSEABLE",
            Self::E003ConfigInvalid => "E003_CONFIG_INVALID",
        }
    }
}

/// Stable code for the first typed error in an `anyhow` chain, if any.
pub fn error_code(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AuditVerifyError>())
        .map(|typed| typed.code().as_str())
}
