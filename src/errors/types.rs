use thiserror::Error;

/// HTTP transport failure, classified from the underlying client error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect timeout: {0}")]
    ConnectTimeout(String),

    #[error("read timeout: {0}")]
    ReadTimeout(String),

    #[error("TLS failure: {0}")]
    TlsFailure(String),

    #[error("DNS failure: {0}")]
    DnsFailure(String),

    #[error("proxy failure: {0}")]
    ProxyFailure(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("I/O failure: {0}")]
    Io(String),
}

/// Why an expression failed to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprErrorKind {
    Parse,
    UndefinedName,
    TypeMismatch,
    ArityMismatch,
    DivisionByZero,
}

impl std::fmt::Display for ExprErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Parse => "parse error",
            Self::UndefinedName => "undefined name",
            Self::TypeMismatch => "type mismatch",
            Self::ArityMismatch => "arity mismatch",
            Self::DivisionByZero => "division by zero",
        };
        f.write_str(s)
    }
}

/// Expression or interpolation failure with the byte offset of the
/// offending token within the evaluated text.
#[derive(Debug, Error)]
#[error("{kind} at offset {position}: {detail}")]
pub struct ExprError {
    pub position: usize,
    pub kind: ExprErrorKind,
    pub detail: String,
}

impl ExprError {
    pub fn new(position: usize, kind: ExprErrorKind, detail: impl Into<String>) -> Self {
        Self {
            position,
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoxideError {
    #[error("parse error at {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("POC '{0}' not found")]
    TemplateNotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("expression error: {0}")]
    Expr(#[from] ExprError),

    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    #[error("unsupported part: {0}")]
    UnsupportedPart(String),

    #[error("unsupported matcher type: {0}")]
    UnsupportedMatcher(String),

    #[error("unsupported extractor type: {0}")]
    UnsupportedExtractor(String),

    #[error("{0} mode is not supported for YAML POCs")]
    ModeUnsupported(String),

    #[error("POC '{0}' already registered")]
    Duplicate(String),

    #[error("result sink error: {0}")]
    Sink(String),

    #[error("controller is shutting down")]
    ShuttingDown,

    #[error("search provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("search provider '{0}' is not available")]
    ProviderUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_unsupported_message() {
        let err = PoxideError::ModeUnsupported("shell".to_string());
        assert_eq!(err.to_string(), "shell mode is not supported for YAML POCs");
    }

    #[test]
    fn test_expr_error_display() {
        let err = ExprError::new(7, ExprErrorKind::UndefinedName, "no such variable 'csrf'");
        assert_eq!(
            err.to_string(),
            "undefined name at offset 7: no such variable 'csrf'"
        );
    }

    #[test]
    fn test_transport_error_wraps() {
        let err: PoxideError = TransportError::ReadTimeout("deadline exceeded".into()).into();
        assert!(err.to_string().contains("read timeout"));
    }
}
