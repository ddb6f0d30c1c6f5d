/*!
 * Tests for the error taxonomy
 */

use panelglot::errors::{AppError, BatchError, ErrorKind, OrchestratorError, ProviderError};

#[test]
fn test_providerError_kind_shouldClassifyEveryVariant() {
    let cases = vec![
        (ProviderError::ConnectionError("refused".into()), ErrorKind::Network),
        (ProviderError::RequestFailed("reset".into()), ErrorKind::Network),
        (ProviderError::Timeout("slow".into()), ErrorKind::Timeout),
        (
            ProviderError::RateLimitExceeded {
                message: "429".into(),
                retry_after_secs: None,
            },
            ErrorKind::RateLimit,
        ),
        (ProviderError::AuthenticationError("bad key".into()), ErrorKind::Auth),
        (
            ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into(),
            },
            ErrorKind::InvalidRequest,
        ),
        (
            ProviderError::ApiError {
                status_code: 503,
                message: "unavailable".into(),
            },
            ErrorKind::Server,
        ),
        (ProviderError::ParseError("garbage".into()), ErrorKind::Unknown),
        (ProviderError::Unsupported("no batch".into()), ErrorKind::Unknown),
    ];

    for (error, expected) in cases {
        assert_eq!(error.kind(), expected, "{}", error);
    }
}

#[test]
fn test_orchestratorError_fromProvider_shouldKeepKindAndAttempts() {
    let error = OrchestratorError::from_provider(
        "translate_text",
        4,
        &ProviderError::ApiError {
            status_code: 502,
            message: "bad gateway".into(),
        },
    );

    assert_eq!(error.kind, ErrorKind::Server);
    assert_eq!(error.attempts, 4);
    assert_eq!(error.operation, "translate_text");
    assert!(error.is_retryable());
}

#[test]
fn test_orchestratorError_cancelled_shouldNotBeRetryable() {
    let error = OrchestratorError::cancelled("detect_text", 2);
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert!(!error.is_retryable());
    assert_eq!(error.kind.remediation_hint(), "the operation was cancelled");
}

#[test]
fn test_errorKind_remediationHint_shouldExistForEveryKind() {
    let kinds = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::RateLimit,
        ErrorKind::Auth,
        ErrorKind::InvalidRequest,
        ErrorKind::Server,
        ErrorKind::Unknown,
        ErrorKind::Cancelled,
    ];
    for kind in kinds {
        assert!(!kind.remediation_hint().is_empty());
        assert_eq!(kind.to_string(), kind.as_str());
    }
}

#[test]
fn test_appError_conversions_shouldWrapDomainErrors() {
    let app: AppError = OrchestratorError::cancelled("detect_text", 1).into();
    assert!(matches!(app, AppError::Request(_)));

    let app: AppError = BatchError::NotIdle("processing".into()).into();
    assert!(app.to_string().contains("processing"));

    let app: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(app, AppError::File(_)));
}
