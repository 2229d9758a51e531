use thiserror::Error;
use tributary_catalog::CatalogError;
use tributary_extractor::ExtractorError;

use crate::coordinator::CoordinatorError;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A multi-step write failed and undoing the earlier steps failed too.
    #[error("{cause} (compensation failed: {})", .failures.join("; "))]
    Compensation {
        cause: Box<ServiceError>,
        failures: Vec<String>,
    },
}

impl ServiceError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Status code for synchronous callers: the capability's own code when
    /// it reported one, otherwise 500.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Extractor(e) => e.status_code().unwrap_or(500),
            ServiceError::Coordinator(CoordinatorError::TicketNotFound(_)) => 404,
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::Compensation { cause, .. } => cause.status_code(),
            _ => 500,
        }
    }

    /// Failures of our own plumbing (status store, broker) rather than of
    /// the capability being driven. Workers leave these to the router's
    /// retry policy instead of failing the ticket.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            ServiceError::Coordinator(_) => true,
            ServiceError::Compensation { cause, .. } => cause.is_infrastructure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_protocol::TicketId;

    #[test]
    fn test_status_code_is_passed_through() {
        let err = ServiceError::from(ExtractorError::api(409, "conflict"));
        assert_eq!(err.status_code(), 409);
        assert!(!err.is_infrastructure());

        let err = ServiceError::from(ExtractorError::transport("reset"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_unknown_ticket_is_404() {
        let err = ServiceError::from(CoordinatorError::TicketNotFound(TicketId::new()));
        assert_eq!(err.status_code(), 404);
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_compensation_reports_both_errors() {
        let err = ServiceError::Compensation {
            cause: Box::new(CatalogError::NoDestination.into()),
            failures: vec!["delete connector: API failed with status: 503 and body 'down'".into()],
        };
        assert_eq!(
            err.to_string(),
            "Connector without destination configuration (compensation failed: \
             delete connector: API failed with status: 503 and body 'down')"
        );
        assert_eq!(err.status_code(), 500);
    }
}
