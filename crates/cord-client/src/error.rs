//! Client errors

use cord_common::{ConfigError, TracingError};
use cord_gateway::GatewayError;
use cord_http::HttpError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl ClientError {
    /// Whether the client stopped because of this error rather than by request
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_fatal(),
            Self::Http(_) => true,
            Self::Config(_) | Self::Tracing(_) => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
