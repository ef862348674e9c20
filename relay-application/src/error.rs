use std::sync::Arc;

use relay_domain::{FilterError, HistoryError};

use crate::dedup::WorkAborted;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unknown server '{0}'")]
    UnknownServer(String),
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("relay failed: {0}")]
    Relay(#[source] anyhow::Error),
    #[error(transparent)]
    Aborted(#[from] WorkAborted),
    /// Failure of a concurrent delivery with the same id that this call waited on.
    #[error(transparent)]
    Coalesced(Arc<AppError>),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// The error a shared failure stands for, looking through coalescing.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Coalesced(inner) => inner.root(),
            other => other,
        }
    }

    pub(crate) fn from_shared(shared: Arc<AppError>) -> Self {
        Arc::try_unwrap(shared).unwrap_or_else(AppError::Coalesced)
    }
}
