//! Rate chart error types.

use ratechart_shared::AppError;
use ratechart_shared::types::{ChartId, SocietyId};
use thiserror::Error;

use super::parser::ParseError;

/// Rate chart operation errors.
#[derive(Debug, Error)]
pub enum RateChartError {
    /// The upload was rejected before anything was written.
    #[error("invalid rate chart: {0}")]
    Validation(#[from] ParseError),

    /// Target societies already have an active chart for the channel.
    #[error("{} societies already have an active chart for this channel", society_ids.len())]
    Conflict {
        /// Societies holding an active chart.
        society_ids: Vec<SocietyId>,
    },

    /// Header or chart does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request parameters are unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage or transaction failure; the transaction was rolled back.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RateChartError {
    /// Create a not found error for a chart header.
    #[must_use]
    pub fn chart_not_found(id: ChartId) -> Self {
        Self::NotFound(format!("chart {id}"))
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<RateChartError> for AppError {
    fn from(err: RateChartError) -> Self {
        match err {
            RateChartError::Validation(ParseError::FileTooLarge { .. }) => {
                Self::PayloadTooLarge(err.to_string())
            }
            RateChartError::Validation(_) | RateChartError::InvalidRequest(_) => {
                Self::Validation(err.to_string())
            }
            RateChartError::Conflict { .. } => Self::Conflict(err.to_string()),
            RateChartError::NotFound(_) => Self::NotFound(err.to_string()),
            RateChartError::Storage(_) => Self::Database(err.to_string()),
        }
    }
}
