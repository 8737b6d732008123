//! Rate chart storage and assignment.
//!
//! This module implements the chart lifecycle:
//! - Rate table parsing and validation
//! - Master/shared-reference chart groups
//! - Upload, assignment, and society removal with master promotion
//! - Group-wide status toggling
//! - Machine download tracking and reset
//! - Transaction-scoped storage traits

pub mod download;
pub mod error;
pub mod parser;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod memory;

pub use download::summarize_downloads;
pub use error::RateChartError;
pub use parser::{
    ParseError, REQUIRED_HEADERS, RowError, RowErrorKind, UploadPolicy, parse_rate_table,
    parse_rate_text,
};
pub use service::RateChartService;
pub use store::{ChartTransaction, RateChartStore};
pub use types::{
    AssignResult, Channel, ChartDataRow, ChartGroup, ChartHeader, ChartProvenance, ChartStatus,
    DownloadStatus, HeaderKind, Machine, MachineDownloadRecord, MachineDownloadState,
    NewChartHeader, RateRow, RemovalOutcome, SocietyDownloadStatus, ToggleResult, UploadInput,
    UploadResult,
};
