//! Transaction-scoped storage traits.
//!
//! These traits are implemented by the db crate to provide actual database
//! operations. Every operation of [`super::RateChartService`] opens one
//! [`ChartTransaction`], threads it through each primitive, and commits once;
//! dropping an uncommitted transaction rolls it back.

use std::future::Future;

use chrono::{DateTime, Utc};
use ratechart_shared::types::{ChartId, MachineId, SocietyId};

use super::error::RateChartError;
use super::types::{
    Channel, ChartDataRow, ChartHeader, ChartStatus, Machine, MachineDownloadRecord,
    NewChartHeader, RateRow,
};

/// Source of chart transactions.
pub trait RateChartStore: Send + Sync {
    /// Transaction handle type.
    type Tx: ChartTransaction;

    /// Opens a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, RateChartError>> + Send;
}

/// Storage primitives available inside one transaction.
///
/// Reads of headers that a mutation depends on must lock the rows they
/// return until the transaction ends.
pub trait ChartTransaction: Send + Sized {
    /// Find a header by id.
    fn find_header(
        &mut self,
        id: ChartId,
    ) -> impl Future<Output = Result<Option<ChartHeader>, RateChartError>> + Send;

    /// Find the active header for a society and channel.
    fn find_active_header(
        &mut self,
        society_id: SocietyId,
        channel: Channel,
    ) -> impl Future<Output = Result<Option<ChartHeader>, RateChartError>> + Send;

    /// Find the header for a society and channel regardless of status.
    fn find_society_header(
        &mut self,
        society_id: SocietyId,
        channel: Channel,
    ) -> impl Future<Output = Result<Option<ChartHeader>, RateChartError>> + Send;

    /// All headers, ordered by id.
    fn list_headers(
        &mut self,
    ) -> impl Future<Output = Result<Vec<ChartHeader>, RateChartError>> + Send;

    /// Shared references pointing at a master, ordered by id.
    fn list_references(
        &mut self,
        master_id: ChartId,
    ) -> impl Future<Output = Result<Vec<ChartHeader>, RateChartError>> + Send;

    /// Deletes a header. A master's data rows and download records go with it;
    /// a reference's deletion never touches its master.
    ///
    /// Fails if the header is a master that still has references.
    /// Returns the number of data rows deleted.
    fn delete_header_and_cascade(
        &mut self,
        id: ChartId,
    ) -> impl Future<Output = Result<u64, RateChartError>> + Send;

    /// Inserts headers as masters, returning them in input order.
    fn insert_headers(
        &mut self,
        headers: &[NewChartHeader],
    ) -> impl Future<Output = Result<Vec<ChartHeader>, RateChartError>> + Send;

    /// Inserts data rows owned by a master.
    fn insert_data_rows(
        &mut self,
        master_id: ChartId,
        rows: &[RateRow],
    ) -> impl Future<Output = Result<u64, RateChartError>> + Send;

    /// Points the headers of the given societies/channel at a master.
    /// The master's own header is never relinked.
    fn relink_shared_references(
        &mut self,
        society_ids: &[SocietyId],
        channel: Channel,
        master_id: ChartId,
    ) -> impl Future<Output = Result<u64, RateChartError>> + Send;

    /// Makes `successor` (a reference of `old_master`) the group's master:
    /// clears its link, re-points the other references at it, and moves data
    /// row ownership and download records onto it. `old_master` is left as a
    /// childless, rowless master.
    fn promote_reference(
        &mut self,
        old_master: ChartId,
        successor: ChartId,
    ) -> impl Future<Output = Result<(), RateChartError>> + Send;

    /// Sets the status of every listed header.
    fn set_status(
        &mut self,
        ids: &[ChartId],
        status: ChartStatus,
    ) -> impl Future<Output = Result<u64, RateChartError>> + Send;

    /// Data rows owned by a master, ordered by id.
    fn data_rows(
        &mut self,
        master_id: ChartId,
    ) -> impl Future<Output = Result<Vec<ChartDataRow>, RateChartError>> + Send;

    /// Machines registered to any of the societies.
    fn machines_for_societies(
        &mut self,
        society_ids: &[SocietyId],
    ) -> impl Future<Output = Result<Vec<Machine>, RateChartError>> + Send;

    /// Download records for a master chart.
    fn download_records(
        &mut self,
        master_id: ChartId,
    ) -> impl Future<Output = Result<Vec<MachineDownloadRecord>, RateChartError>> + Send;

    /// Marks a machine as having fetched a master chart.
    fn record_download(
        &mut self,
        machine_id: MachineId,
        master_id: ChartId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), RateChartError>> + Send;

    /// Clears `downloaded` for records matching both id sets.
    fn reset_downloads(
        &mut self,
        master_ids: &[ChartId],
        machine_ids: &[MachineId],
    ) -> impl Future<Output = Result<u64, RateChartError>> + Send;

    /// Commits every write made through this handle.
    fn commit(self) -> impl Future<Output = Result<(), RateChartError>> + Send;
}
