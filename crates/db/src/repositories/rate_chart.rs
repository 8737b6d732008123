//! Rate chart repository for database operations.
//!
//! Implements the core [`RateChartStore`] traits on top of a `SeaORM`
//! transaction. Header reads lock the returned rows with `FOR UPDATE`.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::error;

use crate::entities::{
    chart_data_rows, chart_headers, machine_download_records, machines,
    sea_orm_active_enums::{ChartStatus as DbChartStatus, MilkChannel},
};
use ratechart_core::ratechart::{
    Channel, ChartDataRow, ChartHeader, ChartProvenance, ChartStatus, ChartTransaction,
    HeaderKind, Machine, MachineDownloadRecord, NewChartHeader, RateChartError, RateChartStore,
    RateRow,
};
use ratechart_shared::types::{ChartId, MachineId, SocietyId};

/// Rows per multi-row insert, well under the Postgres bind parameter limit.
const INSERT_CHUNK: usize = 1_000;

/// Rate chart repository.
#[derive(Debug, Clone)]
pub struct RateChartRepository {
    db: DatabaseConnection,
}

impl RateChartRepository {
    /// Create a new rate chart repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl RateChartStore for RateChartRepository {
    type Tx = RateChartTransaction;

    async fn begin(&self) -> Result<Self::Tx, RateChartError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        Ok(RateChartTransaction { txn })
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
pub struct RateChartTransaction {
    txn: DatabaseTransaction,
}

impl ChartTransaction for RateChartTransaction {
    async fn find_header(&mut self, id: ChartId) -> Result<Option<ChartHeader>, RateChartError> {
        let model = chart_headers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(model.map(to_domain_header))
    }

    async fn find_active_header(
        &mut self,
        society_id: SocietyId,
        channel: Channel,
    ) -> Result<Option<ChartHeader>, RateChartError> {
        let model = chart_headers::Entity::find()
            .filter(chart_headers::Column::SocietyId.eq(society_id.into_inner()))
            .filter(chart_headers::Column::Channel.eq(to_db_channel(channel)))
            .filter(chart_headers::Column::Status.eq(DbChartStatus::Active))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(model.map(to_domain_header))
    }

    async fn find_society_header(
        &mut self,
        society_id: SocietyId,
        channel: Channel,
    ) -> Result<Option<ChartHeader>, RateChartError> {
        let model = chart_headers::Entity::find()
            .filter(chart_headers::Column::SocietyId.eq(society_id.into_inner()))
            .filter(chart_headers::Column::Channel.eq(to_db_channel(channel)))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(model.map(to_domain_header))
    }

    async fn list_headers(&mut self) -> Result<Vec<ChartHeader>, RateChartError> {
        let models = chart_headers::Entity::find()
            .order_by_asc(chart_headers::Column::Id)
            .all(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(models.into_iter().map(to_domain_header).collect())
    }

    async fn list_references(
        &mut self,
        master_id: ChartId,
    ) -> Result<Vec<ChartHeader>, RateChartError> {
        let models = chart_headers::Entity::find()
            .filter(chart_headers::Column::SharedChartId.eq(master_id.into_inner()))
            .order_by_asc(chart_headers::Column::Id)
            .lock_exclusive()
            .all(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(models.into_iter().map(to_domain_header).collect())
    }

    async fn delete_header_and_cascade(&mut self, id: ChartId) -> Result<u64, RateChartError> {
        let id = id.into_inner();

        let references = chart_headers::Entity::find()
            .filter(chart_headers::Column::SharedChartId.eq(id))
            .count(&self.txn)
            .await
            .map_err(db_err)?;
        if references > 0 {
            return Err(RateChartError::storage(format!(
                "chart {id} is still referenced by {references} header(s)"
            )));
        }

        let rows = chart_data_rows::Entity::delete_many()
            .filter(chart_data_rows::Column::ChartId.eq(id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        machine_download_records::Entity::delete_many()
            .filter(machine_download_records::Column::ChartId.eq(id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        chart_headers::Entity::delete_by_id(id)
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(rows.rows_affected)
    }

    async fn insert_headers(
        &mut self,
        headers: &[NewChartHeader],
    ) -> Result<Vec<ChartHeader>, RateChartError> {
        let mut inserted = Vec::with_capacity(headers.len());
        for header in headers {
            let active_model = chart_headers::ActiveModel {
                society_id: Set(header.society_id.into_inner()),
                channel: Set(to_db_channel(header.channel)),
                status: Set(to_db_status(header.status)),
                shared_chart_id: Set(None),
                file_name: Set(header.provenance.file_name.clone()),
                uploaded_by: Set(header.provenance.uploaded_by.clone()),
                uploaded_at: Set(header.provenance.uploaded_at.into()),
                record_count: Set(header.provenance.record_count),
                ..Default::default()
            };

            let model = active_model.insert(&self.txn).await.map_err(db_err)?;
            inserted.push(to_domain_header(model));
        }

        Ok(inserted)
    }

    async fn insert_data_rows(
        &mut self,
        master_id: ChartId,
        rows: &[RateRow],
    ) -> Result<u64, RateChartError> {
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let models = chunk.iter().map(|row| chart_data_rows::ActiveModel {
                chart_id: Set(master_id.into_inner()),
                clr: Set(row.clr),
                fat: Set(row.fat),
                snf: Set(row.snf),
                rate: Set(row.rate),
                ..Default::default()
            });

            inserted += chart_data_rows::Entity::insert_many(models)
                .exec_without_returning(&self.txn)
                .await
                .map_err(db_err)?;
        }

        Ok(inserted)
    }

    async fn relink_shared_references(
        &mut self,
        society_ids: &[SocietyId],
        channel: Channel,
        master_id: ChartId,
    ) -> Result<u64, RateChartError> {
        if society_ids.is_empty() {
            return Ok(0);
        }

        let result = chart_headers::Entity::update_many()
            .col_expr(
                chart_headers::Column::SharedChartId,
                Expr::value(Some(master_id.into_inner())),
            )
            .filter(
                chart_headers::Column::SocietyId
                    .is_in(society_ids.iter().copied().map(SocietyId::into_inner)),
            )
            .filter(chart_headers::Column::Channel.eq(to_db_channel(channel)))
            .filter(chart_headers::Column::Id.ne(master_id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn promote_reference(
        &mut self,
        old_master: ChartId,
        successor: ChartId,
    ) -> Result<(), RateChartError> {
        let old_master = old_master.into_inner();
        let successor = successor.into_inner();

        chart_headers::Entity::update_many()
            .col_expr(
                chart_headers::Column::SharedChartId,
                Expr::value(Option::<i64>::None),
            )
            .filter(chart_headers::Column::Id.eq(successor))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        chart_headers::Entity::update_many()
            .col_expr(
                chart_headers::Column::SharedChartId,
                Expr::value(Some(successor)),
            )
            .filter(chart_headers::Column::SharedChartId.eq(old_master))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        chart_data_rows::Entity::update_many()
            .col_expr(chart_data_rows::Column::ChartId, Expr::value(successor))
            .filter(chart_data_rows::Column::ChartId.eq(old_master))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        machine_download_records::Entity::delete_many()
            .filter(machine_download_records::Column::ChartId.eq(successor))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        machine_download_records::Entity::update_many()
            .col_expr(
                machine_download_records::Column::ChartId,
                Expr::value(successor),
            )
            .filter(machine_download_records::Column::ChartId.eq(old_master))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn set_status(
        &mut self,
        ids: &[ChartId],
        status: ChartStatus,
    ) -> Result<u64, RateChartError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = chart_headers::Entity::update_many()
            .set(chart_headers::ActiveModel {
                status: Set(to_db_status(status)),
                ..Default::default()
            })
            .filter(chart_headers::Column::Id.is_in(ids.iter().copied().map(ChartId::into_inner)))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn data_rows(&mut self, master_id: ChartId) -> Result<Vec<ChartDataRow>, RateChartError> {
        let models = chart_data_rows::Entity::find()
            .filter(chart_data_rows::Column::ChartId.eq(master_id.into_inner()))
            .order_by_asc(chart_data_rows::Column::Id)
            .all(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(models.into_iter().map(to_domain_row).collect())
    }

    async fn machines_for_societies(
        &mut self,
        society_ids: &[SocietyId],
    ) -> Result<Vec<Machine>, RateChartError> {
        if society_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = machines::Entity::find()
            .filter(
                machines::Column::SocietyId
                    .is_in(society_ids.iter().copied().map(SocietyId::into_inner)),
            )
            .order_by_asc(machines::Column::Id)
            .all(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(models
            .into_iter()
            .map(|m| Machine {
                id: MachineId::new(m.id),
                society_id: SocietyId::new(m.society_id),
                machine_code: m.machine_code,
            })
            .collect())
    }

    async fn download_records(
        &mut self,
        master_id: ChartId,
    ) -> Result<Vec<MachineDownloadRecord>, RateChartError> {
        let models = machine_download_records::Entity::find()
            .filter(machine_download_records::Column::ChartId.eq(master_id.into_inner()))
            .order_by_asc(machine_download_records::Column::MachineId)
            .all(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(models
            .into_iter()
            .map(|r| MachineDownloadRecord {
                machine_id: MachineId::new(r.machine_id),
                chart_id: ChartId::new(r.chart_id),
                downloaded: r.downloaded,
                downloaded_at: r.downloaded_at.map(|at| at.with_timezone(&Utc)),
            })
            .collect())
    }

    async fn record_download(
        &mut self,
        machine_id: MachineId,
        master_id: ChartId,
        at: DateTime<Utc>,
    ) -> Result<(), RateChartError> {
        let record = machine_download_records::ActiveModel {
            machine_id: Set(machine_id.into_inner()),
            chart_id: Set(master_id.into_inner()),
            downloaded: Set(true),
            downloaded_at: Set(Some(at.into())),
        };

        machine_download_records::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    machine_download_records::Column::MachineId,
                    machine_download_records::Column::ChartId,
                ])
                .update_columns([
                    machine_download_records::Column::Downloaded,
                    machine_download_records::Column::DownloadedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn reset_downloads(
        &mut self,
        master_ids: &[ChartId],
        machine_ids: &[MachineId],
    ) -> Result<u64, RateChartError> {
        if master_ids.is_empty() || machine_ids.is_empty() {
            return Ok(0);
        }

        let result = machine_download_records::Entity::update_many()
            .col_expr(machine_download_records::Column::Downloaded, Expr::value(false))
            .col_expr(
                machine_download_records::Column::DownloadedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(
                machine_download_records::Column::ChartId
                    .is_in(master_ids.iter().copied().map(ChartId::into_inner)),
            )
            .filter(
                machine_download_records::Column::MachineId
                    .is_in(machine_ids.iter().copied().map(MachineId::into_inner)),
            )
            .filter(machine_download_records::Column::Downloaded.eq(true))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn commit(self) -> Result<(), RateChartError> {
        self.txn.commit().await.map_err(db_err)
    }
}

fn db_err(e: DbErr) -> RateChartError {
    error!(error = %e, "Rate chart storage failure");
    RateChartError::storage(e.to_string())
}

/// Convert domain channel to database enum.
fn to_db_channel(channel: Channel) -> MilkChannel {
    match channel {
        Channel::Cow => MilkChannel::Cow,
        Channel::Buffalo => MilkChannel::Buffalo,
        Channel::Mixed => MilkChannel::Mixed,
    }
}

/// Convert database channel to domain enum.
fn from_db_channel(channel: MilkChannel) -> Channel {
    match channel {
        MilkChannel::Cow => Channel::Cow,
        MilkChannel::Buffalo => Channel::Buffalo,
        MilkChannel::Mixed => Channel::Mixed,
    }
}

fn to_db_status(status: ChartStatus) -> DbChartStatus {
    match status {
        ChartStatus::Active => DbChartStatus::Active,
        ChartStatus::Inactive => DbChartStatus::Inactive,
    }
}

fn from_db_status(status: DbChartStatus) -> ChartStatus {
    match status {
        DbChartStatus::Active => ChartStatus::Active,
        DbChartStatus::Inactive => ChartStatus::Inactive,
    }
}

/// Convert database model to domain header.
fn to_domain_header(model: chart_headers::Model) -> ChartHeader {
    ChartHeader {
        id: ChartId::new(model.id),
        society_id: SocietyId::new(model.society_id),
        channel: from_db_channel(model.channel),
        kind: HeaderKind::from_shared_chart_id(model.shared_chart_id.map(ChartId::new)),
        status: from_db_status(model.status),
        provenance: ChartProvenance {
            file_name: model.file_name,
            uploaded_by: model.uploaded_by,
            uploaded_at: model.uploaded_at.with_timezone(&Utc),
            record_count: model.record_count,
        },
    }
}

fn to_domain_row(model: chart_data_rows::Model) -> ChartDataRow {
    ChartDataRow {
        id: model.id,
        chart_id: ChartId::new(model.chart_id),
        values: RateRow {
            clr: model.clr,
            fat: model.fat,
            snf: model.snf,
            rate: model.rate,
        },
    }
}
