//! In-memory store used by the service tests.
//!
//! A transaction works on a private copy of the state and publishes it on
//! commit, so dropping a transaction discards its writes. The unique
//! (society, channel) index and the master/reference foreign keys are
//! enforced the same way the database enforces them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ratechart_shared::types::{ChartId, MachineId, SocietyId};

use super::error::RateChartError;
use super::store::{ChartTransaction, RateChartStore};
use super::types::{
    Channel, ChartDataRow, ChartHeader, ChartStatus, HeaderKind, Machine, MachineDownloadRecord,
    NewChartHeader, RateRow,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub headers: BTreeMap<ChartId, ChartHeader>,
    pub rows: Vec<ChartDataRow>,
    pub machines: Vec<Machine>,
    pub downloads: BTreeMap<(MachineId, ChartId), MachineDownloadRecord>,
    next_header_id: i64,
    next_row_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    /// Fail `set_status` after this many headers were updated.
    set_status_after: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_machine(&self, id: i64, society_id: i64) {
        self.state.lock().unwrap().machines.push(Machine {
            id: MachineId::new(id),
            society_id: SocietyId::new(society_id),
            machine_code: format!("M-{id}"),
        });
    }

    pub fn fail_set_status_after(&self, updated: usize) {
        self.faults.lock().unwrap().set_status_after = Some(updated);
    }

    pub fn snapshot(&self) -> State {
        self.state.lock().unwrap().clone()
    }

    pub fn header_for(&self, society_id: i64, channel: Channel) -> Option<ChartHeader> {
        self.snapshot()
            .headers
            .into_values()
            .find(|h| h.society_id == SocietyId::new(society_id) && h.channel == channel)
    }

    pub fn rows_of(&self, chart_id: ChartId) -> Vec<ChartDataRow> {
        self.snapshot()
            .rows
            .into_iter()
            .filter(|r| r.chart_id == chart_id)
            .collect()
    }
}

impl RateChartStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, RateChartError> {
        let staged = self.state.lock().unwrap().clone();
        let set_status_after = self.faults.lock().unwrap().set_status_after;
        Ok(MemoryTransaction {
            base: Arc::clone(&self.state),
            staged,
            set_status_after,
        })
    }
}

pub(crate) struct MemoryTransaction {
    base: Arc<Mutex<State>>,
    staged: State,
    set_status_after: Option<usize>,
}

impl MemoryTransaction {
    fn references_of(&self, master_id: ChartId) -> Vec<ChartHeader> {
        self.staged
            .headers
            .values()
            .filter(|h| h.kind == HeaderKind::Reference { master_id })
            .cloned()
            .collect()
    }
}

impl ChartTransaction for MemoryTransaction {
    async fn find_header(&mut self, id: ChartId) -> Result<Option<ChartHeader>, RateChartError> {
        Ok(self.staged.headers.get(&id).cloned())
    }

    async fn find_active_header(
        &mut self,
        society_id: SocietyId,
        channel: Channel,
    ) -> Result<Option<ChartHeader>, RateChartError> {
        Ok(self
            .find_society_header(society_id, channel)
            .await?
            .filter(|h| h.status.is_active()))
    }

    async fn find_society_header(
        &mut self,
        society_id: SocietyId,
        channel: Channel,
    ) -> Result<Option<ChartHeader>, RateChartError> {
        Ok(self
            .staged
            .headers
            .values()
            .find(|h| h.society_id == society_id && h.channel == channel)
            .cloned())
    }

    async fn list_headers(&mut self) -> Result<Vec<ChartHeader>, RateChartError> {
        Ok(self.staged.headers.values().cloned().collect())
    }

    async fn list_references(
        &mut self,
        master_id: ChartId,
    ) -> Result<Vec<ChartHeader>, RateChartError> {
        Ok(self.references_of(master_id))
    }

    async fn delete_header_and_cascade(&mut self, id: ChartId) -> Result<u64, RateChartError> {
        if !self.references_of(id).is_empty() {
            return Err(RateChartError::storage(format!(
                "chart {id} is still referenced"
            )));
        }
        if self.staged.headers.remove(&id).is_none() {
            return Ok(0);
        }
        let before = self.staged.rows.len();
        self.staged.rows.retain(|r| r.chart_id != id);
        self.staged.downloads.retain(|(_, chart_id), _| *chart_id != id);
        Ok((before - self.staged.rows.len()) as u64)
    }

    async fn insert_headers(
        &mut self,
        headers: &[NewChartHeader],
    ) -> Result<Vec<ChartHeader>, RateChartError> {
        let mut inserted = Vec::with_capacity(headers.len());
        for new in headers {
            let taken = self
                .staged
                .headers
                .values()
                .any(|h| h.society_id == new.society_id && h.channel == new.channel);
            if taken {
                return Err(RateChartError::storage(format!(
                    "duplicate key: society {} channel {}",
                    new.society_id, new.channel
                )));
            }
            self.staged.next_header_id += 1;
            let header = ChartHeader {
                id: ChartId::new(self.staged.next_header_id),
                society_id: new.society_id,
                channel: new.channel,
                kind: HeaderKind::Master,
                status: new.status,
                provenance: new.provenance.clone(),
            };
            self.staged.headers.insert(header.id, header.clone());
            inserted.push(header);
        }
        Ok(inserted)
    }

    async fn insert_data_rows(
        &mut self,
        master_id: ChartId,
        rows: &[RateRow],
    ) -> Result<u64, RateChartError> {
        if !self
            .staged
            .headers
            .get(&master_id)
            .is_some_and(ChartHeader::is_master)
        {
            return Err(RateChartError::storage(format!(
                "rows must belong to a master, got {master_id}"
            )));
        }
        for values in rows {
            self.staged.next_row_id += 1;
            self.staged.rows.push(ChartDataRow {
                id: self.staged.next_row_id,
                chart_id: master_id,
                values: *values,
            });
        }
        Ok(rows.len() as u64)
    }

    async fn relink_shared_references(
        &mut self,
        society_ids: &[SocietyId],
        channel: Channel,
        master_id: ChartId,
    ) -> Result<u64, RateChartError> {
        let mut updated = 0;
        for header in self.staged.headers.values_mut() {
            if header.id != master_id
                && header.channel == channel
                && society_ids.contains(&header.society_id)
            {
                header.kind = HeaderKind::Reference { master_id };
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn promote_reference(
        &mut self,
        old_master: ChartId,
        successor: ChartId,
    ) -> Result<(), RateChartError> {
        for header in self.staged.headers.values_mut() {
            if header.id == successor {
                header.kind = HeaderKind::Master;
            } else if header.kind == (HeaderKind::Reference { master_id: old_master }) {
                header.kind = HeaderKind::Reference {
                    master_id: successor,
                };
            }
        }
        for row in &mut self.staged.rows {
            if row.chart_id == old_master {
                row.chart_id = successor;
            }
        }
        let moved: Vec<MachineDownloadRecord> = self
            .staged
            .downloads
            .values()
            .filter(|r| r.chart_id == old_master)
            .cloned()
            .collect();
        self.staged.downloads.retain(|(_, chart_id), _| *chart_id != old_master);
        for mut record in moved {
            record.chart_id = successor;
            self.staged
                .downloads
                .insert((record.machine_id, successor), record);
        }
        Ok(())
    }

    async fn set_status(
        &mut self,
        ids: &[ChartId],
        status: ChartStatus,
    ) -> Result<u64, RateChartError> {
        let mut updated = 0;
        for id in ids {
            if self.set_status_after == Some(updated) {
                return Err(RateChartError::storage("injected failure"));
            }
            if let Some(header) = self.staged.headers.get_mut(id) {
                header.status = status;
                updated += 1;
            }
        }
        Ok(updated as u64)
    }

    async fn data_rows(&mut self, master_id: ChartId) -> Result<Vec<ChartDataRow>, RateChartError> {
        Ok(self
            .staged
            .rows
            .iter()
            .filter(|r| r.chart_id == master_id)
            .cloned()
            .collect())
    }

    async fn machines_for_societies(
        &mut self,
        society_ids: &[SocietyId],
    ) -> Result<Vec<Machine>, RateChartError> {
        Ok(self
            .staged
            .machines
            .iter()
            .filter(|m| society_ids.contains(&m.society_id))
            .cloned()
            .collect())
    }

    async fn download_records(
        &mut self,
        master_id: ChartId,
    ) -> Result<Vec<MachineDownloadRecord>, RateChartError> {
        Ok(self
            .staged
            .downloads
            .values()
            .filter(|r| r.chart_id == master_id)
            .cloned()
            .collect())
    }

    async fn record_download(
        &mut self,
        machine_id: MachineId,
        master_id: ChartId,
        at: DateTime<Utc>,
    ) -> Result<(), RateChartError> {
        self.staged.downloads.insert(
            (machine_id, master_id),
            MachineDownloadRecord {
                machine_id,
                chart_id: master_id,
                downloaded: true,
                downloaded_at: Some(at),
            },
        );
        Ok(())
    }

    async fn reset_downloads(
        &mut self,
        master_ids: &[ChartId],
        machine_ids: &[MachineId],
    ) -> Result<u64, RateChartError> {
        let mut cleared = 0;
        for record in self.staged.downloads.values_mut() {
            if record.downloaded
                && master_ids.contains(&record.chart_id)
                && machine_ids.contains(&record.machine_id)
            {
                record.downloaded = false;
                record.downloaded_at = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn commit(self) -> Result<(), RateChartError> {
        *self.base.lock().unwrap() = self.staged;
        Ok(())
    }
}
