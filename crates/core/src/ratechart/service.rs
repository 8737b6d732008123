//! Rate chart service: upload, assignment, removal, status, and downloads.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use ratechart_shared::types::{ChartId, MachineId, SocietyId};
use tracing::{info, warn};

use super::download::summarize_downloads;
use super::error::RateChartError;
use super::parser::{UploadPolicy, parse_rate_table};
use super::store::{ChartTransaction, RateChartStore};
use super::types::{
    AssignResult, ChartDataRow, ChartGroup, ChartHeader, ChartProvenance, ChartStatus,
    DownloadStatus, HeaderKind, NewChartHeader, RemovalOutcome, ToggleResult, UploadInput,
    UploadResult,
};

/// Rate chart service over a transactional store.
pub struct RateChartService<S: RateChartStore> {
    store: Arc<S>,
    policy: UploadPolicy,
}

impl<S: RateChartStore> RateChartService<S> {
    /// Create a new rate chart service.
    #[must_use]
    pub fn new(store: Arc<S>, policy: UploadPolicy) -> Self {
        Self { store, policy }
    }

    /// Upload policy applied before parsing.
    #[must_use]
    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Parses a rate table and installs it for the given societies.
    ///
    /// The first society's new header becomes the master and owns the rows;
    /// every other society gets a shared reference. Whatever each society had
    /// for the channel before is released first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No society ids are given
    /// - The file fails validation (nothing is written)
    /// - Any storage step fails (everything is rolled back)
    pub async fn upload(&self, input: UploadInput) -> Result<UploadResult, RateChartError> {
        let society_ids = distinct_societies(&input.society_ids)?;

        let rows = parse_rate_table(&input.file_name, &input.content, &self.policy)
            .inspect_err(|e| warn!(file_name = %input.file_name, error = %e, "Rate chart rejected"))?;
        let record_count = i64::try_from(rows.len())
            .map_err(|_| RateChartError::InvalidRequest("too many rows".to_string()))?;

        let mut tx = self.store.begin().await?;

        for society_id in &society_ids {
            if let Some(existing) = tx.find_society_header(*society_id, input.channel).await? {
                release_header(&mut tx, &existing).await?;
            }
        }

        let provenance = ChartProvenance {
            file_name: input.file_name,
            uploaded_by: input.uploaded_by,
            uploaded_at: Utc::now(),
            record_count,
        };
        let new_headers: Vec<NewChartHeader> = society_ids
            .iter()
            .map(|society_id| NewChartHeader {
                society_id: *society_id,
                channel: input.channel,
                status: ChartStatus::Active,
                provenance: provenance.clone(),
            })
            .collect();

        let inserted = tx.insert_headers(&new_headers).await?;
        let master_id = inserted
            .first()
            .map(|h| h.id)
            .ok_or_else(|| RateChartError::storage("no chart header was inserted"))?;

        tx.insert_data_rows(master_id, &rows).await?;
        tx.relink_shared_references(&society_ids[1..], input.channel, master_id)
            .await?;

        tx.commit().await?;

        info!(
            master_chart_id = %master_id,
            channel = %input.channel,
            record_count,
            society_count = society_ids.len(),
            "Rate chart uploaded"
        );

        Ok(UploadResult {
            master_chart_id: master_id,
            record_count,
            channel: input.channel,
            society_count: society_ids.len(),
            society_ids,
        })
    }

    /// Shares an existing chart with more societies.
    ///
    /// `chart_id` may name the master or any of its references. Societies
    /// already in the group are skipped. Societies with an active chart for
    /// the channel are conflicts unless `replace_existing` is set; inactive
    /// charts are replaced silently. The master's header and rows are never
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The chart does not exist
    /// - Conflicts exist and `replace_existing` is false (nothing is written)
    /// - Any storage step fails
    pub async fn assign(
        &self,
        chart_id: ChartId,
        society_ids: &[SocietyId],
        replace_existing: bool,
    ) -> Result<AssignResult, RateChartError> {
        let society_ids = distinct_societies(society_ids)?;

        let mut tx = self.store.begin().await?;
        let master = find_group_master(&mut tx, chart_id).await?;

        let mut already_assigned = Vec::new();
        let mut conflicts = Vec::new();
        let mut targets = Vec::new();
        let mut replaced = Vec::new();

        for society_id in society_ids {
            if let Some(active) = tx.find_active_header(society_id, master.channel).await? {
                if active.master_id() == master.id {
                    already_assigned.push(society_id);
                } else {
                    conflicts.push(society_id);
                    replaced.push(society_id);
                    targets.push(society_id);
                }
                continue;
            }

            // Inactive charts are replaced without counting as conflicts.
            match tx.find_society_header(society_id, master.channel).await? {
                Some(existing) if existing.master_id() == master.id => {
                    already_assigned.push(society_id);
                }
                Some(_) => {
                    replaced.push(society_id);
                    targets.push(society_id);
                }
                None => targets.push(society_id),
            }
        }

        if !conflicts.is_empty() && !replace_existing {
            warn!(
                master_chart_id = %master.id,
                conflicts = ?conflicts,
                "Assignment blocked by existing charts"
            );
            return Err(RateChartError::Conflict {
                society_ids: conflicts,
            });
        }

        for society_id in &replaced {
            if let Some(existing) = tx.find_society_header(*society_id, master.channel).await? {
                release_header(&mut tx, &existing).await?;
            }
        }

        let new_headers: Vec<NewChartHeader> = targets
            .iter()
            .map(|society_id| NewChartHeader {
                society_id: *society_id,
                channel: master.channel,
                status: master.status,
                provenance: master.provenance.clone(),
            })
            .collect();
        tx.insert_headers(&new_headers).await?;
        tx.relink_shared_references(&targets, master.channel, master.id)
            .await?;

        tx.commit().await?;

        info!(
            master_chart_id = %master.id,
            assigned_count = targets.len(),
            replaced_count = replaced.len(),
            "Rate chart assigned to societies"
        );

        Ok(AssignResult {
            master_chart_id: master.id,
            assigned_count: targets.len(),
            replaced_count: replaced.len(),
            already_assigned,
        })
    }

    /// Removes one society's header from its group.
    ///
    /// Removing a reference leaves the group intact. Removing a master that
    /// still has references promotes the lowest-id reference. Removing the
    /// last header deletes the rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the header does not exist, belongs to another
    /// society, or storage fails.
    pub async fn remove_society(
        &self,
        header_id: ChartId,
        society_id: SocietyId,
    ) -> Result<RemovalOutcome, RateChartError> {
        let mut tx = self.store.begin().await?;

        let header = tx
            .find_header(header_id)
            .await?
            .ok_or_else(|| RateChartError::chart_not_found(header_id))?;
        if header.society_id != society_id {
            return Err(RateChartError::NotFound(format!(
                "chart {header_id} for society {society_id}"
            )));
        }

        let outcome = release_header(&mut tx, &header).await?;
        tx.commit().await?;

        info!(%header_id, %society_id, ?outcome, "Society removed from rate chart");
        Ok(outcome)
    }

    /// Flips the status of every header in a group together.
    ///
    /// # Errors
    ///
    /// Returns an error if the chart does not exist or storage fails; on
    /// failure no header changes.
    pub async fn toggle_status(&self, chart_id: ChartId) -> Result<ToggleResult, RateChartError> {
        let mut tx = self.store.begin().await?;

        let group = load_group(&mut tx, chart_id).await?;
        let new_status = group.master.status.toggled();
        let ids = group.header_ids();
        tx.set_status(&ids, new_status).await?;

        tx.commit().await?;

        info!(
            master_chart_id = %group.master.id,
            ?new_status,
            header_count = ids.len(),
            "Rate chart status toggled"
        );

        Ok(ToggleResult {
            master_chart_id: group.master.id,
            new_status,
            header_count: ids.len(),
        })
    }

    /// Lists every chart group.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_groups(&self) -> Result<Vec<ChartGroup>, RateChartError> {
        let mut tx = self.store.begin().await?;
        let headers = tx.list_headers().await?;
        tx.commit().await?;

        Ok(group_headers(headers))
    }

    /// Returns the group a header belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the chart does not exist or storage fails.
    pub async fn get_group(&self, chart_id: ChartId) -> Result<ChartGroup, RateChartError> {
        let mut tx = self.store.begin().await?;
        let group = load_group(&mut tx, chart_id).await?;
        tx.commit().await?;
        Ok(group)
    }

    /// Returns the rate rows a header serves, resolving references.
    ///
    /// # Errors
    ///
    /// Returns an error if the chart does not exist or storage fails.
    pub async fn chart_rows(&self, chart_id: ChartId) -> Result<Vec<ChartDataRow>, RateChartError> {
        let mut tx = self.store.begin().await?;
        let master = find_group_master(&mut tx, chart_id).await?;
        let rows = tx.data_rows(master.id).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Aggregates machine download progress for a chart's group.
    ///
    /// # Errors
    ///
    /// Returns an error if the chart does not exist or storage fails.
    pub async fn download_status(
        &self,
        chart_id: ChartId,
    ) -> Result<DownloadStatus, RateChartError> {
        let mut tx = self.store.begin().await?;

        let group = load_group(&mut tx, chart_id).await?;
        let machines = tx.machines_for_societies(&group.society_ids()).await?;
        let records = tx.download_records(group.master.id).await?;
        tx.commit().await?;

        Ok(summarize_downloads(&group, &machines, &records))
    }

    /// Clears the download flag so the listed machines fetch the charts again.
    ///
    /// Chart ids may be masters or references. Machines outside the list are
    /// not affected; an empty machine list changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a chart does not exist or storage fails.
    pub async fn reset_downloads(
        &self,
        chart_ids: &[ChartId],
        machine_ids: &[MachineId],
    ) -> Result<u64, RateChartError> {
        if chart_ids.is_empty() {
            return Err(RateChartError::InvalidRequest(
                "at least one chart id is required".to_string(),
            ));
        }
        if machine_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.store.begin().await?;

        let mut master_ids = Vec::with_capacity(chart_ids.len());
        for chart_id in chart_ids {
            let master = find_group_master(&mut tx, *chart_id).await?;
            if !master_ids.contains(&master.id) {
                master_ids.push(master.id);
            }
        }

        let cleared = tx.reset_downloads(&master_ids, machine_ids).await?;
        tx.commit().await?;

        info!(
            charts = ?master_ids,
            machine_count = machine_ids.len(),
            cleared,
            "Machine downloads reset"
        );
        Ok(cleared)
    }

    /// Marks a machine as having fetched a chart's current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the chart does not exist or storage fails.
    pub async fn record_download(
        &self,
        machine_id: MachineId,
        chart_id: ChartId,
    ) -> Result<ChartId, RateChartError> {
        let mut tx = self.store.begin().await?;
        let master = find_group_master(&mut tx, chart_id).await?;
        tx.record_download(machine_id, master.id, Utc::now()).await?;
        tx.commit().await?;
        Ok(master.id)
    }
}

/// Deletes one header without orphaning its group.
///
/// A master with references hands its rows to the lowest-id reference first.
async fn release_header<T: ChartTransaction>(
    tx: &mut T,
    header: &ChartHeader,
) -> Result<RemovalOutcome, RateChartError> {
    match header.kind {
        HeaderKind::Reference { .. } => {
            tx.delete_header_and_cascade(header.id).await?;
            Ok(RemovalOutcome::ReferenceRemoved {
                header_id: header.id,
            })
        }
        HeaderKind::Master => {
            let references = tx.list_references(header.id).await?;
            if let Some(successor) = references.iter().min_by_key(|h| h.id) {
                tx.promote_reference(header.id, successor.id).await?;
                tx.delete_header_and_cascade(header.id).await?;
                Ok(RemovalOutcome::MasterPromoted {
                    header_id: header.id,
                    new_master_id: successor.id,
                })
            } else {
                let rows_deleted = tx.delete_header_and_cascade(header.id).await?;
                Ok(RemovalOutcome::GroupDeleted {
                    header_id: header.id,
                    rows_deleted,
                })
            }
        }
    }
}

/// Resolves any header id to its group's master header.
async fn find_group_master<T: ChartTransaction>(
    tx: &mut T,
    chart_id: ChartId,
) -> Result<ChartHeader, RateChartError> {
    let header = tx
        .find_header(chart_id)
        .await?
        .ok_or_else(|| RateChartError::chart_not_found(chart_id))?;

    match header.kind {
        HeaderKind::Master => Ok(header),
        HeaderKind::Reference { master_id } => tx
            .find_header(master_id)
            .await?
            .filter(ChartHeader::is_master)
            .ok_or_else(|| {
                RateChartError::storage(format!(
                    "chart {chart_id} references missing master {master_id}"
                ))
            }),
    }
}

async fn load_group<T: ChartTransaction>(
    tx: &mut T,
    chart_id: ChartId,
) -> Result<ChartGroup, RateChartError> {
    let master = find_group_master(tx, chart_id).await?;
    let mut references = tx.list_references(master.id).await?;
    references.sort_by_key(|h| h.id);
    Ok(ChartGroup { master, references })
}

/// Builds groups by following each reference to its master.
fn group_headers(headers: Vec<ChartHeader>) -> Vec<ChartGroup> {
    let (masters, references): (Vec<ChartHeader>, Vec<ChartHeader>) =
        headers.into_iter().partition(ChartHeader::is_master);

    let mut groups: Vec<ChartGroup> = masters
        .into_iter()
        .map(|master| ChartGroup {
            master,
            references: Vec::new(),
        })
        .collect();
    groups.sort_by_key(|g| g.master.id);

    for reference in references {
        let master_id = reference.master_id();
        match groups.binary_search_by_key(&master_id, |g| g.master.id) {
            Ok(idx) => groups[idx].references.push(reference),
            Err(_) => warn!(chart_id = %reference.id, %master_id, "Reference without master"),
        }
    }
    for group in &mut groups {
        group.references.sort_by_key(|h| h.id);
    }

    groups
}

/// Rejects an empty list and drops repeats, keeping first occurrences.
fn distinct_societies(society_ids: &[SocietyId]) -> Result<Vec<SocietyId>, RateChartError> {
    if society_ids.is_empty() {
        return Err(RateChartError::InvalidRequest(
            "at least one society id is required".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(society_ids.len());
    Ok(society_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect())
}
