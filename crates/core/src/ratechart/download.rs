//! Download status aggregation for a chart group.

use std::collections::HashMap;

use ratechart_shared::types::MachineId;

use super::types::{
    ChartGroup, DownloadStatus, Machine, MachineDownloadRecord, MachineDownloadState,
    SocietyDownloadStatus,
};

/// Joins a group's societies with their machines and the master's download
/// records. Records for other charts are ignored.
#[must_use]
pub fn summarize_downloads(
    group: &ChartGroup,
    machines: &[Machine],
    records: &[MachineDownloadRecord],
) -> DownloadStatus {
    let master_id = group.master.id;
    let fetched: HashMap<MachineId, &MachineDownloadRecord> = records
        .iter()
        .filter(|r| r.chart_id == master_id && r.downloaded)
        .map(|r| (r.machine_id, r))
        .collect();

    let mut per_society: Vec<SocietyDownloadStatus> = group
        .members()
        .map(|header| {
            let mut states: Vec<MachineDownloadState> = machines
                .iter()
                .filter(|m| m.society_id == header.society_id)
                .map(|m| {
                    let record = fetched.get(&m.id);
                    MachineDownloadState {
                        machine_id: m.id,
                        machine_code: m.machine_code.clone(),
                        downloaded: record.is_some(),
                        downloaded_at: record.and_then(|r| r.downloaded_at),
                    }
                })
                .collect();
            states.sort_by_key(|s| s.machine_id);

            SocietyDownloadStatus {
                society_id: header.society_id,
                header_id: header.id,
                total_machines: states.len(),
                total_downloaded: states.iter().filter(|s| s.downloaded).count(),
                machines: states,
            }
        })
        .collect();
    per_society.sort_by_key(|s| s.society_id);

    DownloadStatus {
        master_chart_id: master_id,
        channel: group.master.channel,
        total_machines: per_society.iter().map(|s| s.total_machines).sum(),
        total_downloaded: per_society.iter().map(|s| s.total_downloaded).sum(),
        per_society,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ratechart_shared::types::{ChartId, SocietyId};

    use crate::ratechart::types::{
        Channel, ChartHeader, ChartProvenance, ChartStatus, HeaderKind,
    };

    fn header(id: i64, society: i64, kind: HeaderKind) -> ChartHeader {
        ChartHeader {
            id: ChartId::new(id),
            society_id: SocietyId::new(society),
            channel: Channel::Cow,
            kind,
            status: ChartStatus::Active,
            provenance: ChartProvenance {
                file_name: "rates.csv".to_string(),
                uploaded_by: "admin".to_string(),
                uploaded_at: Utc::now(),
                record_count: 2,
            },
        }
    }

    fn machine(id: i64, society: i64) -> Machine {
        Machine {
            id: MachineId::new(id),
            society_id: SocietyId::new(society),
            machine_code: format!("M-{id}"),
        }
    }

    fn record(machine: i64, chart: i64, downloaded: bool) -> MachineDownloadRecord {
        MachineDownloadRecord {
            machine_id: MachineId::new(machine),
            chart_id: ChartId::new(chart),
            downloaded,
            downloaded_at: downloaded.then(Utc::now),
        }
    }

    #[test]
    fn test_summarize_counts_per_society() {
        let reference = HeaderKind::Reference {
            master_id: ChartId::new(1),
        };
        let group = ChartGroup {
            master: header(1, 10, HeaderKind::Master),
            references: vec![header(2, 11, reference)],
        };
        let machines = vec![machine(100, 10), machine(101, 10), machine(200, 11), machine(300, 12)];
        let records = vec![
            record(100, 1, true),
            record(101, 1, false),
            record(200, 99, true),
            record(300, 1, true),
        ];

        let status = summarize_downloads(&group, &machines, &records);

        assert_eq!(status.master_chart_id, ChartId::new(1));
        assert_eq!(status.total_machines, 3);
        assert_eq!(status.total_downloaded, 1);
        assert_eq!(status.per_society.len(), 2);
        assert_eq!(status.per_society[0].society_id, SocietyId::new(10));
        assert_eq!(status.per_society[0].total_downloaded, 1);
        assert!(status.per_society[0].machines[0].downloaded_at.is_some());
        assert_eq!(status.per_society[1].header_id, ChartId::new(2));
        assert_eq!(status.per_society[1].total_downloaded, 0);
    }

    #[test]
    fn test_summarize_society_without_machines() {
        let group = ChartGroup {
            master: header(5, 20, HeaderKind::Master),
            references: vec![],
        };
        let status = summarize_downloads(&group, &[], &[]);
        assert_eq!(status.total_machines, 0);
        assert_eq!(status.per_society[0].machines.len(), 0);
    }
}
