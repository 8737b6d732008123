//! Rate chart domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ratechart_shared::types::{ChartId, MachineId, SocietyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::RateChartError;

/// Milk type category partitioning rate charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    /// Cow milk.
    Cow,
    /// Buffalo milk.
    Buffalo,
    /// Mixed milk.
    Mixed,
}

impl Channel {
    /// Returns the canonical wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cow => "COW",
            Self::Buffalo => "BUFFALO",
            Self::Mixed => "MIXED",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = RateChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COW" => Ok(Self::Cow),
            "BUFFALO" => Ok(Self::Buffalo),
            "MIXED" => Ok(Self::Mixed),
            other => Err(RateChartError::InvalidRequest(format!(
                "unknown channel '{other}', expected COW, BUFFALO or MIXED"
            ))),
        }
    }
}

/// Whether consuming machines may fetch a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartStatus {
    /// Machines may fetch the chart.
    Active,
    /// Chart is kept but not served.
    Inactive,
}

impl ChartStatus {
    /// Returns the opposite status.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Inactive,
            Self::Inactive => Self::Active,
        }
    }

    /// Returns true for [`ChartStatus::Active`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Whether a header owns data rows or reuses another header's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeaderKind {
    /// Owns the chart's data rows (`shared_chart_id` is null).
    Master,
    /// Points at the master that stores the rows.
    Reference {
        /// Header id of the master.
        master_id: ChartId,
    },
}

impl HeaderKind {
    /// Builds the kind from the nullable storage column.
    #[must_use]
    pub fn from_shared_chart_id(shared_chart_id: Option<ChartId>) -> Self {
        shared_chart_id.map_or(Self::Master, |master_id| Self::Reference { master_id })
    }

    /// Returns the value of the nullable storage column.
    #[must_use]
    pub const fn shared_chart_id(self) -> Option<ChartId> {
        match self {
            Self::Master => None,
            Self::Reference { master_id } => Some(master_id),
        }
    }
}

/// Upload metadata copied onto every header of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartProvenance {
    /// Original uploaded file name.
    pub file_name: String,
    /// Identity of the uploading administrator.
    pub uploaded_by: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Number of data rows in the master.
    pub record_count: i64,
}

/// One (society, channel) pairing with a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartHeader {
    /// Header id.
    pub id: ChartId,
    /// Owning society.
    pub society_id: SocietyId,
    /// Milk channel.
    pub channel: Channel,
    /// Master or shared reference.
    #[serde(flatten)]
    pub kind: HeaderKind,
    /// Serving status.
    pub status: ChartStatus,
    /// Upload metadata.
    #[serde(flatten)]
    pub provenance: ChartProvenance,
}

impl ChartHeader {
    /// Returns true when this header owns data rows.
    #[must_use]
    pub const fn is_master(&self) -> bool {
        matches!(self.kind, HeaderKind::Master)
    }

    /// Returns the id of the header that owns this chart's rows.
    #[must_use]
    pub const fn master_id(&self) -> ChartId {
        match self.kind {
            HeaderKind::Master => self.id,
            HeaderKind::Reference { master_id } => master_id,
        }
    }
}

/// Header to insert; always inserted as a master and relinked afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChartHeader {
    /// Owning society.
    pub society_id: SocietyId,
    /// Milk channel.
    pub channel: Channel,
    /// Initial status.
    pub status: ChartStatus,
    /// Upload metadata.
    pub provenance: ChartProvenance,
}

/// One parsed rate table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRow {
    /// Corrected lactometer reading.
    pub clr: Decimal,
    /// Fat percentage.
    pub fat: Decimal,
    /// Solids-not-fat percentage.
    pub snf: Decimal,
    /// Price per liter.
    pub rate: Decimal,
}

/// A stored rate row, owned by a master header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartDataRow {
    /// Row id.
    pub id: i64,
    /// Owning master header.
    pub chart_id: ChartId,
    /// Rate values.
    #[serde(flatten)]
    pub values: RateRow,
}

/// A master header plus every header sharing its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartGroup {
    /// Header that owns the rows.
    pub master: ChartHeader,
    /// Shared references, ordered by id.
    pub references: Vec<ChartHeader>,
}

impl ChartGroup {
    /// Master id followed by every reference id.
    #[must_use]
    pub fn header_ids(&self) -> Vec<ChartId> {
        std::iter::once(self.master.id)
            .chain(self.references.iter().map(|h| h.id))
            .collect()
    }

    /// Societies in the group, master's first.
    #[must_use]
    pub fn society_ids(&self) -> Vec<SocietyId> {
        std::iter::once(self.master.society_id)
            .chain(self.references.iter().map(|h| h.society_id))
            .collect()
    }

    /// Master followed by references.
    pub fn members(&self) -> impl Iterator<Item = &ChartHeader> {
        std::iter::once(&self.master).chain(self.references.iter())
    }
}

/// Input for uploading a rate chart to one or more societies.
#[derive(Debug, Clone)]
pub struct UploadInput {
    /// Original file name, used for the extension check and provenance.
    pub file_name: String,
    /// Raw file content.
    pub content: Vec<u8>,
    /// Target societies; the first becomes the master.
    pub society_ids: Vec<SocietyId>,
    /// Milk channel.
    pub channel: Channel,
    /// Identity of the uploading administrator.
    pub uploaded_by: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// Header that owns the uploaded rows.
    pub master_chart_id: ChartId,
    /// Number of rows stored.
    pub record_count: i64,
    /// Milk channel.
    pub channel: Channel,
    /// Number of societies in the new group.
    pub society_count: usize,
    /// Societies in the new group, master's first.
    pub society_ids: Vec<SocietyId>,
}

/// Result of assigning an existing chart to more societies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignResult {
    /// Master of the group the societies joined.
    pub master_chart_id: ChartId,
    /// Number of reference headers created.
    pub assigned_count: usize,
    /// How many of those replaced a previous chart.
    pub replaced_count: usize,
    /// Societies that were already members and were skipped.
    pub already_assigned: Vec<SocietyId>,
}

/// What releasing a header did to its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    /// A shared reference was deleted; the master and its rows are untouched.
    ReferenceRemoved {
        /// Deleted header.
        header_id: ChartId,
    },
    /// A master with references was deleted after its lowest-id reference
    /// took over the rows, the remaining references, and download records.
    MasterPromoted {
        /// Deleted header.
        header_id: ChartId,
        /// Header that now owns the rows.
        new_master_id: ChartId,
    },
    /// The last header of a group was deleted together with its rows.
    GroupDeleted {
        /// Deleted header.
        header_id: ChartId,
        /// Number of data rows deleted.
        rows_deleted: u64,
    },
}

/// Result of toggling a group's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToggleResult {
    /// Master of the toggled group.
    pub master_chart_id: ChartId,
    /// Status every header in the group now has.
    pub new_status: ChartStatus,
    /// Number of headers updated.
    pub header_count: usize,
}

/// A consuming device registered to a society.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Machine id.
    pub id: MachineId,
    /// Society the machine collects for.
    pub society_id: SocietyId,
    /// Human-readable machine code.
    pub machine_code: String,
}

/// Whether a machine has fetched the current version of a master chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDownloadRecord {
    /// Machine id.
    pub machine_id: MachineId,
    /// Master chart id.
    pub chart_id: ChartId,
    /// Whether the current version was fetched.
    pub downloaded: bool,
    /// When it was fetched.
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// Download state of one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineDownloadState {
    /// Machine id.
    pub machine_id: MachineId,
    /// Human-readable machine code.
    pub machine_code: String,
    /// Whether the current version was fetched.
    pub downloaded: bool,
    /// When it was fetched.
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// Download progress for one society of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocietyDownloadStatus {
    /// Society id.
    pub society_id: SocietyId,
    /// The society's header in the group.
    pub header_id: ChartId,
    /// Machines registered to the society.
    pub total_machines: usize,
    /// Machines that fetched the current version.
    pub total_downloaded: usize,
    /// Per-machine detail.
    pub machines: Vec<MachineDownloadState>,
}

/// Download progress for a whole chart group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadStatus {
    /// Master chart id.
    pub master_chart_id: ChartId,
    /// Milk channel.
    pub channel: Channel,
    /// Machines across every society in the group.
    pub total_machines: usize,
    /// Machines that fetched the current version.
    pub total_downloaded: usize,
    /// Breakdown by society, ordered by society id.
    pub per_society: Vec<SocietyDownloadStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("COW", Channel::Cow)]
    #[case("buffalo", Channel::Buffalo)]
    #[case(" Mixed ", Channel::Mixed)]
    fn test_channel_from_str(#[case] input: &str, #[case] expected: Channel) {
        assert_eq!(input.parse::<Channel>().unwrap(), expected);
    }

    #[test]
    fn test_channel_from_str_rejects_unknown() {
        assert!(matches!(
            "GOAT".parse::<Channel>(),
            Err(RateChartError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_header_kind_from_nullable_column() {
        assert_eq!(HeaderKind::from_shared_chart_id(None), HeaderKind::Master);
        let kind = HeaderKind::from_shared_chart_id(Some(ChartId::new(4)));
        assert_eq!(
            kind,
            HeaderKind::Reference {
                master_id: ChartId::new(4)
            }
        );
        assert_eq!(kind.shared_chart_id(), Some(ChartId::new(4)));
    }

    #[test]
    fn test_status_toggle() {
        assert_eq!(ChartStatus::Active.toggled(), ChartStatus::Inactive);
        assert_eq!(ChartStatus::Inactive.toggled(), ChartStatus::Active);
        assert!(ChartStatus::Active.is_active());
    }
}
