//! Entity re-exports.

pub use super::chart_data_rows::Entity as ChartDataRows;
pub use super::chart_headers::Entity as ChartHeaders;
pub use super::machine_download_records::Entity as MachineDownloadRecords;
pub use super::machines::Entity as Machines;
pub use super::societies::Entity as Societies;
