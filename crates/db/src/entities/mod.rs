//! `SeaORM` entity definitions.

pub mod prelude;

pub mod chart_data_rows;
pub mod chart_headers;
pub mod machine_download_records;
pub mod machines;
pub mod sea_orm_active_enums;
pub mod societies;
