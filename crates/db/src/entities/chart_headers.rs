//! `SeaORM` Entity for chart_headers table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{ChartStatus, MilkChannel};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "chart_headers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub society_id: i64,
    pub channel: MilkChannel,
    pub status: ChartStatus,
    pub shared_chart_id: Option<i64>,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTimeWithTimeZone,
    pub record_count: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::societies::Entity",
        from = "Column::SocietyId",
        to = "super::societies::Column::Id"
    )]
    Societies,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::SharedChartId",
        to = "Column::Id"
    )]
    SharedChart,
    #[sea_orm(has_many = "super::chart_data_rows::Entity")]
    ChartDataRows,
    #[sea_orm(has_many = "super::machine_download_records::Entity")]
    MachineDownloadRecords,
}

impl Related<super::societies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Societies.def()
    }
}

impl Related<super::chart_data_rows::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChartDataRows.def()
    }
}

impl Related<super::machine_download_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MachineDownloadRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
