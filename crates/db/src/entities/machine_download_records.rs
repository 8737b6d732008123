//! `SeaORM` Entity for machine_download_records table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "machine_download_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub machine_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub chart_id: i64,
    pub downloaded: bool,
    pub downloaded_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::machines::Entity",
        from = "Column::MachineId",
        to = "super::machines::Column::Id"
    )]
    Machines,
    #[sea_orm(
        belongs_to = "super::chart_headers::Entity",
        from = "Column::ChartId",
        to = "super::chart_headers::Column::Id"
    )]
    ChartHeaders,
}

impl Related<super::machines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Machines.def()
    }
}

impl Related<super::chart_headers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChartHeaders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
