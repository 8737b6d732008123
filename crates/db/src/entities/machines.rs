//! `SeaORM` Entity for machines table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "machines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub society_id: i64,
    pub machine_code: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::societies::Entity",
        from = "Column::SocietyId",
        to = "super::societies::Column::Id"
    )]
    Societies,
    #[sea_orm(has_many = "super::machine_download_records::Entity")]
    MachineDownloadRecords,
}

impl Related<super::societies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Societies.def()
    }
}

impl Related<super::machine_download_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MachineDownloadRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
