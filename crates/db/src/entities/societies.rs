//! `SeaORM` Entity for societies table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "societies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::machines::Entity")]
    Machines,
    #[sea_orm(has_many = "super::chart_headers::Entity")]
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
