//! `SeaORM` Entity for chart_data_rows table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "chart_data_rows")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub chart_id: i64,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub clr: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub fat: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub snf: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub rate: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chart_headers::Entity",
        from = "Column::ChartId",
        to = "super::chart_headers::Column::Id"
    )]
    ChartHeaders,
}

impl Related<super::chart_headers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChartHeaders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
