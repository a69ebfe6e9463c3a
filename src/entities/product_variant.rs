use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Color-scoped grouping of sellable sizes
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub color: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::size_stock::Entity")]
    SizeStocks,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::size_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SizeStocks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
