use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "albums")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Opaque, filesystem-safe identifier (the anonymous default album uses
    /// the literal `default` when it is still free).
    #[sea_orm(unique)]
    pub uuid: String,

    pub user_id: i32,

    pub name: String,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
