use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "photos")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub uuid: String,

    pub album_id: i32,

    /// Denormalized owner, kept alongside `album_id` so authorization checks
    /// never need a join.
    pub user_id: i32,

    /// Path of the stored original, exact uploaded bytes.
    pub file_path: String,

    pub original_name: String,

    pub mime: String,

    pub size_bytes: i64,

    pub width: i32,

    pub height: i32,

    /// Optional caption.
    pub description: Option<String>,

    pub uploaded_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
