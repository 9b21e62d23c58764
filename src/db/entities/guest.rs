//! Guest entity (performers, speakers)

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "guests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::guest_schedule::Entity")]
    GuestSchedules,
}

impl Related<super::guest_schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GuestSchedules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
