//! Check-in entity
//!
//! The id is what the attendee's QR code encodes.

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "checkins")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub ticket_detail_id: i32,
    /// RFC 3339, set once the attendee is scanned in
    pub checked_in_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ticket_detail::Entity",
        from = "Column::TicketDetailId",
        to = "super::ticket_detail::Column::Id"
    )]
    TicketDetail,
}

impl Related<super::ticket_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TicketDetail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
