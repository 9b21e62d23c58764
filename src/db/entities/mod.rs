//! Database entities

pub mod checkin;
pub mod event;
pub mod guest;
pub mod guest_schedule;
pub mod merchant;
pub mod order;
pub mod order_item;
pub mod template;
pub mod ticket;
pub mod ticket_detail;

pub use checkin::Entity as Checkin;
pub use event::Entity as Event;
pub use guest::Entity as Guest;
pub use guest_schedule::Entity as GuestSchedule;
pub use merchant::Entity as Merchant;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use template::Entity as Template;
pub use ticket::Entity as Ticket;
pub use ticket_detail::Entity as TicketDetail;
