//! Image assets attached to events and merchants.

mod file;
mod guard;
mod slot;
mod sync;

pub use file::{content_type_for, UploadFile};
pub use slot::AssetSlot;
pub use sync::{AssetSync, Mirror};
