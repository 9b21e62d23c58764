//! Asset slots and their states.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::db::entities::event;
use crate::error::ServerError;
use crate::storage::folders;

/// A named image field that holds at most one current file path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetSlot {
    /// `events.image_venue`
    ImageVenue,
    /// `events.hero_image`
    HeroImage,
    /// `merchants.logo`
    Logo,
}

impl AssetSlot {
    pub const EVENT_SLOTS: [AssetSlot; 2] = [AssetSlot::ImageVenue, AssetSlot::HeroImage];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetSlot::ImageVenue => "image_venue",
            AssetSlot::HeroImage => "hero_image",
            AssetSlot::Logo => "logo",
        }
    }

    /// Upload folder files for this slot land in
    pub fn folder(&self) -> &'static str {
        match self {
            AssetSlot::ImageVenue | AssetSlot::HeroImage => folders::EVENT,
            AssetSlot::Logo => folders::MERCHANT,
        }
    }

    /// Scope sent along with remote mirror calls
    pub fn scope(&self) -> &'static str {
        self.folder()
    }

    pub fn is_event_slot(&self) -> bool {
        matches!(self, AssetSlot::ImageVenue | AssetSlot::HeroImage)
    }

    /// Current path of this slot on an event row
    pub fn event_path<'a>(&self, event: &'a event::Model) -> Option<&'a str> {
        match self {
            AssetSlot::ImageVenue => event.image_venue.as_deref(),
            AssetSlot::HeroImage => event.hero_image.as_deref(),
            AssetSlot::Logo => None,
        }
    }

    pub fn event_column(&self) -> Option<event::Column> {
        match self {
            AssetSlot::ImageVenue => Some(event::Column::ImageVenue),
            AssetSlot::HeroImage => Some(event::Column::HeroImage),
            AssetSlot::Logo => None,
        }
    }
}

impl fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetSlot {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image_venue" | "venue" => Ok(AssetSlot::ImageVenue),
            "hero_image" | "hero" => Ok(AssetSlot::HeroImage),
            "logo" => Ok(AssetSlot::Logo),
            other => Err(ServerError::InvalidRequest(format!("Unknown asset slot: {}", other))),
        }
    }
}

/// Who a slot belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetOwner {
    Event(i32),
    Merchant(i32),
}

impl fmt::Display for AssetOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetOwner::Event(id) => write!(f, "event {}", id),
            AssetOwner::Merchant(id) => write!(f, "merchant {}", id),
        }
    }
}

/// Observable state of a slot.
///
/// `Orphaned` means the record points at a path with no readable local
/// file. Nothing repairs it automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    Present,
    Orphaned,
}
