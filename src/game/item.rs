//! Items lying on a region's floor

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Duration, Utc};

use super::entity::{Entity, EntityAppearance, EntityCore, EntityId, EntityKind};
use super::position::Location;

/// Minimum time a dropped item stays on the floor, in seconds
pub const MIN_DROP_LIFETIME_SECS: i64 = 60;

/// An item placed in a region
#[derive(Debug)]
pub struct Item {
    core: EntityCore,
    /// Item class (template) id
    pub class_id: u32,
    amount: AtomicU32,
    /// Shop price, used to scale how long a drop lingers
    pub price: u32,
}

impl Item {
    /// Create a new item
    pub fn new(id: EntityId, class_id: u32, amount: u32, location: Location) -> Self {
        Self::with_price(id, class_id, amount, 0, location)
    }

    /// Create a new item with a known price
    pub fn with_price(
        id: EntityId,
        class_id: u32,
        amount: u32,
        price: u32,
        location: Location,
    ) -> Self {
        Self {
            core: EntityCore::new(id, EntityKind::Item, location),
            class_id,
            amount: AtomicU32::new(amount),
            price,
        }
    }

    pub fn amount(&self) -> u32 {
        self.amount.load(Ordering::SeqCst)
    }

    pub fn set_amount(&self, amount: u32) {
        self.amount.store(amount, Ordering::SeqCst);
    }

    /// How long this item stays on the floor once dropped
    ///
    /// One minute per 100 gold of price, at least one minute.
    pub fn drop_lifetime(&self) -> Duration {
        let secs = ((self.price / 100) as i64 * 60).max(MIN_DROP_LIFETIME_SECS);
        Duration::seconds(secs)
    }

    /// Expiry timestamp for a drop made at `now`
    pub fn drop_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.drop_lifetime()
    }
}

impl Entity for Item {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn name(&self) -> String {
        String::new()
    }

    fn appearance(&self) -> EntityAppearance {
        EntityAppearance {
            id: self.id(),
            kind: EntityKind::Item,
            name: String::new(),
            location: self.location(),
            class_id: self.class_id,
            state: String::new(),
        }
    }
}
