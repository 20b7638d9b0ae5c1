//! Visibility engine
//!
//! Per-observer diffing between what a creature saw on the last maintenance
//! tick and what it sees now. The previous set lives on the creature as
//! entity keys, guarded by its look-around lock.

use std::collections::HashSet;

use super::creature::Creature;
use super::entity::{Entity, EntityHandle, EntityKey};
use super::store::EntityStore;
use crate::net::message::Notification;

/// Entities that entered and left an observer's view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityDelta {
    pub appear: Vec<EntityHandle>,
    pub disappear: Vec<EntityKey>,
}

impl VisibilityDelta {
    pub fn is_empty(&self) -> bool {
        self.appear.is_empty() && self.disappear.is_empty()
    }

    /// Notifications for the observer's client, empty halves omitted
    pub fn into_notifications(self) -> Vec<Notification> {
        let mut out = Vec::with_capacity(2);
        if !self.appear.is_empty() {
            out.push(Notification::EntitiesAppeared(
                self.appear.iter().map(|e| e.appearance()).collect(),
            ));
        }
        if !self.disappear.is_empty() {
            out.push(Notification::EntitiesDisappeared(self.disappear));
        }
        out
    }
}

/// Everything `observer` currently perceives
///
/// Creatures and items within `range` (minus individually invisible
/// creatures and the observer itself) plus every always-visible prop.
/// Players in a cutscene only see props.
pub fn visible_entities(observer: &Creature, store: &EntityStore, range: i32) -> Vec<EntityHandle> {
    let pos = observer.position();
    let mut result = Vec::new();

    if observer.cutscene().is_none() || !observer.is_player() {
        result.extend(
            store
                .creatures
                .filter(|c| {
                    c.id() != observer.id() && !c.is_invisible() && c.position().in_range(&pos, range)
                })
                .into_iter()
                .map(EntityHandle::Creature),
        );
        result.extend(
            store
                .items_in_range(pos, range)
                .into_iter()
                .map(EntityHandle::Item),
        );
    }

    result.extend(
        store
            .always_visible_props()
            .into_iter()
            .map(EntityHandle::Prop),
    );

    result
}

/// Recompute `observer`'s view and return what changed
///
/// A controller hidden by role-play sees nothing: every previously visible
/// entity disappears and the tracked set is cleared, so the full view is
/// resent once it's back.
pub fn look_around(observer: &Creature, store: &EntityStore, range: i32) -> VisibilityDelta {
    if !observer.is_watching() {
        return VisibilityDelta::default();
    }

    let mut previous = observer.visible.lock();

    if observer.is_role_play_hidden() {
        return VisibilityDelta {
            appear: Vec::new(),
            disappear: previous.drain().collect(),
        };
    }

    let current = visible_entities(observer, store, range);
    let current_keys: HashSet<EntityKey> = current.iter().map(|e| e.key()).collect();

    let appear = current
        .into_iter()
        .filter(|e| !previous.contains(&e.key()))
        .collect();
    let disappear = previous.difference(&current_keys).copied().collect();

    *previous = current_keys;

    VisibilityDelta { appear, disappear }
}
