//! Creature module
//!
//! Players and NPCs. Cross-entity relations (master, role-play controller
//! and actor, interaction partner) are stored as entity ids and resolved
//! through the owning region, never as live references.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::builder::ActorProfile;
use super::entity::{Entity, EntityAppearance, EntityCore, EntityId, EntityKey, EntityKind};
use super::position::{Location, Position};
use crate::net::session::ClientSession;

bitflags! {
    /// Persistent creature state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreatureStates: u32 {
        const NONE = 0;
        /// Creature finished its initial setup
        const INITIALIZED = 1 << 0;
        /// Friendly NPC, can't be targeted by players
        const GOOD_NPC = 1 << 1;
        /// NPC logged in on demand (role-play actors)
        const INSTANT_NPC = 1 << 2;
        /// Takes part in common PvP
        const ENABLE_COMMON_PVP = 1 << 3;
    }
}

impl Default for CreatureStates {
    fn default() -> Self {
        Self::NONE
    }
}

/// NPC brain hook
pub trait AiController: Send + Sync {
    /// Keep the AI awake for at least `duration_ms`
    fn activate(&self, duration_ms: u64);
}

/// Role-play back-references
///
/// On an actor `controller` is set, on a controller `actor` is set.
/// Only the role-playing session mutates this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolePlayLink {
    pub controller: Option<EntityId>,
    pub actor: Option<EntityId>,
    /// Controller's own body was taken out of its region
    pub hidden: bool,
}

/// Pending movement intents
#[derive(Debug, Default)]
pub struct MovementQueue {
    locked: bool,
    pending: VecDeque<Position>,
}

impl MovementQueue {
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Stop accepting intents and drop whatever is queued
    pub fn lock(&mut self) {
        self.locked = true;
        self.pending.clear();
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A player or NPC
pub struct Creature {
    core: EntityCore,
    name: RwLock<String>,
    is_player: bool,
    master: RwLock<Option<EntityId>>,
    spawn_id: Option<u32>,
    ai: Option<Arc<dyn AiController>>,
    states: RwLock<CreatureStates>,
    invisible: AtomicBool,
    dead: AtomicBool,
    watching: AtomicBool,
    cutscene: RwLock<Option<String>>,
    client: RwLock<Arc<ClientSession>>,
    pub(crate) visible: Mutex<HashSet<EntityKey>>,
    role_play: RwLock<RolePlayLink>,
    movement: Mutex<MovementQueue>,
    interaction: RwLock<Option<EntityId>>,
    profile: RwLock<ActorProfile>,
}

impl Creature {
    /// Create a player creature driven by `session`
    pub fn player(
        id: EntityId,
        name: impl Into<String>,
        location: Location,
        session: Arc<ClientSession>,
    ) -> Self {
        session.add_creature(id);
        session.set_controlling(Some(id));

        let creature = Self::new(id, name.into(), location, true, session);
        creature.watching.store(true, Ordering::SeqCst);
        creature
    }

    /// Create an NPC with no client behind it
    pub fn npc(id: EntityId, name: impl Into<String>, location: Location) -> Self {
        Self::new(
            id,
            name.into(),
            location,
            false,
            Arc::new(ClientSession::disconnected()),
        )
    }

    fn new(
        id: EntityId,
        name: String,
        location: Location,
        is_player: bool,
        client: Arc<ClientSession>,
    ) -> Self {
        Self {
            core: EntityCore::new(id, EntityKind::Creature, location),
            name: RwLock::new(name),
            is_player,
            master: RwLock::new(None),
            spawn_id: None,
            ai: None,
            states: RwLock::new(CreatureStates::default()),
            invisible: AtomicBool::new(false),
            dead: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            cutscene: RwLock::new(None),
            client: RwLock::new(client),
            visible: Mutex::new(HashSet::new()),
            role_play: RwLock::new(RolePlayLink::default()),
            movement: Mutex::new(MovementQueue::default()),
            interaction: RwLock::new(None),
            profile: RwLock::new(ActorProfile::default()),
        }
    }

    /// Tag the creature with the spawn group that respawns it
    pub fn with_spawn_id(mut self, spawn_id: u32) -> Self {
        self.spawn_id = Some(spawn_id);
        self
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiController>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_profile(self, profile: ActorProfile) -> Self {
        *self.profile.write() = profile;
        self
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn is_player(&self) -> bool {
        self.is_player
    }

    pub fn master(&self) -> Option<EntityId> {
        *self.master.read()
    }

    pub fn set_master(&self, master: Option<EntityId>) {
        *self.master.write() = master;
    }

    pub fn spawn_id(&self) -> Option<u32> {
        self.spawn_id
    }

    pub fn ai(&self) -> Option<&Arc<dyn AiController>> {
        self.ai.as_ref()
    }

    pub fn states(&self) -> CreatureStates {
        *self.states.read()
    }

    pub fn has_state(&self, flags: CreatureStates) -> bool {
        self.states.read().contains(flags)
    }

    pub fn activate(&self, flags: CreatureStates) {
        self.states.write().insert(flags);
    }

    pub fn deactivate(&self, flags: CreatureStates) {
        self.states.write().remove(flags);
    }

    /// Individually hidden from other creatures
    pub fn is_invisible(&self) -> bool {
        self.invisible.load(Ordering::SeqCst)
    }

    pub fn set_invisible(&self, invisible: bool) {
        self.invisible.store(invisible, Ordering::SeqCst);
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn set_dead(&self, dead: bool) {
        self.dead.store(dead, Ordering::SeqCst);
    }

    /// Whether the maintenance pass computes visibility for this creature
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    pub fn set_watching(&self, watching: bool) {
        self.watching.store(watching, Ordering::SeqCst);
    }

    pub fn cutscene(&self) -> Option<String> {
        self.cutscene.read().clone()
    }

    pub fn set_cutscene(&self, cutscene: Option<String>) {
        *self.cutscene.write() = cutscene;
    }

    /// Session this creature reports to
    pub fn client(&self) -> Arc<ClientSession> {
        self.client.read().clone()
    }

    pub fn set_client(&self, client: Arc<ClientSession>) {
        *self.client.write() = client;
    }

    pub fn race(&self) -> u32 {
        self.profile.read().race
    }

    pub fn profile(&self) -> ActorProfile {
        self.profile.read().clone()
    }

    pub fn role_play(&self) -> RolePlayLink {
        *self.role_play.read()
    }

    pub(crate) fn role_play_link(&self) -> &RwLock<RolePlayLink> {
        &self.role_play
    }

    /// Creature currently driving this actor
    pub fn controller(&self) -> Option<EntityId> {
        self.role_play.read().controller
    }

    /// Actor this controller is currently driving
    pub fn role_play_actor(&self) -> Option<EntityId> {
        self.role_play.read().actor
    }

    pub fn is_role_playing(&self) -> bool {
        self.role_play_actor().is_some()
    }

    /// Controller whose own body is hidden during role-play
    pub fn is_role_play_hidden(&self) -> bool {
        self.role_play.read().hidden
    }

    /// Queue a movement intent, refused while movement is locked
    pub fn queue_move(&self, to: Position) -> bool {
        let mut movement = self.movement.lock();
        if movement.locked {
            return false;
        }
        movement.pending.push_back(to);
        true
    }

    /// Take all queued movement intents
    pub fn take_moves(&self) -> Vec<Position> {
        self.movement.lock().pending.drain(..).collect()
    }

    pub fn is_movement_locked(&self) -> bool {
        self.movement.lock().locked
    }

    /// Hold the movement-intent lock; role-play transitions run under it
    pub(crate) fn movement(&self) -> MutexGuard<'_, MovementQueue> {
        self.movement.lock()
    }

    /// Entity this creature is currently talking to or trading with
    pub fn interaction(&self) -> Option<EntityId> {
        *self.interaction.read()
    }

    pub fn set_interaction(&self, partner: Option<EntityId>) {
        *self.interaction.write() = partner;
    }

    /// Ids of the entities this creature currently sees
    pub fn visible_entities(&self) -> HashSet<EntityKey> {
        self.visible.lock().clone()
    }
}

impl Entity for Creature {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn appearance(&self) -> EntityAppearance {
        EntityAppearance {
            id: self.id(),
            kind: EntityKind::Creature,
            name: self.name(),
            location: self.location(),
            class_id: self.race(),
            state: if self.is_dead() {
                "dead".to_string()
            } else {
                String::new()
            },
        }
    }
}

impl std::fmt::Debug for Creature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creature")
            .field("id", &format_args!("0x{:016X}", self.id()))
            .field("name", &self.name())
            .field("is_player", &self.is_player)
            .field("location", &self.location())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{NPC_ID_START, PLAYER_ID_START};

    #[test]
    fn test_player_binds_session() {
        let session = Arc::new(ClientSession::disconnected());
        let player = Creature::player(
            PLAYER_ID_START,
            "Tester",
            Location::new(1, 0, 0),
            session.clone(),
        );

        assert!(player.is_player());
        assert!(player.is_watching());
        assert_eq!(session.controlling(), Some(PLAYER_ID_START));
        assert!(session.has_creature(PLAYER_ID_START));
        assert_eq!(player.client().id, session.id);
    }

    #[test]
    fn test_npc_defaults() {
        let npc = Creature::npc(NPC_ID_START, "Tarlach", Location::new(1, 0, 0)).with_spawn_id(4);

        assert!(!npc.is_player());
        assert!(!npc.is_watching());
        assert!(!npc.client().is_connected());
        assert_eq!(npc.spawn_id(), Some(4));
        assert_eq!(npc.name(), "Tarlach");
    }

    #[test]
    fn test_state_flags() {
        let npc = Creature::npc(NPC_ID_START, "", Location::default());
        npc.activate(CreatureStates::INSTANT_NPC | CreatureStates::ENABLE_COMMON_PVP);

        assert!(npc.has_state(CreatureStates::INSTANT_NPC));
        assert!(npc.has_state(CreatureStates::ENABLE_COMMON_PVP));

        npc.deactivate(CreatureStates::INSTANT_NPC);
        assert_eq!(npc.states(), CreatureStates::ENABLE_COMMON_PVP);
    }

    #[test]
    fn test_movement_lock_refuses_intents() {
        let npc = Creature::npc(NPC_ID_START, "", Location::default());
        assert!(npc.queue_move(Position::new(10, 10)));

        npc.movement().lock();
        assert!(npc.is_movement_locked());
        assert!(!npc.queue_move(Position::new(20, 20)));
        assert!(npc.take_moves().is_empty());

        npc.movement().unlock();
        assert!(npc.queue_move(Position::new(30, 30)));
        assert_eq!(npc.take_moves(), vec![Position::new(30, 30)]);
    }
}
