//! Actor builder
//!
//! Server-owned actors (role-play NPCs) are assembled by running a fixed
//! sequence of optional hook stages over an [`ActorProfile`]:
//!
//! 1. grant CombatMastery (Novice)
//! 2. `pre_update`, which must set a race
//! 3. race resolution against [`GameData`]
//! 4. `equipment`, then equipment validation
//! 5. `inventory`
//! 6. `skills`
//! 7. `post_update`
//! 8. grant NormalAttack

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::creature::Creature;
use super::entity::EntityId;
use super::position::Location;
use crate::data::GameData;
use crate::error::DataError;
use crate::net::session::ClientSession;
use crate::net::transport::TransportFactory;

/// Race used when a profile's race has no data
pub const HUMAN_RACE: u32 = 10000;

/// Name used when neither npc nor base name is set
pub const UNKNOWN_NAME: &str = "_unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkillId {
    CombatMastery,
    NormalAttack,
    Other(u16),
}

/// Skill ranks, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SkillRank {
    Novice,
    F,
    E,
    D,
    C,
    B,
    A,
    R9,
    R8,
    R7,
    R6,
    R5,
    R4,
    R3,
    R2,
    R1,
}

/// Inventory pockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pocket {
    None,
    Face,
    Hair,
    Armor,
    Glove,
    Shoe,
    Head,
    Robe,
    RightHand,
    LeftHand,
    Accessory1,
    Accessory2,
    Inventory,
    Temporary,
}

impl Pocket {
    /// Whether items in this pocket are worn
    pub fn is_equipment(&self) -> bool {
        !matches!(self, Pocket::None | Pocket::Inventory | Pocket::Temporary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileItem {
    pub item_id: u32,
    pub pocket: Pocket,
    pub colors: [u32; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseStats {
    pub str_: f32,
    pub int: f32,
    pub dex: f32,
    pub will: f32,
    pub luck: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub life_max: f32,
    pub mana_max: f32,
    pub stamina_max: f32,
    pub life: f32,
    pub mana: f32,
    pub stamina: f32,
}

impl Vitals {
    /// Vitals filled to their maximum
    pub fn full(life_max: f32, mana_max: f32, stamina_max: f32) -> Self {
        Self {
            life_max,
            mana_max,
            stamina_max,
            life: life_max,
            mana: mana_max,
            stamina: stamina_max,
        }
    }
}

/// Everything the builder stages configure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    /// 0 until a stage sets it
    pub race: u32,
    pub age: u16,
    pub level: u16,
    pub vitals: Vitals,
    pub stats: BaseStats,
    pub equipment: Vec<ProfileItem>,
    pub inventory: Vec<ProfileItem>,
    pub skills: BTreeMap<SkillId, SkillRank>,
}

impl Default for ActorProfile {
    fn default() -> Self {
        Self {
            race: 0,
            age: 18,
            level: 1,
            vitals: Vitals::full(10.0, 10.0, 10.0),
            stats: BaseStats::default(),
            equipment: Vec::new(),
            inventory: Vec::new(),
            skills: BTreeMap::new(),
        }
    }
}

impl ActorProfile {
    pub fn set_race(&mut self, race: u32) {
        self.race = race;
    }

    pub fn set_level(&mut self, level: u16) {
        self.level = level;
    }

    pub fn set_vitals(&mut self, life_max: f32, mana_max: f32, stamina_max: f32) {
        self.vitals = Vitals::full(life_max, mana_max, stamina_max);
    }

    pub fn set_base_stats(&mut self, str_: f32, int: f32, dex: f32, will: f32, luck: f32) {
        self.stats = BaseStats {
            str_,
            int,
            dex,
            will,
            luck,
        };
    }

    pub fn equip(&mut self, pocket: Pocket, item_id: u32) {
        self.equipment.push(ProfileItem {
            item_id,
            pocket,
            colors: [0x808080; 3],
        });
    }

    pub fn give_item(&mut self, item_id: u32) {
        self.inventory.push(ProfileItem {
            item_id,
            pocket: Pocket::Inventory,
            colors: [0x808080; 3],
        });
    }

    /// Grant a skill up to `rank`, never lowering an existing rank
    pub fn give_skill(&mut self, skill: SkillId, rank: SkillRank) {
        let entry = self.skills.entry(skill).or_insert(rank);
        if *entry < rank {
            *entry = rank;
        }
    }

    pub fn skill(&self, skill: SkillId) -> Option<SkillRank> {
        self.skills.get(&skill).copied()
    }
}

/// A builder stage
pub type Hook = Box<dyn Fn(&mut ActorProfile) + Send + Sync>;

/// Assembles server-owned actors
#[derive(Default)]
pub struct ActorBuilder {
    npc_name: String,
    base_name: String,
    pre_update: Option<Hook>,
    equipment: Option<Hook>,
    inventory: Option<Hook>,
    skills: Option<Hook>,
    post_update: Option<Hook>,
}

impl ActorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn npc_name(mut self, name: impl Into<String>) -> Self {
        self.npc_name = name.into();
        self
    }

    pub fn base_name(mut self, name: impl Into<String>) -> Self {
        self.base_name = name.into();
        self
    }

    pub fn on_pre_update(mut self, hook: impl Fn(&mut ActorProfile) + Send + Sync + 'static) -> Self {
        self.pre_update = Some(Box::new(hook));
        self
    }

    pub fn on_equipment_update(
        mut self,
        hook: impl Fn(&mut ActorProfile) + Send + Sync + 'static,
    ) -> Self {
        self.equipment = Some(Box::new(hook));
        self
    }

    pub fn on_inventory_update(
        mut self,
        hook: impl Fn(&mut ActorProfile) + Send + Sync + 'static,
    ) -> Self {
        self.inventory = Some(Box::new(hook));
        self
    }

    pub fn on_skills_update(
        mut self,
        hook: impl Fn(&mut ActorProfile) + Send + Sync + 'static,
    ) -> Self {
        self.skills = Some(Box::new(hook));
        self
    }

    pub fn on_post_update(
        mut self,
        hook: impl Fn(&mut ActorProfile) + Send + Sync + 'static,
    ) -> Self {
        self.post_update = Some(Box::new(hook));
        self
    }

    /// Combined display name
    pub fn name(&self) -> String {
        match (self.npc_name.is_empty(), self.base_name.is_empty()) {
            (true, true) => UNKNOWN_NAME.to_string(),
            (_, true) => self.npc_name.clone(),
            (true, false) => self.base_name.clone(),
            (false, false) => format!(
                "{} ({})",
                self.npc_name.trim_start_matches('_'),
                self.base_name
            ),
        }
    }

    /// Run every stage and return the finished profile
    pub fn build_profile(&self, data: &GameData) -> Result<ActorProfile, DataError> {
        let mut profile = ActorProfile::default();

        profile.give_skill(SkillId::CombatMastery, SkillRank::Novice);

        run(&self.pre_update, &mut profile);
        profile.race = resolve_race(profile.race, data)?;

        run(&self.equipment, &mut profile);
        profile.equipment.retain(|item| {
            if !item.pocket.is_equipment() {
                error!(item_id = item.item_id, pocket = ?item.pocket, "Equipment set in a non-equipment pocket, dropping");
                return false;
            }
            if data.item(item.item_id).is_none() {
                error!(item_id = item.item_id, "Unknown equipment item, dropping");
                return false;
            }
            true
        });

        run(&self.inventory, &mut profile);
        run(&self.skills, &mut profile);
        run(&self.post_update, &mut profile);

        profile.give_skill(SkillId::NormalAttack, SkillRank::Novice);

        Ok(profile)
    }

    /// Build an NPC creature with a disconnected session
    pub fn build(
        &self,
        id: EntityId,
        location: Location,
        data: &GameData,
        transports: &dyn TransportFactory,
    ) -> Result<Creature, DataError> {
        let profile = self.build_profile(data)?;
        let name = self.name();

        debug!(id = id, name = %name, race = profile.race, "Actor built");

        let creature = Creature::npc(id, name, location).with_profile(profile);
        creature.set_client(Arc::new(ClientSession::new(transports.create_disconnected())));
        Ok(creature)
    }
}

fn run(hook: &Option<Hook>, profile: &mut ActorProfile) {
    if let Some(hook) = hook {
        hook(profile);
    }
}

fn resolve_race(race: u32, data: &GameData) -> Result<u32, DataError> {
    if race == 0 {
        return Err(DataError::RaceNotSet);
    }

    if data.race(race).is_some() {
        return Ok(race);
    }

    if data.race(HUMAN_RACE).is_some() {
        warn!(race = race, "Race not found, using human instead");
        return Ok(HUMAN_RACE);
    }

    Err(DataError::UnknownRace(race))
}
