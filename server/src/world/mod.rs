//! Entity store: every live entity, grouped by kind, kept in lockstep with the
//! spatial index. Positions can only change through [`EntityStore::move_to`].

pub mod entity;
mod spatial;

use std::collections::HashMap;

use log::{error, info};
use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

use crate::{
    config::WorldConfig,
    geometry::{BoundingBox, Position},
    id::{Id, IdMap, IdSource},
};

use entity::{
    Combatant, Entity, EntityKey, EntityKind, EntityRef, Mob, Obstacle, Player, Projectile,
};
use spatial::SpatialIndex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0:?} is already in the store")]
    DuplicateId(EntityKey),

    #[error("{0:?} is not in the store")]
    Missing(EntityKey),

    #[error("no free {kind:?} spawn position after {attempts} attempts")]
    SpawnExhausted { kind: EntityKind, attempts: u32 },

    #[error("spawn region is smaller than a {0:?}")]
    SpawnRegionTooSmall(EntityKind),
}

/// Box sizes for the kinds whose footprint is fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub player: (i32, i32),
    pub mob: (i32, i32),
    pub projectile: (i32, i32),
}

impl Dimensions {
    pub fn from_config(config: &WorldConfig) -> Dimensions {
        Dimensions {
            player: config.dimensions(EntityKind::Player),
            mob: config.dimensions(EntityKind::Mob),
            projectile: config.dimensions(EntityKind::Projectile),
        }
    }

    pub fn of(&self, kind: EntityKind) -> (i32, i32) {
        match kind {
            EntityKind::Player => self.player,
            EntityKind::Mob => self.mob,
            EntityKind::Projectile => self.projectile,
            EntityKind::Obstacle => (0, 0),
        }
    }
}

#[derive(Debug)]
pub struct EntityStore {
    dimensions: Dimensions,
    players: IdMap<Player>,
    mobs: IdMap<Mob>,
    projectiles: IdMap<Projectile>,
    obstacles: IdMap<Obstacle>,
    index: SpatialIndex,
    mob_ids: IdSource<Mob>,
    projectile_ids: IdSource<Projectile>,
    obstacle_ids: IdSource<Obstacle>,
}

impl EntityStore {
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            players: HashMap::new(),
            mobs: HashMap::new(),
            projectiles: HashMap::new(),
            obstacles: HashMap::new(),
            index: SpatialIndex::new(),
            mob_ids: IdSource::new(0),
            projectile_ids: IdSource::new(0),
            obstacle_ids: IdSource::new(0),
        }
    }

    pub fn next_mob_id(&mut self) -> Id<Mob> {
        self.mob_ids.next()
    }

    pub fn next_projectile_id(&mut self) -> Id<Projectile> {
        self.projectile_ids.next()
    }

    pub fn next_obstacle_id(&mut self) -> Id<Obstacle> {
        self.obstacle_ids.next()
    }

    pub fn player(&self, id: Id<Player>) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: Id<Player>) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn mob(&self, id: Id<Mob>) -> Option<&Mob> {
        self.mobs.get(&id)
    }

    pub fn mob_mut(&mut self, id: Id<Mob>) -> Option<&mut Mob> {
        self.mobs.get_mut(&id)
    }

    pub fn projectile(&self, id: Id<Projectile>) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn projectile_mut(&mut self, id: Id<Projectile>) -> Option<&mut Projectile> {
        self.projectiles.get_mut(&id)
    }

    pub fn get(&self, key: EntityKey) -> Option<EntityRef<'_>> {
        match key {
            EntityKey::Player(id) => self.players.get(&id).map(EntityRef::Player),
            EntityKey::Mob(id) => self.mobs.get(&id).map(EntityRef::Mob),
            EntityKey::Projectile(id) => self.projectiles.get(&id).map(EntityRef::Projectile),
            EntityKey::Obstacle(id) => self.obstacles.get(&id).map(EntityRef::Obstacle),
        }
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.get(key).is_some()
    }

    pub fn combatant_mut(&mut self, key: EntityKey) -> Option<&mut dyn Combatant> {
        match key {
            EntityKey::Player(id) => self.players.get_mut(&id).map(|p| p as &mut dyn Combatant),
            EntityKey::Mob(id) => self.mobs.get_mut(&id).map(|m| m as &mut dyn Combatant),
            _ => None,
        }
    }

    /// Ids in ascending order, so per-tick scans visit entities deterministically.
    pub fn player_ids(&self) -> Vec<Id<Player>> {
        sorted_ids(&self.players)
    }

    pub fn mob_ids(&self) -> Vec<Id<Mob>> {
        sorted_ids(&self.mobs)
    }

    pub fn projectile_ids(&self) -> Vec<Id<Projectile>> {
        sorted_ids(&self.projectiles)
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len() + self.mobs.len() + self.projectiles.len() + self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bbox_at(&self, kind: EntityKind, position: Position) -> BoundingBox {
        let (width, height) = self.dimensions.of(kind);
        BoundingBox::centered(position, width, height)
    }

    fn bbox_of(&self, entity: EntityRef<'_>) -> BoundingBox {
        match entity {
            EntityRef::Obstacle(obstacle) => obstacle.bbox(),
            other => self.bbox_at(other.kind(), other.position()),
        }
    }

    /// Current box of a live entity.
    pub fn bbox(&self, key: EntityKey) -> Option<BoundingBox> {
        self.get(key).map(|entity| self.bbox_of(entity))
    }

    /// Inserts into the per-kind map and the spatial index at the entity's current position.
    pub fn add(&mut self, entity: impl Into<Entity>) -> Result<EntityKey, StoreError> {
        let entity = entity.into();
        let key = entity.key();
        if self.contains(key) {
            error!("Double add of {:?}", key);
            return Err(StoreError::DuplicateId(key));
        }
        let bbox = self.bbox_of(entity.view());
        match entity {
            Entity::Player(player) => {
                self.players.insert(player.id, player);
            }
            Entity::Mob(mob) => {
                self.mobs.insert(mob.id, mob);
            }
            Entity::Projectile(projectile) => {
                self.projectiles.insert(projectile.id, projectile);
            }
            Entity::Obstacle(obstacle) => {
                self.obstacles.insert(obstacle.id, obstacle);
            }
        }
        self.index.insert(key, bbox);
        Ok(key)
    }

    /// Deletes from the per-kind map and the spatial index. The index entry is
    /// found through the stored position, which nothing outside this module can change.
    pub fn remove(&mut self, key: EntityKey) -> Result<Entity, StoreError> {
        let bbox = self.bbox(key).ok_or(StoreError::Missing(key))?;
        let removed = match key {
            EntityKey::Player(id) => self.players.remove(&id).map(Entity::Player),
            EntityKey::Mob(id) => self.mobs.remove(&id).map(Entity::Mob),
            EntityKey::Projectile(id) => self.projectiles.remove(&id).map(Entity::Projectile),
            EntityKey::Obstacle(id) => self.obstacles.remove(&id).map(Entity::Obstacle),
        }
        .ok_or(StoreError::Missing(key))?;
        if !self.index.remove(key, bbox) {
            error!("Spatial index had no entry for removed {:?}", key);
        }
        Ok(removed)
    }

    /// Removes the old box, updates the position and inserts the new box as one step.
    pub fn move_to(&mut self, key: EntityKey, to: Position) -> Result<(), StoreError> {
        let from = self.bbox(key).ok_or(StoreError::Missing(key))?;
        let slot = match key {
            EntityKey::Player(id) => self.players.get_mut(&id).map(|p| &mut p.position),
            EntityKey::Mob(id) => self.mobs.get_mut(&id).map(|m| &mut m.position),
            EntityKey::Projectile(id) => self.projectiles.get_mut(&id).map(|p| &mut p.position),
            EntityKey::Obstacle(id) => self.obstacles.get_mut(&id).map(|o| &mut o.position),
        }
        .ok_or(StoreError::Missing(key))?;
        if *slot == to {
            return Ok(());
        }
        *slot = to;
        if !self.index.remove(key, from) {
            error!("Spatial index had no entry for moved {:?}", key);
        }
        let to_box = self.bbox(key).ok_or(StoreError::Missing(key))?;
        self.index.insert(key, to_box);
        Ok(())
    }

    /// Keys whose box intersects `bbox`, obstacles excluded, ascending.
    pub fn query_keys(
        &self,
        bbox: &BoundingBox,
        predicate: impl Fn(EntityKey) -> bool,
    ) -> Vec<EntityKey> {
        let mut keys = self
            .index
            .intersect(bbox)
            .into_iter()
            .filter(|key| key.kind() != EntityKind::Obstacle && predicate(*key))
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Entities whose box intersects `bbox` and which satisfy `predicate`.
    /// Obstacles are boundary geometry and never show up here.
    pub fn query<'a>(
        &'a self,
        bbox: &BoundingBox,
        predicate: impl Fn(EntityKey) -> bool,
    ) -> std::vec::IntoIter<EntityRef<'a>> {
        self.query_keys(bbox, predicate)
            .into_iter()
            .filter_map(|key| {
                let entity = self.get(key);
                if entity.is_none() {
                    error!("Spatial index returned {:?} which is not in the store", key);
                }
                entity
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// True when `bbox` touches any entity other than `except` for which `blocks` holds,
    /// obstacles included.
    pub fn is_blocked(
        &self,
        bbox: &BoundingBox,
        except: Option<EntityKey>,
        blocks: impl Fn(EntityKind) -> bool,
    ) -> bool {
        self.index
            .intersect(bbox)
            .into_iter()
            .any(|key| Some(key) != except && blocks(key.kind()))
    }

    /// Samples positions inside `region` until a `kind`-sized box fits without
    /// touching anything in the index.
    pub fn generate_spawn_position(
        &self,
        kind: EntityKind,
        region: &BoundingBox,
        attempts: u32,
        rng: &mut impl Rng,
    ) -> Result<Position, StoreError> {
        let (width, height) = self.dimensions.of(kind);
        let (half_w, half_h) = (width / 2, height / 2);
        let (x_lo, x_hi) = (region.x_min + half_w, region.x_max - half_w);
        let (y_lo, y_hi) = (region.y_min + half_h, region.y_max - half_h);
        if x_lo > x_hi || y_lo > y_hi {
            return Err(StoreError::SpawnRegionTooSmall(kind));
        }
        for _ in 0..attempts {
            let candidate = Position::new(rng.gen_range(x_lo..=x_hi), rng.gen_range(y_lo..=y_hi));
            if self.index.intersect(&self.bbox_at(kind, candidate)).is_empty() {
                return Ok(candidate);
            }
        }
        Err(StoreError::SpawnExhausted { kind, attempts })
    }

    /// Number of entries in the spatial index; equals [`EntityStore::len`] while the
    /// store is consistent.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }
}

fn sorted_ids<T>(map: &IdMap<T>) -> Vec<Id<T>> {
    let mut ids = map.keys().copied().collect::<Vec<_>>();
    ids.sort();
    ids
}

/// Materializes configured obstacles and the initial mob batch. A full spawn
/// region cuts the batch short rather than failing startup.
pub fn populate(store: &mut EntityStore, config: &WorldConfig, rng: &mut impl Rng) -> usize {
    for region in &config.obstacles {
        let id = store.next_obstacle_id();
        if let Err(err) = store.add(Obstacle::new(id, *region)) {
            error!("Obstacle {}: {}", id, err);
        }
    }

    let spawn_region = config.spawn_region.bbox();
    let mut spawned = 0;
    for _ in 0..config.mob_count {
        let position = match store.generate_spawn_position(
            EntityKind::Mob,
            &spawn_region,
            config.spawn_attempts,
            rng,
        ) {
            Ok(position) => position,
            Err(err) => {
                error!("Mob spawn stopped after {} mobs: {}", spawned, err);
                break;
            }
        };
        let Some(weapon) = config.mob_weapons.choose(rng).copied() else {
            break;
        };
        let id = store.next_mob_id();
        match store.add(Mob::new(id, position, config.mob_health, weapon)) {
            Ok(_) => spawned += 1,
            Err(err) => error!("Mob {}: {}", id, err),
        }
    }
    info!("Spawned {} obstacles and {} mobs", config.obstacles.len(), spawned);
    spawned
}
