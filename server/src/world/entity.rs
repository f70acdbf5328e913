use std::net::SocketAddr;

use crate::{
    config::Region,
    geometry::{BoundingBox, Direction, Position},
    id::Id,
    item::ItemType,
    tick::{Tick, TickDuration},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Player,
    Mob,
    Projectile,
    Obstacle,
}

impl EntityKind {
    pub fn wire_tag(&self) -> u8 {
        match self {
            EntityKind::Player => 0,
            EntityKind::Mob => 1,
            EntityKind::Projectile => 2,
            EntityKind::Obstacle => 3,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<EntityKind> {
        match tag {
            0 => Some(EntityKind::Player),
            1 => Some(EntityKind::Mob),
            2 => Some(EntityKind::Projectile),
            3 => Some(EntityKind::Obstacle),
            _ => None,
        }
    }

    pub fn is_combatant(&self) -> bool {
        matches!(self, EntityKind::Player | EntityKind::Mob)
    }
}

/// `(kind, id)` pair under which an entity lives in the store and the spatial index.
/// Ordered so that scans over a query result are deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Player(Id<Player>),
    Mob(Id<Mob>),
    Projectile(Id<Projectile>),
    Obstacle(Id<Obstacle>),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Player(_) => EntityKind::Player,
            EntityKey::Mob(_) => EntityKind::Mob,
            EntityKey::Projectile(_) => EntityKind::Projectile,
            EntityKey::Obstacle(_) => EntityKind::Obstacle,
        }
    }
}

/// Attack state shared by players and mobs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CombatState {
    pub attacking_direction: Direction,
    pub is_attacking: bool,
    pub last_attack: Tick,
    /// `None` until the first attack, so a fresh combatant is never on cooldown.
    pub cooldown: Option<TickDuration>,
}

impl CombatState {
    pub fn is_on_cooldown(&self, now: Tick) -> bool {
        match self.cooldown {
            Some(cooldown) => now.since(self.last_attack) < cooldown,
            None => false,
        }
    }

    pub fn start_cooldown(&mut self, now: Tick, cooldown: TickDuration) {
        self.last_attack = now;
        self.cooldown = Some(cooldown);
    }
}

/// Read/write access to the parts of a player or mob the combat rules touch.
/// Position stays read-only here; it only changes through the entity store.
pub trait Combatant {
    fn key(&self) -> EntityKey;
    fn position(&self) -> Position;
    fn combat(&self) -> &CombatState;
    fn combat_mut(&mut self) -> &mut CombatState;
    fn health(&self) -> i32;
    fn take_damage(&mut self, damage: i32) -> i32;
}

#[derive(Clone, Debug)]
pub struct Player {
    pub id: Id<Player>,
    pub address: Option<SocketAddr>,
    pub(super) position: Position,
    pub direction: Direction,
    pub combat: CombatState,
    pub health: i32,
    pub last_applied_sequence: Option<u32>,
    pub inventory: Vec<Option<ItemType>>,
    pub selected_slot: usize,
    pub chat: Vec<String>,
}

impl Player {
    pub fn new(
        id: Id<Player>,
        address: Option<SocketAddr>,
        position: Position,
        health: i32,
        inventory_size: usize,
        starting_items: &[ItemType],
    ) -> Player {
        let mut inventory = vec![None; inventory_size];
        for (slot, item) in inventory.iter_mut().zip(starting_items) {
            *slot = Some(*item);
        }
        Player {
            id,
            address,
            position,
            direction: Direction::zero(),
            combat: CombatState::default(),
            health,
            last_applied_sequence: None,
            inventory,
            selected_slot: 0,
            chat: Vec::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn selected_item(&self) -> Option<ItemType> {
        self.inventory.get(self.selected_slot).copied().flatten()
    }
}

impl Combatant for Player {
    fn key(&self) -> EntityKey {
        EntityKey::Player(self.id)
    }

    fn position(&self) -> Position {
        self.position
    }

    fn combat(&self) -> &CombatState {
        &self.combat
    }

    fn combat_mut(&mut self) -> &mut CombatState {
        &mut self.combat
    }

    fn health(&self) -> i32 {
        self.health
    }

    fn take_damage(&mut self, damage: i32) -> i32 {
        self.health -= damage;
        self.health
    }
}

#[derive(Clone, Debug)]
pub struct Mob {
    pub id: Id<Mob>,
    pub(super) position: Position,
    pub direction: Direction,
    pub combat: CombatState,
    pub health: i32,
    pub weapon: ItemType,
    pub is_tracking_player: bool,
}

impl Mob {
    pub fn new(id: Id<Mob>, position: Position, health: i32, weapon: ItemType) -> Mob {
        Mob {
            id,
            position,
            direction: Direction::zero(),
            combat: CombatState::default(),
            health,
            weapon,
            is_tracking_player: false,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

impl Combatant for Mob {
    fn key(&self) -> EntityKey {
        EntityKey::Mob(self.id)
    }

    fn position(&self) -> Position {
        self.position
    }

    fn combat(&self) -> &CombatState {
        &self.combat
    }

    fn combat_mut(&mut self) -> &mut CombatState {
        &mut self.combat
    }

    fn health(&self) -> i32 {
        self.health
    }

    fn take_damage(&mut self, damage: i32) -> i32 {
        self.health -= damage;
        self.health
    }
}

/// Damage travels with the projectile; who fired it no longer matters once spawned.
#[derive(Clone, Debug)]
pub struct Projectile {
    pub id: Id<Projectile>,
    pub(super) position: Position,
    pub direction: Direction,
    pub damage: i32,
    pub time_to_live: u32,
}

impl Projectile {
    pub fn new(
        id: Id<Projectile>,
        position: Position,
        direction: Direction,
        damage: i32,
        time_to_live: u32,
    ) -> Projectile {
        Projectile { id, position, direction, damage, time_to_live }
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

/// Static world geometry. Never moves and never shows up in gameplay queries.
#[derive(Clone, Debug)]
pub struct Obstacle {
    pub id: Id<Obstacle>,
    pub(super) position: Position,
    /// Edges relative to `position`, so odd sizes survive exactly.
    footprint: BoundingBox,
}

impl Obstacle {
    pub fn new(id: Id<Obstacle>, region: Region) -> Obstacle {
        let bbox = region.bbox();
        let position = Position::new(
            bbox.x_min + (bbox.x_max - bbox.x_min) / 2,
            bbox.y_min + (bbox.y_max - bbox.y_min) / 2,
        );
        let footprint = BoundingBox::new(
            bbox.x_min - position.x,
            bbox.y_min - position.y,
            bbox.x_max - position.x,
            bbox.y_max - position.y,
        );
        Obstacle { id, position, footprint }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn bbox(&self) -> BoundingBox {
        let Position { x, y } = self.position;
        BoundingBox::new(
            x.saturating_add(self.footprint.x_min),
            y.saturating_add(self.footprint.y_min),
            x.saturating_add(self.footprint.x_max),
            y.saturating_add(self.footprint.y_max),
        )
    }
}

/// Owned entity record, used when adding to or removing from the store.
#[derive(Clone, Debug)]
pub enum Entity {
    Player(Player),
    Mob(Mob),
    Projectile(Projectile),
    Obstacle(Obstacle),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Player(player) => EntityKey::Player(player.id),
            Entity::Mob(mob) => EntityKey::Mob(mob.id),
            Entity::Projectile(projectile) => EntityKey::Projectile(projectile.id),
            Entity::Obstacle(obstacle) => EntityKey::Obstacle(obstacle.id),
        }
    }

    pub fn view(&self) -> EntityRef<'_> {
        match self {
            Entity::Player(player) => EntityRef::Player(player),
            Entity::Mob(mob) => EntityRef::Mob(mob),
            Entity::Projectile(projectile) => EntityRef::Projectile(projectile),
            Entity::Obstacle(obstacle) => EntityRef::Obstacle(obstacle),
        }
    }
}

impl From<Player> for Entity {
    fn from(player: Player) -> Self {
        Entity::Player(player)
    }
}

impl From<Mob> for Entity {
    fn from(mob: Mob) -> Self {
        Entity::Mob(mob)
    }
}

impl From<Projectile> for Entity {
    fn from(projectile: Projectile) -> Self {
        Entity::Projectile(projectile)
    }
}

impl From<Obstacle> for Entity {
    fn from(obstacle: Obstacle) -> Self {
        Entity::Obstacle(obstacle)
    }
}

/// Borrowed view of any live entity.
#[derive(Clone, Copy, Debug)]
pub enum EntityRef<'a> {
    Player(&'a Player),
    Mob(&'a Mob),
    Projectile(&'a Projectile),
    Obstacle(&'a Obstacle),
}

impl<'a> EntityRef<'a> {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityRef::Player(player) => EntityKey::Player(player.id),
            EntityRef::Mob(mob) => EntityKey::Mob(mob.id),
            EntityRef::Projectile(projectile) => EntityKey::Projectile(projectile.id),
            EntityRef::Obstacle(obstacle) => EntityKey::Obstacle(obstacle.id),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.key().kind()
    }

    pub fn position(&self) -> Position {
        match self {
            EntityRef::Player(player) => player.position,
            EntityRef::Mob(mob) => mob.position,
            EntityRef::Projectile(projectile) => projectile.position,
            EntityRef::Obstacle(obstacle) => obstacle.position,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            EntityRef::Player(player) => player.direction,
            EntityRef::Mob(mob) => mob.direction,
            EntityRef::Projectile(projectile) => projectile.direction,
            EntityRef::Obstacle(_) => Direction::zero(),
        }
    }

    pub fn is_attacking(&self) -> bool {
        match self {
            EntityRef::Player(player) => player.combat.is_attacking,
            EntityRef::Mob(mob) => mob.combat.is_attacking,
            _ => false,
        }
    }

    /// Weapon a mob carries or item a player holds, for display.
    pub fn held_item(&self) -> Option<ItemType> {
        match self {
            EntityRef::Player(player) => player.selected_item(),
            EntityRef::Mob(mob) => Some(mob.weapon),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_combatant_is_not_on_cooldown() {
        let state = CombatState::default();
        assert!(!state.is_on_cooldown(Tick::zero()));
    }

    #[test]
    fn cooldown_expires_after_its_duration() {
        let mut state = CombatState::default();
        state.start_cooldown(Tick::zero(), TickDuration::from_ticks(3));
        assert!(state.is_on_cooldown(Tick::zero() + TickDuration::from_ticks(2)));
        assert!(!state.is_on_cooldown(Tick::zero() + TickDuration::from_ticks(3)));
    }

    #[test]
    fn new_player_fills_leading_slots() {
        let player =
            Player::new(Id::new(1), None, Position::new(0, 0), 100, 4, &[ItemType(7), ItemType(8)]);
        assert_eq!(player.inventory, vec![Some(ItemType(7)), Some(ItemType(8)), None, None]);
        assert_eq!(player.selected_item(), Some(ItemType(7)));
    }

    #[test]
    fn obstacle_keeps_its_region_exactly() {
        let region = Region { x: 10, y: 20, width: 101, height: 51 };
        let obstacle = Obstacle::new(Id::new(0), region);
        assert_eq!(obstacle.bbox(), region.bbox());
        assert_eq!(obstacle.bbox(), BoundingBox::new(10, 20, 111, 71));
        assert_eq!(obstacle.position(), Position::new(60, 45));
    }

    #[test]
    fn keys_order_by_kind_then_id() {
        let mut keys = vec![
            EntityKey::Mob(Id::new(1)),
            EntityKey::Player(Id::new(5)),
            EntityKey::Player(Id::new(2)),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                EntityKey::Player(Id::new(2)),
                EntityKey::Player(Id::new(5)),
                EntityKey::Mob(Id::new(1)),
            ]
        );
    }
}
