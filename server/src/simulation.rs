//! One fixed-period step of everything the server drives on its own:
//! projectiles fly and expire, mobs chase and attack the nearest player.

use log::{error, warn};
use thiserror::Error;

use crate::{
    combat::{self, CombatError},
    config::GameRules,
    game_state::GameState,
    geometry::Direction,
    id::Id,
    world::{
        entity::{EntityKey, EntityKind, Mob, Projectile},
        EntityStore, StoreError,
    },
};

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Combat(#[from] CombatError),
}

/// What happened to a projectile during its step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProjectileFate {
    Flying,
    Expired,
    Hit(EntityKey),
    LeftWorld,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub expired: usize,
    pub hits: Vec<EntityKey>,
    pub faults: usize,
}

/// Advances the world by one tick. A fault in one entity is logged and skipped;
/// it never stops the rest of the tick.
pub fn run_tick(state: &mut GameState, rules: &GameRules) -> TickReport {
    state.now = state.now.increase();
    let mut report = TickReport::default();
    clear_attack_flags(&mut state.store);

    let mut finished = Vec::new();
    for id in state.store.projectile_ids() {
        match step_projectile(&mut state.store, rules, id) {
            Ok(ProjectileFate::Flying) => (),
            Ok(ProjectileFate::Expired | ProjectileFate::LeftWorld) => {
                report.expired += 1;
                finished.push(id);
            }
            Ok(ProjectileFate::Hit(target)) => {
                report.hits.push(target);
                finished.push(id);
            }
            Err(err) => {
                error!("Projectile {} skipped this tick: {}", id, err);
                report.faults += 1;
            }
        }
    }
    for id in finished {
        if let Err(err) = state.store.remove(EntityKey::Projectile(id)) {
            warn!("Finished projectile {} already gone: {}", id, err);
        }
    }

    for id in state.store.mob_ids() {
        if let Err(err) = step_mob(state, rules, id) {
            error!("Mob {} skipped this tick: {}", id, err);
            report.faults += 1;
        }
    }
    report
}

fn clear_attack_flags(store: &mut EntityStore) {
    for player in store.players_mut() {
        player.combat.is_attacking = false;
    }
    for id in store.mob_ids() {
        if let Some(mob) = store.mob_mut(id) {
            mob.combat.is_attacking = false;
        }
    }
}

fn step_projectile(
    store: &mut EntityStore,
    rules: &GameRules,
    id: Id<Projectile>,
) -> Result<ProjectileFate, SimError> {
    let key = EntityKey::Projectile(id);
    let projectile = store.projectile_mut(id).ok_or(StoreError::Missing(key))?;
    projectile.time_to_live = projectile.time_to_live.saturating_sub(1);
    if projectile.time_to_live == 0 {
        return Ok(ProjectileFate::Expired);
    }
    let (position, direction, damage) =
        (projectile.position(), projectile.direction, projectile.damage);

    let bbox = store.bbox(key).ok_or(StoreError::Missing(key))?;
    if let Some(target) = store.query_keys(&bbox, |other| other.kind().is_combatant()).first() {
        combat::apply_damage(store, rules, *target, damage)?;
        return Ok(ProjectileFate::Hit(*target));
    }

    let next = position.offset(direction, rules.config.projectile_speed as f32);
    if !rules.config.world_bounds().intersects(&store.bbox_at(EntityKind::Projectile, next)) {
        return Ok(ProjectileFate::LeftWorld);
    }
    store.move_to(key, next)?;
    Ok(ProjectileFate::Flying)
}

fn step_mob(state: &mut GameState, rules: &GameRules, id: Id<Mob>) -> Result<(), SimError> {
    let config = &rules.config;
    let key = EntityKey::Mob(id);
    let GameState { store, now, .. } = state;
    let Some(mob) = store.mob(id) else {
        return Ok(());
    };
    let (position, weapon_item) = (mob.position(), mob.weapon);
    let weapon = rules.items.weapon(weapon_item).ok_or(CombatError::UnknownWeapon(weapon_item))?;

    let nearest = store
        .query(&config.sight_box(position), |other| other.kind() == EntityKind::Player)
        .map(|player| {
            (position.distance_squared(player.position()), player.key(), player.position())
        })
        .min_by_key(|(distance_squared, key, _)| (*distance_squared, *key));

    let mob_box = store.bbox(key).ok_or(StoreError::Missing(key))?;
    let touching_mob = store.is_blocked(&mob_box, Some(key), |kind| kind == EntityKind::Mob);

    let mob = store.mob_mut(id).ok_or(StoreError::Missing(key))?;
    match nearest {
        None => {
            mob.direction = Direction::zero();
            mob.is_tracking_player = false;
        }
        Some((distance_squared, _, target)) => {
            mob.is_tracking_player = true;
            mob.combat.attacking_direction = Direction::toward(position, target);
            let standoff = if weapon.is_melee { 0 } else { config.ranged_standoff };
            let stop = (weapon.melee_range + standoff + config.stop_tolerance) as i64;
            mob.direction = if distance_squared <= stop * stop {
                Direction::zero()
            } else {
                mob.combat.attacking_direction
            };
        }
    }
    if touching_mob {
        mob.direction = Direction::zero();
    }
    let (direction, tracking, facing) =
        (mob.direction, mob.is_tracking_player, mob.combat.attacking_direction);

    if tracking {
        combat::attack(store, rules, key, weapon_item, facing, *now)?;
    }

    if direction.is_zero() || !store.contains(key) {
        return Ok(());
    }
    let next = position.offset(direction, config.mob_speed as f32);
    let next_box = store.bbox_at(EntityKind::Mob, next);
    let blocked = !config.world_bounds().contains(&next_box)
        || store.is_blocked(&next_box, Some(key), |kind| {
            matches!(kind, EntityKind::Mob | EntityKind::Obstacle)
        });
    if !blocked {
        store.move_to(key, next)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        config::{ItemDefinition, WorldConfig},
        geometry::{BoundingBox, Position},
        item::ItemType,
        world::entity::Player,
    };

    const CLAWS: ItemType = ItemType(1);
    const SLING: ItemType = ItemType(2);

    fn rules() -> GameRules {
        GameRules::new(WorldConfig {
            mob_count: 0,
            mob_speed: 2,
            projectile_speed: 10,
            items: vec![
                ItemDefinition {
                    id: CLAWS,
                    name: "claws".to_string(),
                    cooldown_ms: 160,
                    damage: 5,
                    melee: true,
                    melee_range: Some(40),
                },
                ItemDefinition {
                    id: SLING,
                    name: "sling".to_string(),
                    cooldown_ms: 1600,
                    damage: 7,
                    melee: false,
                    melee_range: None,
                },
            ],
            ..WorldConfig::default()
        })
        .unwrap()
    }

    fn state(rules: &GameRules) -> GameState {
        GameState::new(rules, StdRng::seed_from_u64(11))
    }

    fn fire(state: &mut GameState, at: Position, direction: Direction, ttl: u32) -> Id<Projectile> {
        let id = state.store.next_projectile_id();
        state.store.add(Projectile::new(id, at, direction, 7, ttl)).unwrap();
        id
    }

    fn add_player(state: &mut GameState, id: u64, at: Position) -> Id<Player> {
        state.store.add(Player::new(Id::new(id), None, at, 100, 3, &[CLAWS])).unwrap();
        Id::new(id)
    }

    fn add_mob(state: &mut GameState, at: Position, weapon: ItemType) -> Id<Mob> {
        let id = state.store.next_mob_id();
        state.store.add(Mob::new(id, at, 50, weapon)).unwrap();
        id
    }

    fn everything() -> BoundingBox {
        BoundingBox::new(-10_000, -10_000, 10_000, 10_000)
    }

    #[test]
    fn projectile_expires_after_its_time_to_live() {
        let rules = rules();
        let mut state = state(&rules);
        let id = fire(&mut state, Position::new(500, 500), Direction::new(1.0, 0.0), 3);

        run_tick(&mut state, &rules);
        run_tick(&mut state, &rules);
        assert_eq!(state.store.projectile(id).unwrap().position(), Position::new(520, 500));

        let report = run_tick(&mut state, &rules);
        assert_eq!(report.expired, 1);
        assert!(state.store.projectile(id).is_none());
        assert!(state.store.query_keys(&everything(), |_| true).is_empty());
        assert_eq!(state.store.index_len(), 0);
    }

    #[test]
    fn projectile_hits_first_combatant_once() {
        let rules = rules();
        let mut state = state(&rules);
        let first = add_player(&mut state, 1, Position::new(530, 500));
        let second = add_player(&mut state, 2, Position::new(560, 500));
        let id = fire(&mut state, Position::new(500, 510), Direction::new(1.0, 0.0), 30);

        assert!(run_tick(&mut state, &rules).hits.is_empty());
        let report = run_tick(&mut state, &rules);
        assert_eq!(report.hits, vec![EntityKey::Player(first)]);
        assert_eq!(state.store.player(first).unwrap().health, 93);
        assert_eq!(state.store.player(second).unwrap().health, 100);
        assert!(state.store.projectile(id).is_none());
    }

    #[test]
    fn projectile_kills_and_removes_target() {
        let rules = rules();
        let mut state = state(&rules);
        let mob = add_mob(&mut state, Position::new(1500, 1500), CLAWS);
        state.store.mob_mut(mob).unwrap().health = 5;
        fire(&mut state, Position::new(1500, 1500), Direction::new(1.0, 0.0), 30);

        run_tick(&mut state, &rules);
        assert!(state.store.mob(mob).is_none());
        assert!(state.store.query_keys(&everything(), |_| true).is_empty());
    }

    #[test]
    fn projectile_leaving_the_world_is_removed() {
        let rules = rules();
        let mut state = state(&rules);
        let id = fire(&mut state, Position::new(1, 500), Direction::new(-1.0, 0.0), 30);
        let report = run_tick(&mut state, &rules);
        assert_eq!(report.expired, 1);
        assert!(state.store.projectile(id).is_none());
    }

    #[test]
    fn idle_mob_without_players_in_sight() {
        let rules = rules();
        let mut state = state(&rules);
        let mob = add_mob(&mut state, Position::new(500, 500), CLAWS);
        add_player(&mut state, 1, Position::new(1500, 1500));

        run_tick(&mut state, &rules);
        let mob = state.store.mob(mob).unwrap();
        assert!(!mob.is_tracking_player);
        assert!(mob.direction.is_zero());
        assert_eq!(mob.position(), Position::new(500, 500));
    }

    #[test]
    fn mob_walks_toward_nearest_player() {
        let rules = rules();
        let mut state = state(&rules);
        let mob = add_mob(&mut state, Position::new(500, 500), CLAWS);
        add_player(&mut state, 1, Position::new(700, 500));
        add_player(&mut state, 2, Position::new(300, 400));

        run_tick(&mut state, &rules);
        let mob = state.store.mob(mob).unwrap();
        assert!(mob.is_tracking_player);
        assert_eq!(mob.combat.attacking_direction, Direction::new(1.0, 0.0));
        assert_eq!(mob.position(), Position::new(502, 500));
    }

    #[test]
    fn melee_mob_stops_in_reach_and_attacks() {
        let rules = rules();
        let mut state = state(&rules);
        let mob = add_mob(&mut state, Position::new(500, 500), CLAWS);
        let player = add_player(&mut state, 1, Position::new(540, 500));

        run_tick(&mut state, &rules);
        assert_eq!(state.store.mob(mob).unwrap().position(), Position::new(500, 500));
        assert_eq!(state.store.player(player).unwrap().health, 95);

        // Cooldown of ten ticks: the next nine ticks do no damage.
        for _ in 0..9 {
            run_tick(&mut state, &rules);
        }
        assert_eq!(state.store.player(player).unwrap().health, 95);
        run_tick(&mut state, &rules);
        assert_eq!(state.store.player(player).unwrap().health, 90);
    }

    #[test]
    fn ranged_mob_keeps_its_distance_and_shoots() {
        let rules = rules();
        let mut state = state(&rules);
        let mob = add_mob(&mut state, Position::new(500, 500), SLING);
        add_player(&mut state, 1, Position::new(650, 500));

        run_tick(&mut state, &rules);
        assert_eq!(state.store.mob(mob).unwrap().position(), Position::new(500, 500));
        let projectiles = state.store.projectile_ids();
        assert_eq!(projectiles.len(), 1);
        let shot = state.store.projectile(projectiles[0]).unwrap();
        assert_eq!(shot.position(), Position::new(530, 500));
        assert_eq!(shot.direction, Direction::new(1.0, 0.0));
    }

    #[test]
    fn touching_mobs_hold_still() {
        let rules = rules();
        let mut state = state(&rules);
        let a = add_mob(&mut state, Position::new(500, 500), CLAWS);
        let b = add_mob(&mut state, Position::new(532, 500), CLAWS);
        add_player(&mut state, 1, Position::new(500, 650));

        run_tick(&mut state, &rules);
        assert_eq!(state.store.mob(a).unwrap().position(), Position::new(500, 500));
        assert_eq!(state.store.mob(b).unwrap().position(), Position::new(532, 500));
        assert!(state.store.mob(a).unwrap().is_tracking_player);
    }

    #[test]
    fn attack_flags_last_one_tick() {
        let rules = rules();
        let mut state = state(&rules);
        let mob = add_mob(&mut state, Position::new(500, 500), CLAWS);
        add_player(&mut state, 1, Position::new(540, 500));
        run_tick(&mut state, &rules);
        assert!(state.store.mob(mob).unwrap().combat.is_attacking);
        run_tick(&mut state, &rules);
        assert!(!state.store.mob(mob).unwrap().combat.is_attacking);
    }

    #[test]
    fn faulty_mob_does_not_stop_the_tick() {
        let rules = rules();
        let mut state = state(&rules);
        let broken = add_mob(&mut state, Position::new(500, 500), ItemType(99));
        let healthy = add_mob(&mut state, Position::new(1000, 1000), CLAWS);
        add_player(&mut state, 1, Position::new(1100, 1000));
        let id = fire(&mut state, Position::new(200, 200), Direction::new(0.0, 1.0), 10);

        let report = run_tick(&mut state, &rules);
        assert_eq!(report.faults, 1);
        assert!(state.store.mob(broken).is_some());
        assert_eq!(state.store.mob(healthy).unwrap().position(), Position::new(1002, 1000));
        assert_eq!(state.store.projectile(id).unwrap().position(), Position::new(200, 210));
    }
}
