use log::{debug, info};
use thiserror::Error;

use crate::{
    config::GameRules,
    geometry::{BoundingBox, Direction},
    id::Id,
    item::ItemType,
    tick::Tick,
    world::{
        entity::{EntityKey, EntityKind, Projectile},
        EntityStore, StoreError,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CombatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} is not a weapon")]
    UnknownWeapon(ItemType),

    #[error("{0:?} cannot attack")]
    NotACombatant(EntityKey),
}

#[derive(Debug, PartialEq, Eq)]
pub enum AttackOutcome {
    /// Still cooling down from the previous attack; nothing happened.
    OnCooldown,
    /// Ranged attack with no direction to fire in; cooldown untouched.
    NoDirection,
    Melee { hits: Vec<EntityKey>, killed: Vec<EntityKey> },
    Ranged { projectile: Id<Projectile> },
}

/// Runs one attack request for a player or mob. Damage and deaths are applied
/// before this returns.
pub fn attack(
    store: &mut EntityStore,
    rules: &GameRules,
    attacker: EntityKey,
    item: ItemType,
    direction: Direction,
    now: Tick,
) -> Result<AttackOutcome, CombatError> {
    let weapon = rules.items.weapon(item).ok_or(CombatError::UnknownWeapon(item))?;
    let combatant = store.combatant_mut(attacker).ok_or(if attacker.kind().is_combatant() {
        CombatError::Store(StoreError::Missing(attacker))
    } else {
        CombatError::NotACombatant(attacker)
    })?;

    if combatant.combat().is_on_cooldown(now) {
        return Ok(AttackOutcome::OnCooldown);
    }

    let direction = match direction.normalized() {
        requested if !requested.is_zero() => requested,
        _ => combatant.combat().attacking_direction,
    };
    if !weapon.is_melee && direction.is_zero() {
        return Ok(AttackOutcome::NoDirection);
    }

    let origin = combatant.position();
    let state = combatant.combat_mut();
    state.start_cooldown(now, weapon.cooldown);
    state.is_attacking = true;
    if !direction.is_zero() {
        state.attacking_direction = direction;
    }

    if weapon.is_melee {
        let reach = BoundingBox::centered(origin, weapon.melee_range * 2, weapon.melee_range * 2);
        let targets = store.query_keys(&reach, |key| is_valid_target(attacker, key));
        let mut killed = Vec::new();
        for target in &targets {
            if apply_damage(store, rules, *target, weapon.damage)? {
                killed.push(*target);
            }
        }
        debug!("{:?} swung {} and hit {} targets", attacker, weapon.name, targets.len());
        Ok(AttackOutcome::Melee { hits: targets, killed })
    } else {
        let id = store.next_projectile_id();
        let spawn_at = origin.offset(direction, rules.config.projectile_offset as f32);
        store.add(Projectile::new(
            id,
            spawn_at,
            direction,
            weapon.damage,
            rules.config.projectile_time_to_live,
        ))?;
        debug!("{:?} fired {} as projectile {}", attacker, weapon.name, id);
        Ok(AttackOutcome::Ranged { projectile: id })
    }
}

/// Players and mobs other than the attacker. Mobs never hurt other mobs.
fn is_valid_target(attacker: EntityKey, target: EntityKey) -> bool {
    target != attacker
        && target.kind().is_combatant()
        && !(attacker.kind() == EntityKind::Mob && target.kind() == EntityKind::Mob)
}

/// Subtracts `damage` from a player or mob and removes it once its health is at
/// or below the configured minimum. Returns whether the target died.
pub fn apply_damage(
    store: &mut EntityStore,
    rules: &GameRules,
    target: EntityKey,
    damage: i32,
) -> Result<bool, StoreError> {
    let combatant = store.combatant_mut(target).ok_or(StoreError::Missing(target))?;
    let health = combatant.take_damage(damage);
    if health <= rules.config.min_health {
        store.remove(target)?;
        info!("{:?} died", target);
        Ok(true)
    } else {
        Ok(false)
    }
}
