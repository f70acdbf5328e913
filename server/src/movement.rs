use log::debug;

use crate::{
    config::WorldConfig,
    geometry::{Direction, Position},
    id::Id,
    world::{
        entity::{EntityKey, EntityKind, Player},
        EntityStore,
    },
};

/// Why a client position update was refused. Rejections are ordinary input,
/// not failures: the client is corrected by its next snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveRejection {
    UnknownPlayer,
    StaleSequence { last: u32, got: u32 },
    TooFar { dx: i64, dy: i64, allowed: i64 },
    OutOfBounds,
    Blocked,
}

/// Checks a proposed position for `player_id` without changing anything.
pub fn validate(
    store: &EntityStore,
    config: &WorldConfig,
    player_id: Id<Player>,
    proposed: Position,
    sequence: u32,
) -> Result<(), MoveRejection> {
    let player = store.player(player_id).ok_or(MoveRejection::UnknownPlayer)?;

    // The first update only establishes the sequence baseline.
    if let Some(last) = player.last_applied_sequence {
        if sequence <= last {
            return Err(MoveRejection::StaleSequence { last, got: sequence });
        }
        let steps = (sequence - last).min(config.max_sequence_gap);
        let from = player.position();
        let dx = (proposed.x as i64 - from.x as i64).abs();
        let dy = (proposed.y as i64 - from.y as i64).abs();
        // Each changed axis gets its own allowance; a diagonal step earns nothing extra.
        let allowed = config.player_speed as i64 * steps as i64;
        if dx > allowed || dy > allowed {
            return Err(MoveRejection::TooFar { dx, dy, allowed });
        }
    }

    if !config.world_bounds().contains_point(proposed) {
        return Err(MoveRejection::OutOfBounds);
    }
    let bbox = store.bbox_at(EntityKind::Player, proposed);
    if !config.world_bounds().contains(&bbox) {
        return Err(MoveRejection::OutOfBounds);
    }
    let blocks = |kind| matches!(kind, EntityKind::Player | EntityKind::Mob | EntityKind::Obstacle);
    if store.is_blocked(&bbox, Some(EntityKey::Player(player_id)), blocks) {
        return Err(MoveRejection::Blocked);
    }
    Ok(())
}

pub fn is_invalid(
    store: &EntityStore,
    config: &WorldConfig,
    player_id: Id<Player>,
    proposed: Position,
    sequence: u32,
) -> bool {
    validate(store, config, player_id, proposed, sequence).is_err()
}

/// Validates and, on acceptance, records the sequence number and moves the
/// player through the store. A rejected update leaves the player untouched.
pub fn apply(
    store: &mut EntityStore,
    config: &WorldConfig,
    player_id: Id<Player>,
    proposed: Position,
    sequence: u32,
) -> Result<(), MoveRejection> {
    if let Err(rejection) = validate(store, config, player_id, proposed, sequence) {
        debug!("Player {} move to {:?} rejected: {:?}", player_id, proposed, rejection);
        return Err(rejection);
    }
    let player = store.player_mut(player_id).ok_or(MoveRejection::UnknownPlayer)?;
    player.direction = Direction::toward(player.position(), proposed);
    player.last_applied_sequence = Some(sequence);
    store
        .move_to(EntityKey::Player(player_id), proposed)
        .map_err(|_| MoveRejection::UnknownPlayer)
}
