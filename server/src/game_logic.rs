use std::net::SocketAddr;

use log::{debug, error, info};

use crate::{
    chat,
    combat::{self, AttackOutcome, CombatError},
    config::GameRules,
    event_writer::EventWriter,
    game_state::GameState,
    id::Id,
    movement,
    protocol::{ClientMessage, ClientUpdate, EntitySnapshot, ServerMessage, Snapshot},
    simulation::{self, TickReport},
    world::{
        entity::{EntityKey, EntityKind, Player},
        EntityStore, StoreError,
    },
};

pub fn initialize(rules: &GameRules, state: &GameState) {
    info!(
        "World {}x{} ready with {} mobs, {} weapons, tick every {}ms",
        rules.config.world_width,
        rules.config.world_height,
        state.store.mob_ids().len(),
        rules.items.len(),
        rules.config.tick_period_ms,
    );
}

/// Materializes the player at a free spot in the spawn region.
pub fn on_player_connect(
    rules: &GameRules,
    state: &mut GameState,
    player_id: Id<Player>,
    address: Option<SocketAddr>,
) -> Result<(), StoreError> {
    let config = &rules.config;
    let position = state.store.generate_spawn_position(
        EntityKind::Player,
        &config.spawn_region.bbox(),
        config.spawn_attempts,
        &mut state.rng,
    )?;
    state.store.add(Player::new(
        player_id,
        address,
        position,
        config.player_health,
        config.inventory_size,
        &config.starting_inventory,
    ))?;
    info!("Player {} spawned at ({}, {})", player_id, position.x, position.y);
    Ok(())
}

pub fn on_player_disconnect(state: &mut GameState, player_id: Id<Player>) {
    match state.store.remove(EntityKey::Player(player_id)) {
        Ok(_) => info!("Player {} left", player_id),
        // Already removed on death.
        Err(StoreError::Missing(_)) => debug!("Player {} left after dying", player_id),
        Err(err) => error!("Player {} removal failed: {}", player_id, err),
    }
}

pub fn on_client_message(
    rules: &GameRules,
    state: &mut GameState,
    player_id: Id<Player>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Update(update) => apply_update(rules, state, player_id, update),
        ClientMessage::Chat(text) => {
            let _ = chat::say(&mut state.store, &rules.config, player_id, &text);
        }
    }
}

fn apply_update(
    rules: &GameRules,
    state: &mut GameState,
    player_id: Id<Player>,
    update: ClientUpdate,
) {
    let Some(player) = state.store.player_mut(player_id) else {
        debug!("Update for unknown player {}", player_id);
        return;
    };
    let slot = update.selected_slot as usize;
    if slot < player.inventory.len() {
        player.selected_slot = slot;
    } else {
        debug!("Player {} selected missing slot {}", player_id, slot);
    }

    // A rejected move is corrected by the next snapshot.
    let _ = movement::apply(
        &mut state.store,
        &rules.config,
        player_id,
        update.position,
        update.sequence,
    );

    if !update.attack {
        return;
    }
    let Some(item) = state.store.player(player_id).and_then(Player::selected_item) else {
        return;
    };
    let key = EntityKey::Player(player_id);
    match combat::attack(&mut state.store, rules, key, item, update.attack_direction, state.now) {
        Ok(AttackOutcome::Melee { killed, .. }) if !killed.is_empty() => {
            info!("Player {} killed {:?}", player_id, killed);
        }
        Ok(_) => (),
        Err(CombatError::UnknownWeapon(item)) => {
            debug!("Player {} attacked with {}, which is not a weapon", player_id, item);
        }
        Err(err) => error!("Player {} attack failed: {}", player_id, err),
    }
}

/// Runs one simulation step and queues a snapshot for every player still alive.
pub fn on_tick(rules: &GameRules, state: &mut GameState, writer: &mut EventWriter) -> TickReport {
    let report = simulation::run_tick(state, rules);
    for player_id in state.store.player_ids() {
        if let Some(snapshot) = snapshot_for(&mut state.store, rules, player_id) {
            writer.tell(player_id, ServerMessage::Snapshot(snapshot));
        }
    }
    report
}

/// Own state plus every other entity in the player's view box. Drains the chat buffer.
pub fn snapshot_for(
    store: &mut EntityStore,
    rules: &GameRules,
    player_id: Id<Player>,
) -> Option<Snapshot> {
    let player = store.player_mut(player_id)?;
    let chat = std::mem::take(&mut player.chat);
    let player = store.player(player_id)?;
    let self_key = EntityKey::Player(player_id);
    let entities = store
        .query(&rules.config.view_box(player.position()), |key| key != self_key)
        .map(EntitySnapshot::from)
        .collect();
    Some(Snapshot {
        position: player.position(),
        health: player.health,
        selected_slot: player.selected_slot as u8,
        inventory: player.inventory.clone(),
        chat,
        entities,
    })
}
