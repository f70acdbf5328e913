use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    geometry::{BoundingBox, Position},
    item::{ItemTable, ItemType},
    world::entity::EntityKind,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read world config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse world config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid world config: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.x,
            self.y,
            self.x.saturating_add(self.width),
            self.y.saturating_add(self.height),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefinition {
    pub id: ItemType,
    pub name: String,
    pub cooldown_ms: u64,
    pub damage: i32,
    pub melee: bool,
    #[serde(default)]
    pub melee_range: Option<i32>,
}

/// Every tunable of the simulation. Missing keys fall back to the defaults below.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldConfig {
    pub tick_period_ms: u64,
    pub world_width: i32,
    pub world_height: i32,
    pub spawn_region: Region,
    pub spawn_attempts: u32,
    pub mob_count: usize,
    pub mob_sight_width: i32,
    pub mob_sight_height: i32,
    /// Units per tick.
    pub player_speed: i32,
    /// Most sequence steps a single update may claim movement for.
    pub max_sequence_gap: u32,
    pub mob_speed: i32,
    pub projectile_speed: i32,
    pub projectile_time_to_live: u32,
    /// Distance from the attacker's centre at which projectiles appear.
    pub projectile_offset: i32,
    /// Extra distance a mob with a ranged weapon keeps from its target.
    pub ranged_standoff: i32,
    pub stop_tolerance: i32,
    pub min_health: i32,
    pub player_health: i32,
    pub mob_health: i32,
    pub player_size: i32,
    pub mob_size: i32,
    pub projectile_size: i32,
    pub inventory_size: usize,
    pub starting_inventory: Vec<ItemType>,
    pub mob_weapons: Vec<ItemType>,
    pub view_width: i32,
    pub view_height: i32,
    pub obstacles: Vec<Region>,
    pub items: Vec<ItemDefinition>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            tick_period_ms: 16,
            world_width: 2000,
            world_height: 2000,
            spawn_region: Region { x: 100, y: 100, width: 1800, height: 1800 },
            spawn_attempts: 1000,
            mob_count: 20,
            mob_sight_width: 600,
            mob_sight_height: 400,
            player_speed: 5,
            max_sequence_gap: 30,
            mob_speed: 2,
            projectile_speed: 10,
            projectile_time_to_live: 60,
            projectile_offset: 30,
            ranged_standoff: 200,
            stop_tolerance: 4,
            min_health: 0,
            player_health: 100,
            mob_health: 50,
            player_size: 32,
            mob_size: 32,
            projectile_size: 8,
            inventory_size: 5,
            starting_inventory: vec![ItemType(1), ItemType(2)],
            mob_weapons: vec![ItemType(1), ItemType(2)],
            view_width: 1280,
            view_height: 720,
            obstacles: Vec::new(),
            items: vec![
                ItemDefinition {
                    id: ItemType(1),
                    name: "sword".to_string(),
                    cooldown_ms: 400,
                    damage: 15,
                    melee: true,
                    melee_range: Some(40),
                },
                ItemDefinition {
                    id: ItemType(2),
                    name: "bow".to_string(),
                    cooldown_ms: 800,
                    damage: 10,
                    melee: false,
                    melee_range: None,
                },
            ],
        }
    }
}

impl WorldConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<WorldConfig, ConfigError> {
        let config: WorldConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(invalid("tickPeriodMs must be positive"));
        }
        if self.world_width <= 0 || self.world_height <= 0 {
            return Err(invalid("world must have a positive size"));
        }
        let world = self.world_bounds();
        if !self.spawn_region.is_valid() || !world.contains(&self.spawn_region.bbox()) {
            return Err(invalid("spawnRegion lies outside the world"));
        }
        if let Some(region) = self
            .obstacles
            .iter()
            .find(|region| !region.is_valid() || !world.contains(&region.bbox()))
        {
            let reason = format!("obstacle {:?} lies outside the world", region);
            return Err(ConfigError::Invalid(reason));
        }
        if self.player_speed <= 0 || self.mob_speed < 0 || self.projectile_speed <= 0 {
            return Err(invalid("speeds must be positive"));
        }
        if self.max_sequence_gap == 0 {
            return Err(invalid("maxSequenceGap must be positive"));
        }
        if self.player_size <= 0 || self.mob_size <= 0 || self.projectile_size <= 0 {
            return Err(invalid("entity sizes must be positive"));
        }
        if self.mob_sight_width <= 0
            || self.mob_sight_height <= 0
            || self.view_width <= 0
            || self.view_height <= 0
        {
            return Err(invalid("sight and view boxes must have a positive size"));
        }
        // Slot counts go over the wire as a single byte.
        if self.inventory_size == 0 || self.inventory_size > u8::MAX as usize {
            return Err(invalid("inventorySize must be between 1 and 255"));
        }
        if self.starting_inventory.len() > self.inventory_size {
            return Err(invalid("startingInventory does not fit in inventorySize"));
        }
        let table = self.item_table()?;
        if let Some(missing) = self
            .starting_inventory
            .iter()
            .chain(self.mob_weapons.iter())
            .find(|item| !table.contains(**item))
        {
            return Err(ConfigError::Invalid(format!("{} is not in the item table", missing)));
        }
        if self.mob_count > 0 && self.mob_weapons.is_empty() {
            return Err(invalid("mobs need at least one weapon"));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn item_table(&self) -> Result<ItemTable, ConfigError> {
        ItemTable::from_definitions(&self.items, self.tick_period())
    }

    pub fn world_bounds(&self) -> BoundingBox {
        BoundingBox::new(0, 0, self.world_width, self.world_height)
    }

    /// Footprint of a kind with fixed dimensions. Obstacles carry their own size.
    pub fn dimensions(&self, kind: EntityKind) -> (i32, i32) {
        match kind {
            EntityKind::Player => (self.player_size, self.player_size),
            EntityKind::Mob => (self.mob_size, self.mob_size),
            EntityKind::Projectile => (self.projectile_size, self.projectile_size),
            EntityKind::Obstacle => (0, 0),
        }
    }

    pub fn view_box(&self, center: Position) -> BoundingBox {
        BoundingBox::centered(center, self.view_width, self.view_height)
    }

    pub fn sight_box(&self, center: Position) -> BoundingBox {
        BoundingBox::centered(center, self.mob_sight_width, self.mob_sight_height)
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid(reason.to_string())
}

/// Immutable configuration handed to the combat rules and the simulation step.
#[derive(Clone, Debug)]
pub struct GameRules {
    pub config: WorldConfig,
    pub items: ItemTable,
}

impl GameRules {
    pub fn new(config: WorldConfig) -> Result<GameRules, ConfigError> {
        config.validate()?;
        let items = config.item_table()?;
        Ok(GameRules { config, items })
    }
}
