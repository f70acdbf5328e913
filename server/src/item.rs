use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    config::{ConfigError, ItemDefinition},
    tick::TickDuration,
};

/// Item-type identifier as carried in inventories and snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemType(pub u16);

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Weapon {
    pub name: String,
    pub cooldown: TickDuration,
    pub damage: i32,
    pub is_melee: bool,
    /// Half-extent of the square hit box around the attacker. Zero for ranged weapons.
    pub melee_range: i32,
}

/// Read-only lookup from item type to weapon descriptor, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct ItemTable {
    weapons: HashMap<ItemType, Weapon>,
}

impl ItemTable {
    pub fn from_definitions(
        definitions: &[ItemDefinition],
        tick_period: Duration,
    ) -> Result<ItemTable, ConfigError> {
        let mut weapons = HashMap::new();
        for def in definitions {
            if def.damage < 0 {
                return Err(ConfigError::Invalid(format!("{} has negative damage", def.id)));
            }
            let melee_range = match (def.melee, def.melee_range) {
                (true, Some(range)) if range > 0 => range,
                (true, _) => {
                    return Err(ConfigError::Invalid(format!(
                        "melee {} needs a positive meleeRange",
                        def.id
                    )))
                }
                (false, _) => 0,
            };
            let weapon = Weapon {
                name: def.name.clone(),
                cooldown: TickDuration::from_millis(def.cooldown_ms, tick_period),
                damage: def.damage,
                is_melee: def.melee,
                melee_range,
            };
            if weapons.insert(def.id, weapon).is_some() {
                return Err(ConfigError::Invalid(format!("{} is defined twice", def.id)));
            }
        }
        Ok(ItemTable { weapons })
    }

    pub fn weapon(&self, item: ItemType) -> Option<&Weapon> {
        self.weapons.get(&item)
    }

    pub fn contains(&self, item: ItemType) -> bool {
        self.weapons.contains_key(&item)
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: u16, melee: bool, melee_range: Option<i32>) -> ItemDefinition {
        ItemDefinition {
            id: ItemType(id),
            name: format!("weapon-{}", id),
            cooldown_ms: 400,
            damage: 10,
            melee,
            melee_range,
        }
    }

    #[test]
    fn builds_table_with_tick_cooldowns() {
        let table = ItemTable::from_definitions(
            &[def(1, true, Some(40)), def(2, false, None)],
            Duration::from_millis(16),
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        let sword = table.weapon(ItemType(1)).unwrap();
        assert!(sword.is_melee);
        assert_eq!(sword.melee_range, 40);
        assert_eq!(sword.cooldown.ticks(), 25);
        assert_eq!(table.weapon(ItemType(2)).unwrap().melee_range, 0);
        assert!(table.weapon(ItemType(3)).is_none());
    }

    #[test]
    fn rejects_melee_without_range() {
        let result = ItemTable::from_definitions(&[def(1, true, None)], Duration::from_millis(16));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = ItemTable::from_definitions(
            &[def(1, false, None), def(1, false, None)],
            Duration::from_millis(16),
        );
        assert!(result.is_err());
    }
}
