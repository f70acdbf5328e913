use rand::rngs::StdRng;

use crate::{
    config::GameRules,
    tick::Tick,
    world::{self, Dimensions, EntityStore},
};

/// Everything the server actor mutates: the clock, the live entities and the
/// random source used for spawns and mob weapons.
#[derive(Debug)]
pub struct GameState {
    pub now: Tick,
    pub store: EntityStore,
    pub rng: StdRng,
}

impl GameState {
    /// Fresh world with the configured obstacles and initial mob batch in place.
    pub fn new(rules: &GameRules, mut rng: StdRng) -> GameState {
        let mut store = EntityStore::new(Dimensions::from_config(&rules.config));
        world::populate(&mut store, &rules.config, &mut rng);
        GameState { now: Tick::zero(), store, rng }
    }
}
