mod auth;
mod chat;
mod combat;
mod config;
mod event_writer;
mod game_logic;
mod game_state;
mod geometry;
mod id;
mod item;
mod movement;
mod protocol;
mod server_actor;
mod server_websocket;
mod simulation;
mod tick;
mod world;

use std::{io, net::SocketAddr, sync::Arc};

use auth::{Authenticator, MemoryStore, StoredCredentials};
use config::{ConfigError, GameRules, WorldConfig};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use server_websocket::{handle_connection, ConnectQuery};
use tokio::sync::mpsc;
use warp::Filter;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config_path =
        std::env::var("ARENA_CONFIG").unwrap_or_else(|_| "data/world.json".to_string());
    let config = match WorldConfig::load(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            warn!("{} not found, using the built-in world", config_path);
            WorldConfig::default()
        }
        Err(err) => panic!("{}", err),
    };
    let rules = GameRules::new(config).unwrap();

    let port = std::env::var("ARENA_PORT")
        .ok()
        .and_then(|str| str.parse::<u16>().ok())
        .unwrap_or(8081);

    let (actor_sender, actor_receiver) = mpsc::channel::<server_actor::Message>(4096);
    let self_sender = actor_sender.clone();
    tokio::spawn(async move {
        server_actor::run(actor_receiver, self_sender, rules, StdRng::from_entropy()).await
    });

    let auth: Arc<dyn Authenticator> = Arc::new(StoredCredentials::new(MemoryStore::default()));
    let routes = warp::path!("api" / "ws")
        .and(warp::query::<ConnectQuery>())
        .and(warp::addr::remote())
        .and(warp::ws())
        .map(move |query: ConnectQuery, address: Option<SocketAddr>, ws: warp::ws::Ws| {
            let message_sender = actor_sender.clone();
            let auth = auth.clone();
            ws.on_upgrade(move |websocket| {
                handle_connection(websocket, query, address, auth, message_sender)
            })
        });

    info!("Listening on port {}", port);
    warp::serve(routes).run(([127, 0, 0, 1], port)).await;
}
