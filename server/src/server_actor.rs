use std::{collections::HashMap, net::SocketAddr};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, MissedTickBehavior},
};

use crate::{
    config::GameRules,
    event_writer::EventWriter,
    game_logic,
    game_state::GameState,
    id::{Id, IdSource},
    protocol::{self, ServerMessage},
    world::{entity::Player, StoreError},
};

/// One accepted websocket. A player id can outlive several of these when the
/// user dies and reconnects.
#[derive(Debug)]
pub enum Session {}

#[derive(Debug)]
pub enum Message {
    PlayerConnected {
        player_id: Id<Player>,
        address: Option<SocketAddr>,
        connection: mpsc::Sender<ServerMessage>,
        accepted: oneshot::Sender<Result<Id<Session>, StoreError>>,
    },
    PlayerDisconnected {
        player_id: Id<Player>,
        session: Id<Session>,
    },
    ClientMessage {
        player_id: Id<Player>,
        message: protocol::ClientMessage,
    },
    Tick,
}

/// Sole owner of the world. Every mutation arrives as a [`Message`] and is
/// applied in arrival order, so no entity is ever touched concurrently.
pub struct ServerActor {
    rules: GameRules,
    state: GameState,
    connections: HashMap<Id<Player>, Connection>,
    session_ids: IdSource<Session>,
    writer: EventWriter,
}

#[derive(Debug)]
struct Connection {
    session: Id<Session>,
    sender: mpsc::Sender<ServerMessage>,
}

impl ServerActor {
    pub fn new(rules: GameRules, rng: StdRng) -> ServerActor {
        let state = GameState::new(&rules, rng);
        game_logic::initialize(&rules, &state);
        ServerActor {
            rules,
            state,
            connections: HashMap::new(),
            session_ids: IdSource::new(1),
            writer: EventWriter::default(),
        }
    }

    pub fn handle(&mut self, message: Message) {
        use Message::*;

        match message {
            PlayerConnected { player_id, address, connection, accepted } => {
                let result =
                    game_logic::on_player_connect(&self.rules, &mut self.state, player_id, address);
                let result = match result {
                    Ok(()) => {
                        let session = self.session_ids.next();
                        let connection = Connection { session, sender: connection };
                        self.connections.insert(player_id, connection);
                        Ok(session)
                    }
                    Err(err) => {
                        warn!("Player {} refused: {}", player_id, err);
                        Err(err)
                    }
                };
                if accepted.send(result).is_err() {
                    debug!("Player {} hung up while connecting", player_id);
                }
            }
            PlayerDisconnected { player_id, session } => {
                let current = self.connections.get(&player_id).map(|connection| connection.session);
                if current == Some(session) {
                    self.connections.remove(&player_id);
                    game_logic::on_player_disconnect(&mut self.state, player_id);
                } else {
                    // Died earlier, possibly already back on a newer session.
                    debug!("Player {} session {} already ended", player_id, session);
                }
            }
            ClientMessage { player_id, message } => {
                if self.connections.contains_key(&player_id) {
                    game_logic::on_client_message(&self.rules, &mut self.state, player_id, message);
                }
            }
            Tick => {
                let report = game_logic::on_tick(&self.rules, &mut self.state, &mut self.writer);
                if report.faults > 0 {
                    warn!("Tick {} had {} faulty entities", self.state.now.value(), report.faults);
                }
            }
        }

        let dead = self
            .connections
            .keys()
            .filter(|player_id| self.state.store.player(**player_id).is_none())
            .copied()
            .collect::<Vec<_>>();
        for player_id in &dead {
            info!("Player {} died", player_id);
            self.writer.tell(*player_id, ServerMessage::Died);
        }
        self.send_player_events();
        // Dropping the sender lets the connection flush `Died` and close.
        for player_id in dead {
            self.connections.remove(&player_id);
        }
    }

    /// Never waits on a socket. A full queue drops the event; a closed one drops
    /// the connection and the player with it.
    fn send_player_events(&mut self) {
        let mut closed = Vec::new();
        for (player_id, events) in self.writer.drain() {
            let Some(connection) = self.connections.get(&player_id) else {
                continue;
            };
            for event in events {
                match connection.sender.try_send(event) {
                    Ok(()) => (),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Player {} is lagging; event dropped", player_id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(player_id);
                        break;
                    }
                }
            }
        }
        for player_id in closed {
            self.connections.remove(&player_id);
            game_logic::on_player_disconnect(&mut self.state, player_id);
        }
    }
}

pub async fn run(
    mut messages: mpsc::Receiver<Message>,
    self_sender: mpsc::Sender<Message>,
    rules: GameRules,
    rng: StdRng,
) {
    let tick_period = rules.config.tick_period();
    tokio::spawn(async move {
        let mut interval = time::interval(tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if self_sender.send(Message::Tick).await.is_err() {
                break;
            }
        }
    });

    let mut actor = ServerActor::new(rules, rng);
    debug!("Server loop starting");
    while let Some(message) = messages.recv().await {
        actor.handle(message);
    }
    debug!("Server loop stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;

    use super::*;
    use crate::{
        config::WorldConfig,
        geometry::{Direction, Position},
        item::ItemType,
        protocol::ClientUpdate,
        world::entity::{EntityKey, Mob},
    };

    fn rules() -> GameRules {
        GameRules::new(WorldConfig { mob_count: 0, ..WorldConfig::default() }).unwrap()
    }

    type Answer = oneshot::Receiver<Result<Id<Session>, StoreError>>;

    fn connect(actor: &mut ServerActor, player_id: u64) -> (mpsc::Receiver<ServerMessage>, Answer) {
        let (connection, events) = mpsc::channel(16);
        let (accepted, answer) = oneshot::channel();
        actor.handle(Message::PlayerConnected {
            player_id: Id::new(player_id),
            address: None,
            connection,
            accepted,
        });
        (events, answer)
    }

    /// Leaves the player one sword hit from death with a mob in reach.
    fn doom(actor: &mut ServerActor, player_id: u64) {
        let key = EntityKey::Player(Id::new(player_id));
        actor.state.store.move_to(key, Position::new(500, 500)).unwrap();
        actor.state.store.player_mut(Id::new(player_id)).unwrap().health = 5;
        let mob_id = actor.state.store.next_mob_id();
        let mob = Mob::new(mob_id, Position::new(540, 500), 50, ItemType(1));
        actor.state.store.add(mob).unwrap();
    }

    #[test]
    fn connect_tick_disconnect() {
        let mut actor = ServerActor::new(rules(), StdRng::seed_from_u64(1));
        let (mut events, mut answer) = connect(&mut actor, 1);
        let session = answer.try_recv().unwrap().unwrap();

        actor.handle(Message::Tick);
        assert!(matches!(events.try_recv(), Ok(ServerMessage::Snapshot(_))));

        actor.handle(Message::PlayerDisconnected { player_id: Id::new(1), session });
        assert!(actor.state.store.is_empty());
        actor.handle(Message::Tick);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn second_login_with_same_id_is_refused() {
        let mut actor = ServerActor::new(rules(), StdRng::seed_from_u64(1));
        let (_events, _) = connect(&mut actor, 1);
        let (_, mut answer) = connect(&mut actor, 1);
        assert!(matches!(answer.try_recv().unwrap(), Err(StoreError::DuplicateId(_))));
        assert_eq!(actor.connections.len(), 1);
    }

    #[test]
    fn dead_player_is_told_and_dropped() {
        let mut actor = ServerActor::new(rules(), StdRng::seed_from_u64(1));
        let (mut events, mut answer) = connect(&mut actor, 1);
        let session = answer.try_recv().unwrap().unwrap();
        doom(&mut actor, 1);

        actor.handle(Message::Tick);
        assert_eq!(events.try_recv(), Ok(ServerMessage::Died));
        assert!(actor.connections.is_empty());
        assert!(matches!(events.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));

        actor.handle(Message::PlayerDisconnected { player_id: Id::new(1), session });
        assert!(!actor.state.store.contains(EntityKey::Player(Id::new(1))));
    }

    #[test]
    fn late_disconnect_of_a_dead_session_spares_the_reconnected_player() {
        let mut actor = ServerActor::new(rules(), StdRng::seed_from_u64(1));
        let (_old_events, mut old_answer) = connect(&mut actor, 1);
        let old_session = old_answer.try_recv().unwrap().unwrap();
        doom(&mut actor, 1);
        actor.handle(Message::Tick);
        assert!(actor.connections.is_empty());

        let (_new_events, mut new_answer) = connect(&mut actor, 1);
        let new_session = new_answer.try_recv().unwrap().unwrap();
        assert_ne!(old_session, new_session);

        actor.handle(Message::PlayerDisconnected { player_id: Id::new(1), session: old_session });
        assert!(actor.state.store.player(Id::new(1)).is_some());
        assert!(actor.connections.contains_key(&Id::new(1)));

        actor.handle(Message::PlayerDisconnected { player_id: Id::new(1), session: new_session });
        assert!(actor.state.store.player(Id::new(1)).is_none());
        assert!(actor.connections.is_empty());
    }

    #[test]
    fn closed_connection_takes_its_player_along() {
        let mut actor = ServerActor::new(rules(), StdRng::seed_from_u64(1));
        let (events, _) = connect(&mut actor, 2);
        drop(events);
        actor.handle(Message::Tick);
        assert!(actor.connections.is_empty());
        assert!(actor.state.store.is_empty());
    }

    #[test]
    fn messages_from_unknown_players_are_ignored() {
        let mut actor = ServerActor::new(rules(), StdRng::seed_from_u64(1));
        actor.handle(Message::ClientMessage {
            player_id: Id::new(9),
            message: protocol::ClientMessage::Update(ClientUpdate {
                sequence: 1,
                position: Position::new(10, 10),
                attack: true,
                attack_direction: Direction::new(1.0, 0.0),
                selected_slot: 0,
            }),
        });
        assert!(actor.state.store.is_empty());
    }

    #[tokio::test]
    async fn run_ticks_on_its_own() {
        let (sender, receiver) = mpsc::channel(64);
        tokio::spawn(run(receiver, sender.clone(), rules(), StdRng::seed_from_u64(2)));

        let (connection, mut events) = mpsc::channel(16);
        let (accepted, answer) = oneshot::channel();
        let connected =
            Message::PlayerConnected { player_id: Id::new(3), address: None, connection, accepted };
        sender.send(connected).await.unwrap();
        assert!(answer.await.unwrap().is_ok());

        let first = time::timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        let Some(ServerMessage::Snapshot(snapshot)) = first else {
            panic!("expected a snapshot, got {:?}", first);
        };
        assert_eq!(snapshot.health, 100);
    }
}
