use std::{net::SocketAddr, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use serde::Deserialize;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use warp::ws::{Message, WebSocket};

use crate::{
    auth::Authenticator,
    id::Id,
    protocol::{ClientMessage, ServerMessage},
    server_actor::{self, Session},
    world::entity::Player,
};

#[derive(Deserialize, Debug)]
pub struct ConnectQuery {
    username: String,
    password: String,
    #[serde(default)]
    signup: bool,
}

/// Tells the actor the session is over when the connection task ends, however it ends.
struct DisconnectGuard {
    player_id: Id<Player>,
    session: Id<Session>,
    actor_sender: mpsc::Sender<server_actor::Message>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let message = server_actor::Message::PlayerDisconnected {
            player_id: self.player_id,
            session: self.session,
        };
        if let Err(mpsc::error::TrySendError::Full(message)) = self.actor_sender.try_send(message) {
            let actor_sender = self.actor_sender.clone();
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move {
                    let _ = actor_sender.send(message).await;
                });
            }
        }
    }
}

pub async fn handle_connection(
    mut ws: WebSocket,
    connect_query: ConnectQuery,
    address: Option<SocketAddr>,
    auth: Arc<dyn Authenticator>,
    actor_sender: mpsc::Sender<server_actor::Message>,
) {
    let ConnectQuery { username, password, signup } = connect_query;
    let authenticated = if signup {
        auth.signup(&username, &password)
    } else {
        auth.login(&username, &password)
    };
    let player_id = match authenticated {
        Ok(player_id) => player_id,
        Err(err) => {
            debug!("Connection from {:?} refused: {}", address, err);
            let _ = ws.close().await;
            return;
        }
    };
    info!("{} connected as player {}", username, player_id);

    let (mut sink, mut stream) = ws.split();
    let (event_sender, mut event_receiver) = mpsc::channel::<ServerMessage>(64);
    tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            if let Err(err) = sink.send(Message::binary(event.encode().to_vec())).await {
                debug!("Player {} send failed: {}", player_id, err);
                break;
            }
        }
        let _ = sink.close().await;
        debug!("Sender closed");
    });

    let (accepted, answer) = oneshot::channel();
    let connected = server_actor::Message::PlayerConnected {
        player_id,
        address,
        connection: event_sender,
        accepted,
    };
    if actor_sender.send(connected).await.is_err() {
        return;
    }
    let session = match answer.await {
        Ok(Ok(session)) => session,
        Ok(Err(err)) => {
            info!("Player {} could not join: {}", player_id, err);
            return;
        }
        Err(_) => return,
    };
    let _guard = DisconnectGuard { player_id, session, actor_sender: actor_sender.clone() };

    while let Some(Ok(message)) = stream.next().await {
        if message.is_close() {
            break;
        }
        if !message.is_binary() {
            continue;
        }
        match ClientMessage::decode(message.as_bytes()) {
            Ok(message) => {
                let forwarded = server_actor::Message::ClientMessage { player_id, message };
                if actor_sender.send(forwarded).await.is_err() {
                    break;
                }
            }
            Err(err) => debug!("Player {} sent a bad packet: {}", player_id, err),
        }
    }
    debug!("Receiver closed");
}
