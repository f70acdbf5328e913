//! Binary websocket messages. All integers are little-endian; strings are a
//! `u16` byte length followed by UTF-8.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    geometry::{Direction, Position},
    item::ItemType,
    world::entity::{EntityKind, EntityRef},
};

const CLIENT_UPDATE: u8 = 0;
const CLIENT_CHAT: u8 = 1;
const SERVER_SNAPSHOT: u8 = 0;
const SERVER_DIED: u8 = 1;

const FLAG_ATTACK: u8 = 0b0000_0001;
const NO_ITEM: u16 = u16::MAX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer too short: need {needed} more bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("unknown message tag: {0}")]
    UnknownTag(u8),

    #[error("unknown entity kind: {0}")]
    UnknownKind(u8),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("message is empty")]
    Empty,
}

/// Fixed-layout record the client sends every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientUpdate {
    pub sequence: u32,
    pub position: Position,
    pub attack: bool,
    pub attack_direction: Direction,
    pub selected_slot: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    Update(ClientUpdate),
    Chat(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntitySnapshot {
    pub kind: EntityKind,
    pub position: Position,
    pub direction: Direction,
    pub is_attacking: bool,
    pub item: Option<ItemType>,
}

impl From<EntityRef<'_>> for EntitySnapshot {
    fn from(entity: EntityRef<'_>) -> Self {
        EntitySnapshot {
            kind: entity.kind(),
            position: entity.position(),
            direction: entity.direction(),
            is_attacking: entity.is_attacking(),
            item: entity.held_item(),
        }
    }
}

/// The recipient's own authoritative state plus everything in its view box.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub position: Position,
    pub health: i32,
    pub selected_slot: u8,
    pub inventory: Vec<Option<ItemType>>,
    pub chat: Vec<String>,
    pub entities: Vec<EntitySnapshot>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    Snapshot(Snapshot),
    Died,
}

impl ClientMessage {
    pub fn decode(mut buf: &[u8]) -> Result<ClientMessage, ProtocolError> {
        ensure(&buf, 1).map_err(|_| ProtocolError::Empty)?;
        let message = match buf.get_u8() {
            CLIENT_UPDATE => {
                ensure(&buf, 22)?;
                let sequence = buf.get_u32_le();
                let position = Position::new(buf.get_i32_le(), buf.get_i32_le());
                let flags = buf.get_u8();
                let attack_direction = Direction::new(buf.get_f32_le(), buf.get_f32_le());
                let selected_slot = buf.get_u8();
                ClientMessage::Update(ClientUpdate {
                    sequence,
                    position,
                    attack: flags & FLAG_ATTACK != 0,
                    attack_direction,
                    selected_slot,
                })
            }
            CLIENT_CHAT => ClientMessage::Chat(read_string(&mut buf)?),
            tag => return Err(ProtocolError::UnknownTag(tag)),
        };
        if buf.has_remaining() {
            return Err(ProtocolError::TrailingBytes(buf.remaining()));
        }
        Ok(message)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            ClientMessage::Update(update) => {
                buf.put_u8(CLIENT_UPDATE);
                buf.put_u32_le(update.sequence);
                buf.put_i32_le(update.position.x);
                buf.put_i32_le(update.position.y);
                buf.put_u8(if update.attack { FLAG_ATTACK } else { 0 });
                buf.put_f32_le(update.attack_direction.x);
                buf.put_f32_le(update.attack_direction.y);
                buf.put_u8(update.selected_slot);
            }
            ClientMessage::Chat(text) => {
                buf.put_u8(CLIENT_CHAT);
                write_string(&mut buf, text);
            }
        }
        buf.freeze()
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            ServerMessage::Snapshot(snapshot) => {
                // Anything past what a count field can say is left off.
                let inventory = capped(&snapshot.inventory, u8::MAX as usize);
                let chat = capped(&snapshot.chat, u16::MAX as usize);
                let entities = capped(&snapshot.entities, u16::MAX as usize);

                buf.put_u8(SERVER_SNAPSHOT);
                buf.put_i32_le(snapshot.position.x);
                buf.put_i32_le(snapshot.position.y);
                buf.put_i32_le(snapshot.health);
                buf.put_u8(snapshot.selected_slot);
                buf.put_u8(inventory.len() as u8);
                for slot in inventory {
                    write_item(&mut buf, *slot);
                }
                buf.put_u16_le(chat.len() as u16);
                for line in chat {
                    write_string(&mut buf, line);
                }
                buf.put_u16_le(entities.len() as u16);
                for entity in entities {
                    buf.put_u8(entity.kind.wire_tag());
                    buf.put_i32_le(entity.position.x);
                    buf.put_i32_le(entity.position.y);
                    buf.put_f32_le(entity.direction.x);
                    buf.put_f32_le(entity.direction.y);
                    buf.put_u8(entity.is_attacking as u8);
                    write_item(&mut buf, entity.item);
                }
            }
            ServerMessage::Died => buf.put_u8(SERVER_DIED),
        }
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<ServerMessage, ProtocolError> {
        ensure(&buf, 1).map_err(|_| ProtocolError::Empty)?;
        match buf.get_u8() {
            SERVER_DIED => Ok(ServerMessage::Died),
            SERVER_SNAPSHOT => {
                ensure(&buf, 14)?;
                let position = Position::new(buf.get_i32_le(), buf.get_i32_le());
                let health = buf.get_i32_le();
                let selected_slot = buf.get_u8();
                let slots = buf.get_u8() as usize;
                let inventory =
                    (0..slots).map(|_| read_item(&mut buf)).collect::<Result<Vec<_>, _>>()?;
                ensure(&buf, 2)?;
                let lines = buf.get_u16_le() as usize;
                let chat =
                    (0..lines).map(|_| read_string(&mut buf)).collect::<Result<Vec<_>, _>>()?;
                ensure(&buf, 2)?;
                let count = buf.get_u16_le() as usize;
                let mut entities = Vec::with_capacity(count);
                for _ in 0..count {
                    ensure(&buf, 18)?;
                    let tag = buf.get_u8();
                    let kind =
                        EntityKind::from_wire_tag(tag).ok_or(ProtocolError::UnknownKind(tag))?;
                    let position = Position::new(buf.get_i32_le(), buf.get_i32_le());
                    let direction = Direction::new(buf.get_f32_le(), buf.get_f32_le());
                    let is_attacking = buf.get_u8() != 0;
                    let item = read_item(&mut buf)?;
                    entities.push(EntitySnapshot { kind, position, direction, is_attacking, item });
                }
                Ok(ServerMessage::Snapshot(Snapshot {
                    position,
                    health,
                    selected_slot,
                    inventory,
                    chat,
                    entities,
                }))
            }
            tag => Err(ProtocolError::UnknownTag(tag)),
        }
    }
}

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        Err(ProtocolError::BufferTooShort { needed, remaining: buf.remaining() })
    } else {
        Ok(())
    }
}

fn capped<T>(items: &[T], max: usize) -> &[T] {
    &items[..items.len().min(max)]
}

fn write_item(buf: &mut impl BufMut, item: Option<ItemType>) {
    buf.put_u16_le(item.map_or(NO_ITEM, |item| item.0));
}

fn read_item(buf: &mut impl Buf) -> Result<Option<ItemType>, ProtocolError> {
    ensure(&*buf, 2)?;
    Ok(match buf.get_u16_le() {
        NO_ITEM => None,
        id => Some(ItemType(id)),
    })
}

/// Overlong text is cut at the last whole character that fits.
fn write_string(buf: &mut impl BufMut, text: &str) {
    let mut len = text.len().min(u16::MAX as usize);
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    buf.put_u16_le(len as u16);
    buf.put_slice(&text.as_bytes()[..len]);
}

fn read_string(buf: &mut impl Buf) -> Result<String, ProtocolError> {
    ensure(&*buf, 2)?;
    let len = buf.get_u16_le() as usize;
    ensure(&*buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> ClientUpdate {
        ClientUpdate {
            sequence: 7,
            position: Position::new(-3, 250),
            attack: true,
            attack_direction: Direction::new(0.6, -0.8),
            selected_slot: 2,
        }
    }

    #[test]
    fn client_update_layout() {
        let encoded = ClientMessage::Update(update()).encode();
        assert_eq!(encoded.len(), 23);
        assert_eq!(&encoded[..5], &[0, 7, 0, 0, 0]);
        assert_eq!(encoded[13], FLAG_ATTACK);
        assert_eq!(ClientMessage::decode(&encoded), Ok(ClientMessage::Update(update())));
    }

    #[test]
    fn unknown_flag_bits_are_ignored() {
        let message = ClientMessage::Update(ClientUpdate { attack: false, ..update() });
        let mut raw = message.encode().to_vec();
        raw[13] = 0b1111_1110;
        let ClientMessage::Update(decoded) = ClientMessage::decode(&raw).unwrap() else {
            panic!("expected an update");
        };
        assert!(!decoded.attack);
    }

    #[test]
    fn malformed_client_messages_are_errors() {
        assert_eq!(ClientMessage::decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(ClientMessage::decode(&[9]), Err(ProtocolError::UnknownTag(9)));
        assert_eq!(
            ClientMessage::decode(&[0, 1, 2]),
            Err(ProtocolError::BufferTooShort { needed: 22, remaining: 2 })
        );
        assert_eq!(ClientMessage::decode(&[1, 2, 0, 0xC3, 0x28]), Err(ProtocolError::InvalidUtf8));

        let mut long = ClientMessage::Chat("hi".to_string()).encode().to_vec();
        long.push(0);
        assert_eq!(ClientMessage::decode(&long), Err(ProtocolError::TrailingBytes(1)));
    }

    #[test]
    fn chat_message_decodes() {
        let encoded = ClientMessage::Chat("hello arena".to_string()).encode();
        assert_eq!(encoded[0], CLIENT_CHAT);
        assert_eq!(
            ClientMessage::decode(&encoded),
            Ok(ClientMessage::Chat("hello arena".to_string()))
        );
    }

    #[test]
    fn snapshot_carries_own_state_and_entities() {
        let snapshot = Snapshot {
            position: Position::new(100, 200),
            health: 85,
            selected_slot: 1,
            inventory: vec![Some(ItemType(1)), None, Some(ItemType(2))],
            chat: vec!["You say, \"Hi.\"".to_string()],
            entities: vec![EntitySnapshot {
                kind: EntityKind::Mob,
                position: Position::new(130, 200),
                direction: Direction::new(-1.0, 0.0),
                is_attacking: true,
                item: Some(ItemType(1)),
            }],
        };
        let encoded = ServerMessage::Snapshot(snapshot.clone()).encode();
        assert_eq!(encoded[0], SERVER_SNAPSHOT);
        assert_eq!(&encoded[15..21], &[1, 0, 0xFF, 0xFF, 2, 0]);
        assert_eq!(ServerMessage::decode(&encoded), Ok(ServerMessage::Snapshot(snapshot)));
    }

    #[test]
    fn oversized_lists_are_cut_to_their_count_width() {
        let entity = EntitySnapshot {
            kind: EntityKind::Projectile,
            position: Position::new(1, 2),
            direction: Direction::new(0.0, 1.0),
            is_attacking: false,
            item: None,
        };
        let snapshot = Snapshot {
            inventory: vec![None; 300],
            chat: vec!["é".repeat(40_000)],
            entities: vec![entity; 70_000],
            ..Snapshot::default()
        };
        let encoded = ServerMessage::Snapshot(snapshot).encode();
        let Ok(ServerMessage::Snapshot(decoded)) = ServerMessage::decode(&encoded) else {
            panic!("snapshot did not decode");
        };
        assert_eq!(decoded.inventory.len(), u8::MAX as usize);
        assert_eq!(decoded.entities.len(), u16::MAX as usize);
        assert_eq!(decoded.chat[0], "é".repeat(32_767));
    }

    #[test]
    fn died_is_a_single_byte() {
        assert_eq!(&ServerMessage::Died.encode()[..], &[SERVER_DIED]);
    }
}
