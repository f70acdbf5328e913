use std::collections::HashMap;

use crate::{id::Id, protocol::ServerMessage, world::entity::Player};

/// Outgoing messages gathered while the actor handles one inbound message,
/// flushed to the connections afterwards.
#[derive(Debug, Default)]
pub struct EventWriter {
    pub events: HashMap<Id<Player>, Vec<ServerMessage>>,
}

impl EventWriter {
    pub fn tell(&mut self, player_id: Id<Player>, event: ServerMessage) {
        self.events.entry(player_id).or_default().push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (Id<Player>, Vec<ServerMessage>)> + '_ {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_queue_per_player_in_order() {
        let mut writer = EventWriter::default();
        writer.tell(Id::new(1), ServerMessage::Died);
        writer.tell(Id::new(2), ServerMessage::Died);
        writer.tell(Id::new(1), ServerMessage::Died);
        assert_eq!(writer.events[&Id::new(1)].len(), 2);
        assert_eq!(writer.drain().count(), 2);
        assert!(writer.is_empty());
    }
}
