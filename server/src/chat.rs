use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::WorldConfig,
    id::Id,
    world::{
        entity::{EntityKey, EntityKind, Player},
        EntityStore,
    },
};

pub const MAX_CHAT_LEN: usize = 128;

static ILLEGAL_CHAT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{Extended_Pictographic}").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRejection {
    Empty,
    TooLong,
    IllegalCharacters,
}

impl ChatRejection {
    fn notice(&self) -> &'static str {
        match self {
            ChatRejection::Empty => "Say something first.",
            ChatRejection::TooLong => "That message is too long.",
            ChatRejection::IllegalCharacters => "That message contains illegal characters.",
        }
    }
}

/// Capitalises the first letter and ends the line with punctuation.
pub fn normalize(text: &str) -> Result<String, ChatRejection> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return Err(ChatRejection::Empty);
    }
    if text.len() > MAX_CHAT_LEN {
        return Err(ChatRejection::TooLong);
    }
    if ILLEGAL_CHAT_REGEX.is_match(&text) {
        return Err(ChatRejection::IllegalCharacters);
    }

    let mut chars = text.chars();
    let mut said = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => text.clone(),
    };
    if !said.ends_with(|c: char| c.is_ascii_punctuation()) {
        said.push('.');
    }
    Ok(said)
}

/// Delivers a line to the speaker and every player whose view box contains the
/// speaker. Rejected lines only produce a notice for the speaker.
pub fn say(
    store: &mut EntityStore,
    config: &WorldConfig,
    speaker: Id<Player>,
    text: &str,
) -> Result<usize, ChatRejection> {
    let Some(origin) = store.player(speaker).map(|player| player.position()) else {
        return Ok(0);
    };
    let said = match normalize(text) {
        Ok(said) => said,
        Err(rejection) => {
            debug!("Player {} chat rejected: {:?}", speaker, rejection);
            if let Some(player) = store.player_mut(speaker) {
                player.chat.push(rejection.notice().to_string());
            }
            return Err(rejection);
        }
    };

    let listeners = store.query_keys(&config.view_box(origin), |key| {
        key.kind() == EntityKind::Player && key != EntityKey::Player(speaker)
    });
    if let Some(player) = store.player_mut(speaker) {
        player.chat.push(format!("You say, \"{}\"", said));
    }
    let line = format!("Player {} says, \"{}\"", speaker, said);
    for listener in &listeners {
        if let EntityKey::Player(id) = listener {
            if let Some(player) = store.player_mut(*id) {
                player.chat.push(line.clone());
            }
        }
    }
    Ok(listeners.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geometry::Position, world::Dimensions};

    fn store_with(positions: &[(u64, i32, i32)]) -> (EntityStore, WorldConfig) {
        let config = WorldConfig::default();
        let mut store = EntityStore::new(Dimensions::from_config(&config));
        for (id, x, y) in positions {
            store.add(Player::new(Id::new(*id), None, Position::new(*x, *y), 100, 1, &[])).unwrap();
        }
        (store, config)
    }

    fn chat_of(store: &EntityStore, id: u64) -> Vec<String> {
        store.player(Id::new(id)).unwrap().chat.clone()
    }

    #[test]
    fn normalizes_capitalization_and_punctuation() {
        assert_eq!(normalize("hello  there"), Ok("Hello there.".to_string()));
        assert_eq!(normalize("really?"), Ok("Really?".to_string()));
        assert_eq!(normalize("   "), Err(ChatRejection::Empty));
    }

    #[test]
    fn rejects_long_and_pictographic_messages() {
        assert_eq!(normalize(&"a".repeat(129)), Err(ChatRejection::TooLong));
        assert!(normalize(&"a".repeat(128)).is_ok());
        assert_eq!(normalize("hi 🙂"), Err(ChatRejection::IllegalCharacters));
    }

    #[test]
    fn reaches_players_in_view_only() {
        let (mut store, config) = store_with(&[(1, 500, 500), (2, 900, 700), (3, 1500, 500)]);
        assert_eq!(say(&mut store, &config, Id::new(1), "hi"), Ok(1));
        assert_eq!(chat_of(&store, 1), vec!["You say, \"Hi.\"".to_string()]);
        assert_eq!(chat_of(&store, 2), vec!["Player #1 says, \"Hi.\"".to_string()]);
        assert!(chat_of(&store, 3).is_empty());
    }

    #[test]
    fn rejection_notice_goes_to_speaker_only() {
        let (mut store, config) = store_with(&[(1, 500, 500), (2, 510, 560)]);
        assert_eq!(
            say(&mut store, &config, Id::new(1), &"x".repeat(200)),
            Err(ChatRejection::TooLong)
        );
        assert_eq!(chat_of(&store, 1), vec!["That message is too long.".to_string()]);
        assert!(chat_of(&store, 2).is_empty());
    }
}
