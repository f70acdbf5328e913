//! Credential check consumed by the websocket front. The game core only ever
//! sees the user id that comes out of a successful login or signup.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{id::Id, world::entity::Player};

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;
const RECORD_LEN: usize = 8 + SALT_LEN + DIGEST_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("wrong username or password")]
    BadCredentials,

    #[error("username {0:?} is taken")]
    UserExists(String),

    #[error("username must be 1 to 32 characters")]
    InvalidUsername,

    #[error("credential storage failed: {0}")]
    Storage(String),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError>;
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), AuthError>;
}

pub trait Authenticator: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<Id<Player>, AuthError>;
    fn signup(&self, username: &str, password: &str) -> Result<Id<Player>, AuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        let entries = self.entries.lock().map_err(|err| AuthError::Storage(err.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), AuthError> {
        let mut entries = self.entries.lock().map_err(|err| AuthError::Storage(err.to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Salted SHA-256 credentials kept in any [`KeyValueStore`]. Each record is the
/// user id (little-endian), the salt and the digest.
pub struct StoredCredentials<S> {
    store: S,
    next_user_id: AtomicU64,
    signup_lock: Mutex<()>,
}

impl<S: KeyValueStore> StoredCredentials<S> {
    pub fn new(store: S) -> Self {
        StoredCredentials { store, next_user_id: AtomicU64::new(0), signup_lock: Mutex::new(()) }
    }

    fn key(username: &str) -> String {
        format!("user:{}", username)
    }
}

fn digest(salt: &[u8], password: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut out = [0; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

impl<S: KeyValueStore> Authenticator for StoredCredentials<S> {
    fn login(&self, username: &str, password: &str) -> Result<Id<Player>, AuthError> {
        let record = self.store.get(&Self::key(username))?.ok_or(AuthError::BadCredentials)?;
        if record.len() != RECORD_LEN {
            return Err(AuthError::Storage(format!("corrupt record for {:?}", username)));
        }
        let (id, rest) = record.split_at(8);
        let (salt, expected) = rest.split_at(SALT_LEN);
        if digest(salt, password).as_slice() != expected {
            return Err(AuthError::BadCredentials);
        }
        let mut id_bytes = [0; 8];
        id_bytes.copy_from_slice(id);
        Ok(Id::new(u64::from_le_bytes(id_bytes)))
    }

    fn signup(&self, username: &str, password: &str) -> Result<Id<Player>, AuthError> {
        if username.is_empty() || username.chars().count() > 32 {
            return Err(AuthError::InvalidUsername);
        }
        let _guard = self.signup_lock.lock().map_err(|err| AuthError::Storage(err.to_string()))?;
        let key = Self::key(username);
        if self.store.get(&key)?.is_some() {
            return Err(AuthError::UserExists(username.to_string()));
        }

        let mut salt = [0; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let user_id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
        let mut record = Vec::with_capacity(RECORD_LEN);
        record.extend_from_slice(&user_id.to_le_bytes());
        record.extend_from_slice(&salt);
        record.extend_from_slice(&digest(&salt, password));
        self.store.put(&key, record)?;
        Ok(Id::new(user_id))
    }
}
