//! # Document Store
//!
//! Every record is a JSON document living in one collection, keyed by a UUID.
//!
//! ## Backends
//!
//! - Redis: one hash per collection, field = id, value = JSON. Picked when `REDIS_URL` is set
//! - Memory: the same layout in a `RwLock`ed map. Used for tests and local runs
//!
//! ## Collections
//!
//! | Collection      | Document             | Key        |
//! |-----------------|----------------------|------------|
//! | `devices`       | `Device`             | device id  |
//! | `orders`        | `Order`              | order id   |
//! | `users`         | `User`               | user id    |
//! | `roles`         | `CustomRole`         | role id    |
//! | `carts`         | `Cart`               | user id    |
//! | `reset_tickets` | `ResetTicket`        | user id    |
//!
//! Listing returns documents in no particular order; callers sort.
use std::{collections::HashMap, time::Duration};

use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Serialize, de::DeserializeOwned};
use shop::{
    carts::Cart, devices::Device, orders::Order, roles::CustomRole, tickets::ResetTicket,
    users::User,
};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

const KEY_PREFIX: &str = "storefront";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt document: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Devices,
    Orders,
    Users,
    Roles,
    Carts,
    ResetTickets,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::Orders => "orders",
            Self::Users => "users",
            Self::Roles => "roles",
            Self::Carts => "carts",
            Self::ResetTickets => "reset_tickets",
        }
    }

    fn redis_key(self) -> String {
        format!("{KEY_PREFIX}:{}", self.name())
    }
}

pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn key(&self) -> Uuid;
}

impl Document for Device {
    const COLLECTION: Collection = Collection::Devices;

    fn key(&self) -> Uuid {
        self.id
    }
}

impl Document for Order {
    const COLLECTION: Collection = Collection::Orders;

    fn key(&self) -> Uuid {
        self.id
    }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> Uuid {
        self.id
    }
}

impl Document for CustomRole {
    const COLLECTION: Collection = Collection::Roles;

    fn key(&self) -> Uuid {
        self.id
    }
}

impl Document for Cart {
    const COLLECTION: Collection = Collection::Carts;

    fn key(&self) -> Uuid {
        self.user
    }
}

impl Document for ResetTicket {
    const COLLECTION: Collection = Collection::ResetTickets;

    fn key(&self) -> Uuid {
        self.user
    }
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, HashMap<Uuid, String>>>,
}

pub enum Database {
    Memory(MemoryStore),
    Redis(ConnectionManager),
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, DatabaseError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

impl Database {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::default())
    }

    pub async fn connect(redis_url: &str) -> Result<Self, DatabaseError> {
        Ok(Self::Redis(init_redis(redis_url).await?))
    }

    pub async fn get<T: Document>(&self, id: Uuid) -> Result<Option<T>, DatabaseError> {
        let raw = match self {
            Self::Memory(store) => store
                .collections
                .read()
                .await
                .get(&T::COLLECTION)
                .and_then(|documents| documents.get(&id).cloned()),
            Self::Redis(connection) => {
                let mut connection = connection.clone();
                connection
                    .hget(T::COLLECTION.redis_key(), id.to_string())
                    .await?
            }
        };

        raw.map(|json: String| serde_json::from_str(&json))
            .transpose()
            .map_err(DatabaseError::from)
    }

    pub async fn all<T: Document>(&self) -> Result<Vec<T>, DatabaseError> {
        let raw: Vec<String> = match self {
            Self::Memory(store) => store
                .collections
                .read()
                .await
                .get(&T::COLLECTION)
                .map(|documents| documents.values().cloned().collect())
                .unwrap_or_default(),
            Self::Redis(connection) => {
                let mut connection = connection.clone();
                connection.hvals(T::COLLECTION.redis_key()).await?
            }
        };

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(DatabaseError::from))
            .collect()
    }

    /// Inserts or replaces the document under its key.
    pub async fn put<T: Document>(&self, document: &T) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(document)?;
        let id = document.key();

        match self {
            Self::Memory(store) => {
                store
                    .collections
                    .write()
                    .await
                    .entry(T::COLLECTION)
                    .or_default()
                    .insert(id, json);
            }
            Self::Redis(connection) => {
                let mut connection = connection.clone();
                let _: () = connection
                    .hset(T::COLLECTION.redis_key(), id.to_string(), json)
                    .await?;
            }
        }

        Ok(())
    }

    /// Returns whether a document was removed.
    pub async fn delete<T: Document>(&self, id: Uuid) -> Result<bool, DatabaseError> {
        match self {
            Self::Memory(store) => Ok(store
                .collections
                .write()
                .await
                .get_mut(&T::COLLECTION)
                .and_then(|documents| documents.remove(&id))
                .is_some()),
            Self::Redis(connection) => {
                let mut connection = connection.clone();
                let removed: i64 = connection
                    .hdel(T::COLLECTION.redis_key(), id.to_string())
                    .await?;

                Ok(removed > 0)
            }
        }
    }

    /// Drops the whole collection.
    pub async fn clear<T: Document>(&self) -> Result<(), DatabaseError> {
        match self {
            Self::Memory(store) => {
                store.collections.write().await.remove(&T::COLLECTION);
            }
            Self::Redis(connection) => {
                let mut connection = connection.clone();
                let _: () = connection.del(T::COLLECTION.redis_key()).await?;
            }
        }

        Ok(())
    }
}
