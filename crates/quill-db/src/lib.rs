mod autocompact;
mod cursor;
mod datastore;
mod error;
mod executor;
mod index;
mod persistence;
mod storage;

pub use cursor::Cursor;
pub use datastore::{
    Datastore, DatastoreOptions, RemoveOptions, UpdateOptions, UpdateResult,
};
pub use error::DbError;
pub use persistence::{IndexOptions, SerializationHook};
