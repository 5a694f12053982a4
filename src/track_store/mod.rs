mod models;
mod schema;
mod store;

pub use models::*;
pub use schema::TRACK_STORE_VERSIONED_SCHEMAS;
pub use store::{SqliteTrackStore, TrackStore};
