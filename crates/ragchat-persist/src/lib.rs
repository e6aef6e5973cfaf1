pub mod error;
pub mod memory;
pub mod store;

#[cfg(feature = "mongodb")]
pub mod dbs;

pub use error::{PersistError, Result};
pub use memory::InMemoryStore;
pub use store::{AssistantStore, MessageStore, ThreadStore};

#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoStore;
