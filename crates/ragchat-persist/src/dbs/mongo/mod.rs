mod client;
mod models;

pub use client::MongoStore;
pub use models::{MongoAssistant, MongoMessage, MongoThread};
