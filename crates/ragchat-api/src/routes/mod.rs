pub mod cancel;
pub mod health;
pub mod messages;
