// HTTP handlers; routes are wired in `api::router`
pub mod find;
pub mod health;

pub use find::{find_get, find_post};
pub use health::health;
