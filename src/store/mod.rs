pub mod models;
pub mod preferences;
pub mod snapshot;
