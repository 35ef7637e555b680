pub mod app;
pub mod authz;
pub mod docs;
pub mod errors;
pub mod events;
pub mod identity;
pub mod models;
pub mod registry;
pub mod routes;

// Re-export commonly used items for tests and embedders
pub use app::{create_app, AppState};
