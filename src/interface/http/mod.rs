pub mod events;
pub mod handlers;
pub mod routes;

pub use events::{forward_updates, shutdown_requested, EVENT_BUFFER};
pub use handlers::AppState;
pub use routes::create_router;
