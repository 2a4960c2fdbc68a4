pub mod extract;
pub mod handlers;
pub mod router;
pub mod services;
pub mod state;

pub use router::build_router;
pub use state::{AppState, Providers};
