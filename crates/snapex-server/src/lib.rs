//! REST surface and process bootstrap for the snapex extraction engine.

pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
