pub mod auth;
pub mod response;

pub use auth::jwt_context_middleware;
pub use response::{ApiResponse, ApiResult};
