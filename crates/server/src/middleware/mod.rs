pub mod auth;
pub mod model_loaders;

pub use auth::{RequestContext, require_auth};
pub use model_loaders::*;
