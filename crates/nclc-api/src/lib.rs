pub mod app;
pub mod auth;
pub mod error;
pub mod facade;
pub mod handlers;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use facade::{default_repair_policies, CloudProvider, NclcCloudProvider};
pub use state::AppState;
