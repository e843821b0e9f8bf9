pub mod annotator;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod workers;

pub use handlers::RateLimitState;
pub use services::{
    ActivityRetentionService, ActivityService, RateLimitConfigService, RateLimitService,
    UsageCounter,
};
pub use workers::RetentionSweeper;
