mod rate_limit_config_handler;
mod usage_handler;

pub use rate_limit_config_handler::*;
pub use usage_handler::*;

use std::sync::Arc;

use crate::features::rate_limits::services::{
    ActivityRetentionService, RateLimitConfigService, RateLimitService,
};

/// State for rate limit handlers
#[derive(Clone)]
pub struct RateLimitState {
    pub config_service: Arc<RateLimitConfigService>,
    pub rate_limit_service: Arc<RateLimitService>,
    pub retention_service: Arc<ActivityRetentionService>,
}
