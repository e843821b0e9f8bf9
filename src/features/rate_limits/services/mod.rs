mod activity_service;
mod rate_limit_config_service;
mod rate_limit_service;
mod retention_service;
mod usage_counter;

pub use activity_service::ActivityService;
pub use rate_limit_config_service::RateLimitConfigService;
pub use rate_limit_service::RateLimitService;
pub use retention_service::{ActivityRetentionService, RetentionSweepResult};
pub use usage_counter::UsageCounter;
