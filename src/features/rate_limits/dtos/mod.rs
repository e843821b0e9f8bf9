mod rate_limit_config_dto;
mod throttle_dto;

pub use rate_limit_config_dto::*;
pub use throttle_dto::*;
