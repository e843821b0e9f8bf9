mod activity;
mod audit;
mod rate_limit_config;
mod usage;
mod verdict;

pub use activity::*;
pub use audit::*;
pub use rate_limit_config::*;
pub use usage::*;
pub use verdict::*;
