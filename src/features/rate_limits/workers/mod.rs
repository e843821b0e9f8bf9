mod retention_sweeper;

pub use retention_sweeper::RetentionSweeper;
