pub mod backfill;
pub mod pacer;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod updater;
pub mod watermark;
