//! fwpool-metrics — utilization polling and custom-metric publication.
//!
//! On each timer tick, every InService pool member is asked for its load
//! statistics over the management channel. One datum is published per
//! member plus a pool-level aggregate. The aggregate is the maximum across
//! members: one hot appliance should trigger scale-out even when the rest
//! sit idle. Per-instance failures are recorded and skipped, never fatal
//! to the batch.

pub mod publisher;

pub use publisher::{PublishSummary, parse_utilization, publish_load_metrics};
