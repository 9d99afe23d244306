pub mod aggregator;
pub mod reconciler;

pub use aggregator::{aggregate, bucket_means};
pub use reconciler::{ConsistencyService, PendingPolicy};
