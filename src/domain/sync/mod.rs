pub mod coalesce;
pub mod retry_policy;

pub use coalesce::{coalesce, CoalesceDecision};
pub use retry_policy::RetryPolicy;
