// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod id;
mod tag_filter;

pub use id::{CommandId, DeploymentId, Id, InstanceId, JobId};
pub use tag_filter::{TagFilter, TagFilterError, TagFilters};
