//! The refresh pipeline: reconcile parsed entries into the catalog, then
//! assemble and promote immutable snapshots.

pub mod reconcile;
pub mod snapshot;
pub mod stream_key;

pub use reconcile::{reconcile, ReconcileOutcome};
pub use snapshot::{RefreshOutcome, RefreshPipeline};
