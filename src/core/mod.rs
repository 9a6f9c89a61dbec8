//! Sync orchestration: reconciliation, asset upload, the per-source
//! pipeline and operator maintenance.

pub mod assets;
pub mod maintenance;
pub mod pipeline;
pub mod reconciler;

pub use assets::AssetMaterializer;
pub use maintenance::{execute, plan, Change, MaintenanceOp, MaintenancePlan, MaintenanceReport};
pub use pipeline::{SyncOptions, SyncPipeline, SyncReport};
pub use reconciler::{decide, Action, Applied, BrandRegistry, ExistingIndex, PlannedPatch, Reconciler};
