//! Operator-invoked catalog cleanup.
//!
//! Maintenance is never triggered by a sync. Every operation is first turned
//! into a [`MaintenancePlan`] listing the exact documents it touches; the
//! CLI prints the plan and only calls [`execute`] once the operator confirms.

use std::fmt;
use tracing::{info, warn};

use super::reconciler::BrandRegistry;
use crate::catalog::Condition;
use crate::error::{StoreError, SyncError};
use crate::store::{BrandRecord, ContentStore, MotorcyclePatch, MotorcycleQuery, MotorcycleRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum MaintenanceOp {
    /// Every motorcycle of a brand
    DeleteBrand { brand: String },
    /// Motorcycles without images
    DeleteImageless { brand: String, condition: Option<Condition> },
    /// Motorcycles with a model year before `before`
    DeleteOlder {
        brand: String,
        before: i32,
        condition: Option<Condition>,
    },
    /// Motorcycles whose model contains `pattern`, case-insensitive
    DeleteMatching {
        brand: String,
        pattern: String,
        condition: Option<Condition>,
    },
    /// Point the duplicate brand's motorcycles at the canonical one, then drop the duplicate
    MergeBrand { duplicate: String, canonical: String },
}

impl fmt::Display for MaintenanceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteBrand { brand } => write!(f, "delete every {} motorcycle", brand),
            Self::DeleteImageless { brand, .. } => write!(f, "delete {} motorcycles without images", brand),
            Self::DeleteOlder { brand, before, .. } => write!(f, "delete {} motorcycles older than {}", brand, before),
            Self::DeleteMatching { brand, pattern, .. } => {
                write!(f, "delete {} motorcycles matching '{}'", brand, pattern)
            }
            Self::MergeBrand { duplicate, canonical } => write!(f, "merge brand {} into {}", duplicate, canonical),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    DeleteMotorcycle { id: String, label: String },
    Repoint { id: String, label: String, brand_id: String },
    DeleteBrand { id: String, name: String },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteMotorcycle { id, label } => write!(f, "delete  {} ({})", label, id),
            Self::Repoint { id, label, brand_id } => write!(f, "repoint {} ({}) -> {}", label, id, brand_id),
            Self::DeleteBrand { id, name } => write!(f, "delete  brand {} ({})", name, id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenancePlan {
    pub op: MaintenanceOp,
    pub changes: Vec<Change>,
}

impl MaintenancePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    pub applied: usize,
    pub failed: usize,
    /// Brand deletions held back because a repoint to the canonical brand failed
    pub skipped: usize,
}

fn label(record: &MotorcycleRecord) -> String {
    match record.year {
        Some(year) => format!("{} {}", record.model, year),
        None => record.model.clone(),
    }
}

fn brand_named<'r>(registry: &'r BrandRegistry, name: &str, exact: bool) -> Result<&'r BrandRecord, SyncError> {
    let found = if exact {
        registry.find_exact(name)
    } else {
        registry.find(name)
    };
    found.ok_or_else(|| SyncError::Store(StoreError::NotFound(format!("brand '{}'", name))))
}

async fn brand_motorcycles(
    store: &dyn ContentStore,
    brand: &BrandRecord,
    condition: Option<Condition>,
) -> Result<Vec<MotorcycleRecord>, SyncError> {
    let mut query = MotorcycleQuery::brand(brand.id.clone());
    if let Some(condition) = condition {
        query = query.with_condition(condition);
    }
    Ok(store.motorcycles(&query).await?)
}

fn deletions<F>(records: Vec<MotorcycleRecord>, keep_if: F) -> Vec<Change>
where
    F: Fn(&MotorcycleRecord) -> bool,
{
    records
        .into_iter()
        .filter(|r| !keep_if(r))
        .map(|r| Change::DeleteMotorcycle {
            label: label(&r),
            id: r.id,
        })
        .collect()
}

/// Work out exactly which documents an operation touches. Reads only.
pub async fn plan(op: MaintenanceOp, store: &dyn ContentStore) -> Result<MaintenancePlan, SyncError> {
    let registry = BrandRegistry::new(store.brands().await?);

    let changes = match &op {
        MaintenanceOp::DeleteBrand { brand } => {
            let brand = brand_named(&registry, brand, false)?;
            deletions(brand_motorcycles(store, brand, None).await?, |_| false)
        }
        MaintenanceOp::DeleteImageless { brand, condition } => {
            let brand = brand_named(&registry, brand, false)?;
            deletions(brand_motorcycles(store, brand, *condition).await?, |r| r.images() > 0)
        }
        MaintenanceOp::DeleteOlder {
            brand,
            before,
            condition,
        } => {
            let brand = brand_named(&registry, brand, false)?;
            deletions(brand_motorcycles(store, brand, *condition).await?, |r| {
                r.year.map_or(true, |y| y >= *before)
            })
        }
        MaintenanceOp::DeleteMatching {
            brand,
            pattern,
            condition,
        } => {
            let brand = brand_named(&registry, brand, false)?;
            let needle = pattern.to_lowercase();
            deletions(brand_motorcycles(store, brand, *condition).await?, |r| {
                !r.model.to_lowercase().contains(&needle)
            })
        }
        MaintenanceOp::MergeBrand { duplicate, canonical } => {
            let from = brand_named(&registry, duplicate, true)?;
            let to = brand_named(&registry, canonical, true)?;
            if from.id == to.id {
                return Err(SyncError::config("cannot merge a brand into itself"));
            }

            let mut changes: Vec<Change> = brand_motorcycles(store, from, None)
                .await?
                .into_iter()
                .map(|r| Change::Repoint {
                    label: label(&r),
                    id: r.id,
                    brand_id: to.id.clone(),
                })
                .collect();
            changes.push(Change::DeleteBrand {
                id: from.id.clone(),
                name: from.name.clone(),
            });
            changes
        }
    };

    Ok(MaintenancePlan { op, changes })
}

/// Apply a reviewed plan. Individual failures are counted; a credential
/// failure stops immediately.
pub async fn execute(plan: &MaintenancePlan, store: &dyn ContentStore) -> Result<MaintenanceReport, SyncError> {
    let mut report = MaintenanceReport::default();
    info!("Executing maintenance: {} ({} change(s))", plan.op, plan.changes.len());

    let mut repoint_failed = false;

    for change in &plan.changes {
        let result = match change {
            Change::DeleteBrand { .. } if repoint_failed => {
                warn!("Skipped: {}: some motorcycles still reference it", change);
                report.skipped += 1;
                continue;
            }
            Change::DeleteMotorcycle { id, .. } | Change::DeleteBrand { id, .. } => store.delete(id).await,
            Change::Repoint { id, brand_id, .. } => {
                let patch = MotorcyclePatch {
                    brand_id: Some(brand_id.clone()),
                    ..MotorcyclePatch::default()
                };
                let result = store.patch_motorcycle(id, &patch).await;
                repoint_failed |= result.is_err();
                result
            }
        };

        match result {
            Ok(()) => {
                info!("{}", change);
                report.applied += 1;
            }
            Err(e) if e.is_unauthorized() => return Err(e.into()),
            Err(e) => {
                warn!("Failed: {}: {}", change, e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
