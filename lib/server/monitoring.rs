use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers immutable build metadata for `/metrics` scraping as a labeled gauge set to `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "codepulse",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

/// Label for the entity kind an ordering counter refers to.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EntityLabels {
    pub entity: &'static str,
}

impl EntityLabels {
    pub fn new(entity: &'static str) -> Self {
        Self { entity }
    }
}

#[derive(Clone)]
pub struct OrderingMetrics {
    /// Ordered children appended or inserted at an explicit position.
    pub items_created_total: Family<EntityLabels, Counter>,
    /// Ordered children deleted (gaps left behind).
    pub items_deleted_total: Family<EntityLabels, Counter>,
    pub reorders_committed_total: Family<EntityLabels, Counter>,
    pub reorders_rolled_back_total: Family<EntityLabels, Counter>,
    /// Ids in reorder requests that belonged to another parent.
    pub foreign_ids_skipped_total: Family<EntityLabels, Counter>,
}

impl OrderingMetrics {
    fn init() -> Self {
        Self {
            items_created_total: Family::default(),
            items_deleted_total: Family::default(),
            reorders_committed_total: Family::default(),
            reorders_rolled_back_total: Family::default(),
            foreign_ids_skipped_total: Family::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "items_created",
            "Total number of ordered items created",
            metrics.items_created_total.clone(),
        );
        sub_registry.register(
            "items_deleted",
            "Total number of ordered items deleted",
            metrics.items_deleted_total.clone(),
        );
        sub_registry.register(
            "reorders_committed",
            "Total number of reorder transactions committed",
            metrics.reorders_committed_total.clone(),
        );
        sub_registry.register(
            "reorders_rolled_back",
            "Total number of reorder transactions rolled back",
            metrics.reorders_rolled_back_total.clone(),
        );
        sub_registry.register(
            "foreign_ids_skipped",
            "Total number of reorder ids skipped because another parent owns them",
            metrics.foreign_ids_skipped_total.clone(),
        );
        metrics
    }
}

pub static ORDERING_METRICS: OnceCell<OrderingMetrics> = OnceCell::const_new();
