use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{GangsheetError, Result};
use crate::types::{DesignItem, OrderId};

/// A design bound to an order line, as returned by the design lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignRecord {
    pub order_id: OrderId,
    pub line_index: u32,
    pub design_item_id: String,
    pub product_id: Option<String>,
    pub group_key: Option<String>,
    pub width_px: u32,
    pub height_px: u32,
    pub image_url: String,
}

pub trait DesignLookup: Send + Sync {
    fn design_items_for_orders(
        &self,
        tenant_id: &str,
        order_ids: &[OrderId],
        product_filter: Option<&[String]>,
    ) -> Result<Vec<DesignRecord>>;
}

/// A design excluded because its pixel dimensions are not positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedItem {
    pub design_item_id: String,
    pub order_id: OrderId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub items: Vec<DesignItem>,
    pub unresolved_order_ids: Vec<OrderId>,
    pub rejected: Vec<RejectedItem>,
}

pub fn extract(
    lookup: &dyn DesignLookup,
    tenant_id: &str,
    order_ids: &[OrderId],
    product_filter: Option<&[String]>,
) -> Result<Extraction> {
    if tenant_id.is_empty() {
        return Err(GangsheetError::MissingTenant);
    }
    if order_ids.is_empty() {
        return Err(GangsheetError::Validation("orderIds must not be empty".into()));
    }
    let requested: BTreeSet<OrderId> = order_ids.iter().copied().collect();
    let requested: Vec<OrderId> = requested.into_iter().collect();

    let mut records = lookup.design_items_for_orders(tenant_id, &requested, product_filter)?;
    records.retain(|r| requested.binary_search(&r.order_id).is_ok());
    records.sort_by_key(|r| (r.order_id, r.line_index));

    let mut extraction = Extraction::default();
    let mut resolved = BTreeSet::new();
    for r in records {
        if r.width_px == 0 || r.height_px == 0 {
            extraction.rejected.push(RejectedItem {
                design_item_id: r.design_item_id,
                order_id: r.order_id,
                reason: format!("invalid pixel size {}x{}", r.width_px, r.height_px),
            });
            continue;
        }
        resolved.insert(r.order_id);
        extraction.items.push(DesignItem {
            id: r.design_item_id,
            order_id: r.order_id,
            group_key: r.group_key,
            width_px: r.width_px,
            height_px: r.height_px,
            image_url: r.image_url,
        });
    }

    extraction.unresolved_order_ids = requested
        .into_iter()
        .filter(|id| !resolved.contains(id))
        .collect();

    if !extraction.unresolved_order_ids.is_empty() {
        tracing::warn!(
            tenant = tenant_id,
            unresolved = ?extraction.unresolved_order_ids,
            "orders without resolvable designs"
        );
    }
    if !extraction.rejected.is_empty() {
        tracing::warn!(
            tenant = tenant_id,
            rejected = extraction.rejected.len(),
            "designs rejected for invalid dimensions"
        );
    }
    Ok(extraction)
}

#[derive(Default)]
pub struct InMemoryDesignLookup {
    by_tenant: RwLock<HashMap<String, Vec<DesignRecord>>>,
}

impl InMemoryDesignLookup {
    /// Loads records from a JSON object keyed by tenant id.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let by_tenant: HashMap<String, Vec<DesignRecord>> = serde_json::from_str(json)?;
        Ok(Self {
            by_tenant: RwLock::new(by_tenant),
        })
    }

    pub fn insert(&self, tenant_id: &str, record: DesignRecord) {
        self.by_tenant
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .push(record);
    }
}

impl DesignLookup for InMemoryDesignLookup {
    fn design_items_for_orders(
        &self,
        tenant_id: &str,
        order_ids: &[OrderId],
        product_filter: Option<&[String]>,
    ) -> Result<Vec<DesignRecord>> {
        let guard = self.by_tenant.read();
        let Some(records) = guard.get(tenant_id) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|r| order_ids.contains(&r.order_id))
            .filter(|r| match (product_filter, &r.product_id) {
                (None, _) => true,
                (Some(filter), Some(product)) => filter.contains(product),
                (Some(_), None) => false,
            })
            .cloned()
            .collect())
    }
}
