use serde::{Deserialize, Serialize};

use rentwise_core::{DomainError, DomainResult, LocationId, VariantId};

/// A rentable SKU variant.
///
/// Only `price_per_day` matters to the engine, and only as a snapshot taken
/// when a reservation is created; later price edits never reach existing
/// reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    pub price_per_day: u64,
}

impl Variant {
    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        Ok(())
    }
}

/// Physical units of a variant, optionally held at one fulfillment location.
///
/// Changed only by administrative action, never by the reservation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPool {
    pub variant_id: VariantId,
    pub location: Option<LocationId>,
    pub capacity: i64,
}

impl InventoryPool {
    pub fn new(
        variant_id: VariantId,
        location: Option<LocationId>,
        capacity: i64,
    ) -> DomainResult<Self> {
        if capacity < 0 {
            return Err(DomainError::validation("capacity cannot be negative"));
        }
        Ok(Self {
            variant_id,
            location,
            capacity,
        })
    }
}

/// Capacity of a variant pooled across all of its locations.
pub fn pooled_capacity<'a>(pools: impl IntoIterator<Item = &'a InventoryPool>) -> i64 {
    pools.into_iter().map(|p| p.capacity).sum()
}
