//! Variant catalog and per-location inventory pools.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rentwise_core::{LocationId, VariantId};
use rentwise_rentals::{InventoryPool, Variant, pooled_capacity};

use crate::error::StoreError;

/// Read/write access to rentable variants and their physical stock.
///
/// Capacity is configuration: it only changes when an operator resizes a
/// pool, never as a side effect of reservations.
pub trait Catalog: Send + Sync {
    fn upsert_variant(&self, variant: Variant) -> Result<(), StoreError>;

    fn variant(&self, variant_id: VariantId) -> Result<Option<Variant>, StoreError>;

    /// Create or replace the pool for `(variant, location)`.
    fn set_pool(&self, pool: InventoryPool) -> Result<(), StoreError>;

    fn pools(&self, variant_id: VariantId) -> Result<Vec<InventoryPool>, StoreError>;

    /// Total units across every location.
    fn capacity(&self, variant_id: VariantId) -> Result<i64, StoreError> {
        Ok(pooled_capacity(&self.pools(variant_id)?))
    }
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn upsert_variant(&self, variant: Variant) -> Result<(), StoreError> {
        (**self).upsert_variant(variant)
    }

    fn variant(&self, variant_id: VariantId) -> Result<Option<Variant>, StoreError> {
        (**self).variant(variant_id)
    }

    fn set_pool(&self, pool: InventoryPool) -> Result<(), StoreError> {
        (**self).set_pool(pool)
    }

    fn pools(&self, variant_id: VariantId) -> Result<Vec<InventoryPool>, StoreError> {
        (**self).pools(variant_id)
    }

    fn capacity(&self, variant_id: VariantId) -> Result<i64, StoreError> {
        (**self).capacity(variant_id)
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    variants: HashMap<VariantId, Variant>,
    pools: HashMap<VariantId, HashMap<Option<LocationId>, InventoryPool>>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Catalog for InMemoryCatalog {
    fn upsert_variant(&self, variant: Variant) -> Result<(), StoreError> {
        variant.validate().map_err(|e| StoreError::Invalid(e.to_string()))?;
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned("catalog"))?;
        state.variants.insert(variant.id, variant);
        Ok(())
    }

    fn variant(&self, variant_id: VariantId) -> Result<Option<Variant>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned("catalog"))?;
        Ok(state.variants.get(&variant_id).cloned())
    }

    fn set_pool(&self, pool: InventoryPool) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned("catalog"))?;
        if !state.variants.contains_key(&pool.variant_id) {
            return Err(StoreError::NotFound(format!("variant {}", pool.variant_id)));
        }
        if pool.capacity < 0 {
            return Err(StoreError::Invalid(format!(
                "capacity must be non-negative, got {}",
                pool.capacity
            )));
        }
        state
            .pools
            .entry(pool.variant_id)
            .or_default()
            .insert(pool.location, pool);
        Ok(())
    }

    fn pools(&self, variant_id: VariantId) -> Result<Vec<InventoryPool>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned("catalog"))?;
        Ok(state
            .pools
            .get(&variant_id)
            .map(|by_location| by_location.values().cloned().collect())
            .unwrap_or_default())
    }
}
