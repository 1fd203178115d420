//! Contention simulator.
//!
//! Seeds one variant, lets many customers fill carts with overlapping rental
//! periods, releases all of their checkouts at once and then verifies that
//! the committed stock never exceeds capacity at any instant.
//!
//! Knobs: `RENTWISE_SIM_CUSTOMERS` (default 16), `RENTWISE_SIM_CAPACITY`
//! (default 3), plus the engine's own `RENTWISE_*` settings.

use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::{Context, bail};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;

use rentwise_core::{CustomerId, DateRange, DomainError, VariantId};
use rentwise_infra::{
    AddToCart, Checkout, CheckoutError, EngineConfig, ReservationEngine, ReservationLedger,
};
use rentwise_rentals::{InventoryPool, PaymentMethod, Variant, peak_commitment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed,
    RejectedAtCart,
    InsufficientStock,
    Conflict,
    Failed,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    customers: usize,
    capacity: i64,
    committed: usize,
    rejected_at_cart: usize,
    insufficient_stock: usize,
    conflicts: usize,
    failed: usize,
    peak_committed: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn main() -> anyhow::Result<()> {
    rentwise_observability::init();

    let customers: usize = env_or("RENTWISE_SIM_CUSTOMERS", 16);
    let capacity: i64 = env_or("RENTWISE_SIM_CAPACITY", 3);
    let config = EngineConfig::from_env();
    tracing::info!(customers, capacity, retry = ?config.retry, "starting simulation");

    let engine = Arc::new(ReservationEngine::in_memory(config));
    let variant_id = VariantId::new();
    engine.register_variant(Variant {
        id: variant_id,
        sku: "SIM-TENT".to_string(),
        size: Some("2p".to_string()),
        color: None,
        price_per_day: 1500,
    })?;
    engine.set_pool(InventoryPool::new(variant_id, None, capacity)?)?;

    let base: DateTime<Utc> = Utc
        .with_ymd_and_hms(2030, 6, 1, 0, 0, 0)
        .single()
        .context("simulation start date")?;
    let horizon = DateRange::new(base, base + Duration::days(30))?;

    let barrier = Arc::new(Barrier::new(customers));
    let handles: Vec<_> = (0..customers)
        .map(|n| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::Builder::new()
                .name(format!("customer-{n}"))
                .spawn(move || customer(&engine, &barrier, variant_id, base))
        })
        .collect::<Result<_, _>>()
        .context("spawning customer threads")?;

    let mut summary = Summary {
        customers,
        capacity,
        ..Summary::default()
    };
    for handle in handles {
        let outcome = handle
            .join()
            .map_err(|_| anyhow::anyhow!("customer thread panicked"))?;
        match outcome {
            Outcome::Committed => summary.committed += 1,
            Outcome::RejectedAtCart => summary.rejected_at_cart += 1,
            Outcome::InsufficientStock => summary.insufficient_stock += 1,
            Outcome::Conflict => summary.conflicts += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }

    let spans = engine.ledger().active_overlapping(variant_id, &horizon)?;
    summary.peak_committed = peak_commitment(&spans, &horizon);

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.peak_committed > capacity {
        bail!(
            "capacity invariant violated: {} units committed at once, capacity {}",
            summary.peak_committed,
            capacity
        );
    }
    tracing::info!(peak = summary.peak_committed, "capacity invariant holds");
    Ok(())
}

fn customer(
    engine: &ReservationEngine,
    barrier: &Barrier,
    variant_id: VariantId,
    base: DateTime<Utc>,
) -> Outcome {
    let mut rng = rand::thread_rng();
    let start = base + Duration::days(rng.gen_range(0..20));
    let period = DateRange::new(start, start + Duration::days(rng.gen_range(1..7)));
    let quantity = rng.gen_range(1..=2);

    let prepared = engine
        .open_cart(CustomerId::new())
        .and_then(|cart| {
            let period = period?;
            engine.add_to_cart(&AddToCart::new(cart.id_typed(), variant_id, quantity, period))?;
            Ok(cart)
        });

    // Everyone waits, so the checkouts below really do race.
    barrier.wait();

    let cart = match prepared {
        Ok(cart) => cart,
        Err(DomainError::InsufficientStock { .. }) => return Outcome::RejectedAtCart,
        Err(err) => {
            tracing::warn!(error = %err, "could not fill cart");
            return Outcome::Failed;
        }
    };

    match engine.checkout(&Checkout::new(cart.id_typed(), PaymentMethod::Card)) {
        Ok(_) => Outcome::Committed,
        Err(CheckoutError::InsufficientStock(lines)) => {
            for line in &lines {
                tracing::debug!(error = %line.to_error(), "line rejected at checkout");
            }
            Outcome::InsufficientStock
        }
        Err(CheckoutError::ConcurrencyConflict { .. }) => Outcome::Conflict,
        Err(err) => {
            tracing::warn!(error = %err, "checkout failed");
            Outcome::Failed
        }
    }
}
