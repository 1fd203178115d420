//! End-to-end tests of the engine over the in-memory ledger and catalog.
//!
//! Tests: cart → checkout → order/line transitions → availability
//!
//! Verifies:
//! - Availability reflects committed stock only, with half-open overlap
//! - Checkout is all-or-nothing and safe under concurrent checkouts
//! - Lifecycle transitions release capacity (fully or from the return time on)
//! - The fact log replays to the same state

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    use rentwise_core::{
        CartId, CustomerId, DateRange, DomainError, OrderId, ReservationId, VariantId,
    };
    use rentwise_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
    use rentwise_rentals::{
        Cart, CommittedSpan, InventoryPool, LedgerEvent, Order, OrderEvent, OrderStatus,
        OrderTransition, Owner, PaymentMethod, Reservation, ReservationEvent, ReservationStatus,
        StatusChange, Variant, peak_commitment,
    };

    use crate::catalog::InMemoryCatalog;
    use crate::config::EngineConfig;
    use crate::coordinator::{CartReservationCoordinator, Checkout, CheckoutError};
    use crate::engine::{AddToCart, ReservationEngine};
    use crate::error::StoreError;
    use crate::ledger::{InMemoryLedger, Promotion, ReservationLedger};
    use crate::payments::PaymentEvent;
    use crate::retry::RetryPolicy;

    fn jan(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn range(a: u32, b: u32) -> DateRange {
        DateRange::new(jan(a), jan(b)).unwrap()
    }

    /// When carts are filled and checked out; earlier than any rental period.
    fn booked_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap()
    }

    fn engine_with(capacity: i64) -> (Arc<ReservationEngine>, VariantId) {
        let engine = ReservationEngine::in_memory(EngineConfig {
            retry: RetryPolicy::fixed(5, Duration::from_millis(1)),
            ..EngineConfig::default()
        });
        let variant_id = VariantId::new();
        engine
            .register_variant(Variant {
                id: variant_id,
                sku: "KAYAK-2P".to_string(),
                size: None,
                color: Some("red".to_string()),
                price_per_day: 1000,
            })
            .unwrap();
        engine.set_pool(InventoryPool::new(variant_id, None, capacity).unwrap()).unwrap();
        (Arc::new(engine), variant_id)
    }

    fn add_variant(engine: &ReservationEngine, capacity: i64) -> VariantId {
        let variant_id = VariantId::new();
        engine
            .register_variant(Variant {
                id: variant_id,
                sku: format!("SKU-{variant_id}"),
                size: None,
                color: None,
                price_per_day: 500,
            })
            .unwrap();
        engine.set_pool(InventoryPool::new(variant_id, None, capacity).unwrap()).unwrap();
        variant_id
    }

    fn open(engine: &ReservationEngine) -> CartId {
        engine.open_cart(CustomerId::new()).unwrap().id_typed()
    }

    fn add(
        engine: &ReservationEngine,
        cart_id: CartId,
        variant_id: VariantId,
        quantity: i64,
        period: DateRange,
    ) -> Result<rentwise_rentals::Reservation, DomainError> {
        engine.add_to_cart(&AddToCart {
            occurred_at: booked_at(),
            ..AddToCart::new(cart_id, variant_id, quantity, period)
        })
    }

    fn checkout(engine: &ReservationEngine, cart_id: CartId) -> Result<Order, CheckoutError> {
        engine.checkout(&Checkout {
            occurred_at: booked_at(),
            ..Checkout::new(cart_id, PaymentMethod::Card)
        })
    }

    fn book(
        engine: &ReservationEngine,
        variant_id: VariantId,
        quantity: i64,
        period: DateRange,
    ) -> Result<Order, CheckoutError> {
        let cart_id = open(engine);
        add(engine, cart_id, variant_id, quantity, period)?;
        checkout(engine, cart_id)
    }

    fn confirm(engine: &ReservationEngine, order_id: OrderId) -> Order {
        engine
            .transition_order(order_id, OrderEvent::PaymentSucceeded, booked_at())
            .unwrap()
    }

    #[test]
    fn concrete_capacity_scenario() {
        let (engine, variant) = engine_with(5);
        let window = range(2, 3);

        book(&engine, variant, 3, range(1, 5)).unwrap();
        assert_eq!(engine.available(variant, &window).unwrap(), 2);

        // C sits in a cart while B is checked out.
        let late_cart = open(&engine);
        add(&engine, late_cart, variant, 1, range(1, 5)).unwrap();

        book(&engine, variant, 2, range(1, 5)).unwrap();
        assert_eq!(engine.available(variant, &window).unwrap(), 0);

        let err = add(&engine, open(&engine), variant, 1, range(1, 5)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                variant_id: variant,
                requested: 1,
                available: 0
            }
        );

        match checkout(&engine, late_cart).unwrap_err() {
            CheckoutError::InsufficientStock(lines) => {
                assert_eq!(lines.len(), 1);
                assert_eq!((lines[0].requested, lines[0].available), (1, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn back_to_back_rentals_do_not_overlap() {
        let (engine, variant) = engine_with(1);

        book(&engine, variant, 1, range(1, 5)).unwrap();
        book(&engine, variant, 1, range(5, 9)).unwrap();

        assert_eq!(engine.available(variant, &range(1, 9)).unwrap(), 0);
        assert_eq!(engine.available(variant, &range(9, 12)).unwrap(), 1);
    }

    #[test]
    fn disjoint_commitments_inside_one_window_do_not_add_up() {
        let (engine, variant) = engine_with(3);

        book(&engine, variant, 2, range(1, 3)).unwrap();
        book(&engine, variant, 2, range(5, 8)).unwrap();

        assert_eq!(engine.available(variant, &range(1, 10)).unwrap(), 1);
    }

    #[test]
    fn concurrent_checkouts_for_the_last_unit_admit_exactly_one() {
        for _ in 0..20 {
            let (engine, variant) = engine_with(1);
            let carts: Vec<CartId> = [range(1, 6), range(3, 9)]
                .into_iter()
                .map(|period| {
                    let cart_id = open(&engine);
                    add(&engine, cart_id, variant, 1, period).unwrap();
                    cart_id
                })
                .collect();

            let barrier = Arc::new(Barrier::new(carts.len()));
            let handles: Vec<_> = carts
                .into_iter()
                .map(|cart_id| {
                    let engine = Arc::clone(&engine);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        checkout(&engine, cart_id)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            for result in results.iter().filter_map(|r| r.as_ref().err()) {
                assert!(matches!(
                    result,
                    CheckoutError::InsufficientStock(_) | CheckoutError::ConcurrencyConflict { .. }
                ));
            }

            let horizon = range(1, 9);
            let spans = engine.ledger().active_overlapping(variant, &horizon).unwrap();
            assert!(peak_commitment(&spans, &horizon) <= 1);
        }
    }

    #[test]
    fn checkout_is_all_or_nothing() {
        let (engine, roomy) = engine_with(5);
        let scarce = add_variant(&engine, 2);

        let cart_id = open(&engine);
        add(&engine, cart_id, roomy, 1, range(1, 3)).unwrap();
        add(&engine, cart_id, scarce, 2, range(2, 6)).unwrap();

        // Someone else commits one scarce unit in the meantime.
        book(&engine, scarce, 1, range(4, 5)).unwrap();

        match checkout(&engine, cart_id).unwrap_err() {
            CheckoutError::InsufficientStock(lines) => {
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].variant_id, scarce);
                assert_eq!((lines[0].requested, lines[0].available), (2, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let lines = engine.cart_lines(cart_id).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.owner() == Owner::Cart(cart_id)));
        assert_eq!(engine.available(roomy, &range(1, 3)).unwrap(), 5);
    }

    #[test]
    fn empty_or_spent_cart_cannot_check_out() {
        let (engine, variant) = engine_with(2);
        let cart_id = open(&engine);
        assert_eq!(checkout(&engine, cart_id).unwrap_err(), CheckoutError::EmptyCart);

        add(&engine, cart_id, variant, 1, range(1, 3)).unwrap();
        checkout(&engine, cart_id).unwrap();
        assert_eq!(checkout(&engine, cart_id).unwrap_err(), CheckoutError::EmptyCart);
        assert!(matches!(
            add(&engine, cart_id, variant, 1, range(1, 3)),
            Err(DomainError::OwnerConflict(_))
        ));
    }

    #[test]
    fn cancelling_releases_exactly_what_was_reserved() {
        let (engine, variant) = engine_with(4);
        let window = range(10, 12);
        book(&engine, variant, 1, range(8, 11)).unwrap();

        let before = engine.available(variant, &window).unwrap();
        let order = book(&engine, variant, 3, range(10, 14)).unwrap();
        assert_eq!(engine.available(variant, &window).unwrap(), before - 3);

        let cancelled = engine
            .transition_order(order.id_typed(), OrderEvent::Cancel, booked_at())
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert!(engine
            .order_lines(order.id_typed())
            .unwrap()
            .iter()
            .all(|l| l.status() == ReservationStatus::Cancelled));
        assert_eq!(engine.available(variant, &window).unwrap(), before);
    }

    #[test]
    fn removed_cart_line_is_kept_as_cancelled() {
        let (engine, variant) = engine_with(2);
        let cart_id = open(&engine);
        let line = add(&engine, cart_id, variant, 1, range(1, 3)).unwrap();

        let removed = engine.remove_from_cart(cart_id, line.id_typed()).unwrap();
        assert_eq!(removed.status(), ReservationStatus::Cancelled);
        assert!(engine.cart_lines(cart_id).unwrap().is_empty());
        assert_eq!(checkout(&engine, cart_id).unwrap_err(), CheckoutError::EmptyCart);

        let other = open(&engine);
        assert!(matches!(
            engine.remove_from_cart(other, line.id_typed()),
            Err(DomainError::OwnerConflict(_))
        ));
    }

    #[test]
    fn early_return_releases_the_tail() {
        let (engine, variant) = engine_with(2);
        let order = book(&engine, variant, 2, range(1, 10)).unwrap();
        confirm(&engine, order.id_typed());
        let line = order.line_ids()[0];

        engine.transition_reservation(line, ReservationEvent::Distribute, jan(1)).unwrap();
        let recovered = engine
            .transition_reservation(line, ReservationEvent::Recover, jan(5))
            .unwrap();
        assert_eq!(recovered.status(), ReservationStatus::Recovered);

        assert_eq!(engine.available(variant, &range(6, 10)).unwrap(), 2);
        assert_eq!(engine.available(variant, &range(1, 5)).unwrap(), 0);
    }

    #[test]
    fn distribution_needs_confirmation_and_blocks_cancellation() {
        let (engine, variant) = engine_with(1);
        let order = book(&engine, variant, 1, range(1, 10)).unwrap();
        let line = order.line_ids()[0];

        let err = engine
            .transition_reservation(line, ReservationEvent::Distribute, jan(1))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

        confirm(&engine, order.id_typed());
        engine.transition_reservation(line, ReservationEvent::Distribute, jan(1)).unwrap();

        let err = engine
            .transition_reservation(line, ReservationEvent::Cancel, jan(2))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));
        assert_eq!(engine.reservation(line).unwrap().status(), ReservationStatus::Distributed);
    }

    #[test]
    fn refund_after_distribution_frees_from_refund_time() {
        let (engine, variant) = engine_with(1);
        let order = book(&engine, variant, 1, range(1, 10)).unwrap();
        confirm(&engine, order.id_typed());
        let line = order.line_ids()[0];
        engine.transition_reservation(line, ReservationEvent::Distribute, jan(1)).unwrap();

        let refunded = engine
            .transition_order(order.id_typed(), OrderEvent::Refund, jan(4))
            .unwrap();
        assert_eq!(refunded.status(), OrderStatus::Refunded);
        assert_eq!(engine.reservation(line).unwrap().status(), ReservationStatus::Refunded);

        assert_eq!(engine.available(variant, &range(1, 4)).unwrap(), 0);
        assert_eq!(engine.available(variant, &range(4, 10)).unwrap(), 1);
    }

    #[test]
    fn order_completes_only_after_every_line_is_back() {
        let (engine, variant) = engine_with(1);
        let order = book(&engine, variant, 1, range(1, 5)).unwrap();
        confirm(&engine, order.id_typed());
        let line = order.line_ids()[0];

        assert!(engine
            .transition_order(order.id_typed(), OrderEvent::Complete, jan(1))
            .is_err());

        engine.transition_reservation(line, ReservationEvent::Distribute, jan(1)).unwrap();
        engine.transition_reservation(line, ReservationEvent::Recover, jan(5)).unwrap();
        let completed = engine
            .transition_order(order.id_typed(), OrderEvent::Complete, jan(6))
            .unwrap();
        assert_eq!(completed.status(), OrderStatus::Completed);
    }

    #[test]
    fn order_total_uses_price_snapshot() {
        let (engine, variant) = engine_with(3);
        // 2 units × 3 days × 1000
        let order = book(&engine, variant, 2, range(1, 4)).unwrap();
        assert_eq!(order.total(), 6000);

        engine
            .register_variant(Variant {
                id: variant,
                sku: "KAYAK-2P".to_string(),
                size: None,
                color: Some("red".to_string()),
                price_per_day: 9999,
            })
            .unwrap();
        assert_eq!(engine.order(order.id_typed()).unwrap().total(), 6000);
    }

    #[test]
    fn payment_worker_drives_order_status() {
        let (engine, variant) = engine_with(2);
        let paid = book(&engine, variant, 1, range(1, 5)).unwrap();
        let declined = book(&engine, variant, 1, range(1, 5)).unwrap();
        assert_eq!(engine.available(variant, &range(1, 5)).unwrap(), 0);

        let bus = Arc::new(InMemoryEventBus::<PaymentEvent>::new());
        let worker = engine.spawn_payment_worker(Arc::clone(&bus)).unwrap();

        let succeeded = PaymentEvent::Succeeded {
            order_id: paid.id_typed(),
            occurred_at: booked_at(),
        };
        bus.publish(succeeded.clone()).unwrap();
        // At-least-once delivery: the duplicate must be harmless.
        bus.publish(succeeded).unwrap();
        bus.publish(PaymentEvent::Failed {
            order_id: declined.id_typed(),
            reason: "card declined".to_string(),
            occurred_at: booked_at(),
        })
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.order(declined.id_typed()).unwrap().status() != OrderStatus::Failed
            && std::time::Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(5));
        }
        worker.shutdown();

        assert_eq!(engine.order(paid.id_typed()).unwrap().status(), OrderStatus::Confirmed);
        assert_eq!(engine.order(declined.id_typed()).unwrap().status(), OrderStatus::Failed);
        assert_eq!(engine.available(variant, &range(1, 5)).unwrap(), 1);
    }

    #[test]
    fn fact_log_replays_to_the_same_availability() {
        let (engine, variant) = engine_with(3);
        book(&engine, variant, 1, range(1, 5)).unwrap();
        let before_second = engine.ledger().head().unwrap();
        let order = book(&engine, variant, 2, range(2, 6)).unwrap();
        confirm(&engine, order.id_typed());

        let window = range(1, 6);
        let replayed = InMemoryLedger::replay(engine.ledger().facts().unwrap());
        assert_eq!(
            replayed.active_overlapping(variant, &window).unwrap(),
            engine.ledger().active_overlapping(variant, &window).unwrap()
        );
        let replayed_order = replayed.order(order.id_typed()).unwrap().unwrap();
        assert_eq!(replayed_order.status(), OrderStatus::Confirmed);

        let past = engine.ledger().as_of(before_second).unwrap();
        assert_eq!(past.active_overlapping(variant, &window).unwrap().len(), 1);
        assert!(past.order(order.id_typed()).unwrap().is_none());
    }

    #[test]
    fn order_history_records_each_fact() {
        let (engine, variant) = engine_with(1);
        let order = book(&engine, variant, 1, range(1, 5)).unwrap();
        confirm(&engine, order.id_typed());

        let types: Vec<_> = engine
            .history(*order.id_typed().as_uuid())
            .unwrap()
            .iter()
            .map(|env| env.payload().event_type())
            .collect();
        assert_eq!(types, vec!["rental.order.placed", "rental.order.status_changed"]);
    }

    type Hook = Box<dyn FnOnce() + Send>;

    /// An in-memory ledger that lets a test slip another writer in between
    /// an engine's read and its write, or refuse every promotion.
    struct InterleavingLedger {
        inner: Arc<InMemoryLedger>,
        after_next_read: Mutex<Option<Hook>>,
        refuse_promotions: bool,
        promotions: AtomicU32,
    }

    impl InterleavingLedger {
        fn new(inner: Arc<InMemoryLedger>, refuse_promotions: bool) -> Self {
            Self {
                inner,
                after_next_read: Mutex::new(None),
                refuse_promotions,
                promotions: AtomicU32::new(0),
            }
        }

        /// Run `hook` right after the next single-reservation read returns.
        fn after_next_read(&self, hook: impl FnOnce() + Send + 'static) {
            *self.after_next_read.lock().unwrap() = Some(Box::new(hook));
        }
    }

    impl ReservationLedger for InterleavingLedger {
        fn open_cart(&self, cart: Cart) -> Result<Cart, StoreError> {
            self.inner.open_cart(cart)
        }

        fn cart(&self, cart_id: CartId) -> Result<Option<Cart>, StoreError> {
            self.inner.cart(cart_id)
        }

        fn append(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
            self.inner.append(reservation)
        }

        fn set_status(&self, change: StatusChange) -> Result<Reservation, StoreError> {
            self.inner.set_status(change)
        }

        fn active_overlapping(
            &self,
            variant_id: VariantId,
            window: &DateRange,
        ) -> Result<Vec<CommittedSpan>, StoreError> {
            self.inner.active_overlapping(variant_id, window)
        }

        fn committed_snapshot(
            &self,
            variant_id: VariantId,
            window: &DateRange,
        ) -> Result<(u64, Vec<CommittedSpan>), StoreError> {
            self.inner.committed_snapshot(variant_id, window)
        }

        fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
            let read = self.inner.reservation(id);
            let hook = self.after_next_read.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            read
        }

        fn reservations_owned_by(&self, owner: Owner) -> Result<Vec<Reservation>, StoreError> {
            self.inner.reservations_owned_by(owner)
        }

        fn promote(&self, promotion: Promotion) -> Result<Order, StoreError> {
            self.promotions.fetch_add(1, Ordering::SeqCst);
            if self.refuse_promotions {
                return Err(StoreError::Concurrency(format!(
                    "variant moved under cart {}",
                    promotion.cart_id
                )));
            }
            self.inner.promote(promotion)
        }

        fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.order(order_id)
        }

        fn apply_order_transition(&self, transition: OrderTransition) -> Result<Order, StoreError> {
            self.inner.apply_order_transition(transition)
        }

        fn history(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope<LedgerEvent>>, StoreError> {
            self.inner.history(stream_id)
        }
    }

    type InterleavedEngine = ReservationEngine<Arc<InterleavingLedger>, Arc<InMemoryCatalog>>;

    fn interleaved_engine(
        ledger: Arc<InterleavingLedger>,
        max_retries: u32,
    ) -> (InterleavedEngine, VariantId, CartId, Reservation) {
        let engine = ReservationEngine::new(
            ledger,
            Arc::new(InMemoryCatalog::new()),
            EngineConfig {
                retry: RetryPolicy::fixed(max_retries, Duration::from_millis(1)),
                ..EngineConfig::default()
            },
        );
        let variant_id = VariantId::new();
        engine
            .register_variant(Variant {
                id: variant_id,
                sku: "SUP-BOARD".to_string(),
                size: None,
                color: None,
                price_per_day: 100,
            })
            .unwrap();
        engine.set_pool(InventoryPool::new(variant_id, None, 2).unwrap()).unwrap();

        let cart_id = engine.open_cart(CustomerId::new()).unwrap().id_typed();
        let line = engine
            .add_to_cart(&AddToCart {
                occurred_at: booked_at(),
                ..AddToCart::new(cart_id, variant_id, 1, range(3, 6))
            })
            .unwrap();
        (engine, variant_id, cart_id, line)
    }

    #[test]
    fn removal_racing_a_checkout_leaves_the_order_intact() {
        let inner = Arc::new(InMemoryLedger::new());
        let ledger = Arc::new(InterleavingLedger::new(Arc::clone(&inner), false));
        let (engine, _, cart_id, line) = interleaved_engine(Arc::clone(&ledger), 5);

        // The cart is checked out right after removal reads the line.
        let coordinator = CartReservationCoordinator::new(
            Arc::clone(&inner),
            Arc::clone(engine.catalog()),
            RetryPolicy::fixed(0, Duration::ZERO),
        );
        let order_id = OrderId::new();
        ledger.after_next_read(move || {
            coordinator
                .checkout(&Checkout {
                    order_id,
                    occurred_at: booked_at(),
                    ..Checkout::new(cart_id, PaymentMethod::Card)
                })
                .unwrap();
        });

        let err = engine.remove_from_cart(cart_id, line.id_typed()).unwrap_err();
        assert!(matches!(err, DomainError::OwnerConflict(_)));

        let order = engine.order(order_id).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total(), 300);
        let line = engine.reservation(line.id_typed()).unwrap();
        assert_eq!(line.owner(), Owner::Order(order_id));
        assert_eq!(line.status(), ReservationStatus::Pending);
    }

    #[test]
    fn removing_a_line_of_another_cart_is_refused() {
        let (engine, variant) = engine_with(2);
        let cart_id = open(&engine);
        let line = add(&engine, cart_id, variant, 1, range(3, 6)).unwrap();

        let err = engine.remove_from_cart(open(&engine), line.id_typed()).unwrap_err();
        assert!(matches!(err, DomainError::OwnerConflict(_)));
        assert_eq!(engine.cart_lines(cart_id).unwrap().len(), 1);
    }

    #[test]
    fn checkout_gives_up_after_bounded_conflicts() {
        let inner = Arc::new(InMemoryLedger::new());
        let ledger = Arc::new(InterleavingLedger::new(Arc::clone(&inner), true));
        let (engine, variant_id, cart_id, line) = interleaved_engine(Arc::clone(&ledger), 3);

        let err = engine
            .checkout(&Checkout {
                occurred_at: booked_at(),
                ..Checkout::new(cart_id, PaymentMethod::Card)
            })
            .unwrap_err();
        assert_eq!(err, CheckoutError::ConcurrencyConflict { attempts: 4 });
        assert_eq!(ledger.promotions.load(Ordering::SeqCst), 4);

        let lines = engine.cart_lines(cart_id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id_typed(), line.id_typed());
        assert_eq!(lines[0].owner(), Owner::Cart(cart_id));
        assert_eq!(lines[0].status(), ReservationStatus::Pending);
        assert!(inner.active_overlapping(variant_id, &range(1, 9)).unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Book { quantity: i64, start: u32, days: u32 },
        Cancel(usize),
        Return { order: usize, after_days: u32 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..4, 1u32..20, 1u32..8)
                .prop_map(|(quantity, start, days)| Op::Book { quantity, start, days }),
            (0usize..16).prop_map(Op::Cancel),
            (0usize..16, 0u32..8).prop_map(|(order, after_days)| Op::Return { order, after_days }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: whatever mix of bookings, cancellations and early returns
        /// happens, committed units never exceed capacity at any instant.
        #[test]
        fn committed_stock_never_exceeds_capacity(ops in prop::collection::vec(op(), 1..24)) {
            let capacity = 4;
            let (engine, variant) = engine_with(capacity);
            let mut orders: Vec<Order> = Vec::new();

            for op in ops {
                match op {
                    Op::Book { quantity, start, days } => {
                        let period = range(start, start + days);
                        if let Ok(order) = book(&engine, variant, quantity, period) {
                            orders.push(order);
                        }
                    }
                    Op::Cancel(i) if !orders.is_empty() => {
                        let order = &orders[i % orders.len()];
                        let _ = engine.transition_order(
                            order.id_typed(),
                            OrderEvent::Cancel,
                            booked_at(),
                        );
                    }
                    Op::Return { order, after_days } if !orders.is_empty() => {
                        let order = &orders[order % orders.len()];
                        let _ = engine.transition_order(
                            order.id_typed(),
                            OrderEvent::PaymentSucceeded,
                            booked_at(),
                        );
                        for line in engine.order_lines(order.id_typed()).unwrap() {
                            let start = line.period().start();
                            let _ = engine.transition_reservation(
                                line.id_typed(),
                                ReservationEvent::Distribute,
                                start,
                            );
                            let _ = engine.transition_reservation(
                                line.id_typed(),
                                ReservationEvent::Recover,
                                start + chrono::Duration::days(i64::from(after_days)),
                            );
                        }
                    }
                    _ => {}
                }

                let horizon = range(1, 28);
                let spans = engine.ledger().active_overlapping(variant, &horizon).unwrap();
                prop_assert!(peak_commitment(&spans, &horizon) <= capacity);
            }
        }
    }
}
