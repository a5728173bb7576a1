//! Envelope dispatch.

use crate::registry::Registry;
use livefeed_protocol::Envelope;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

/// Result of dispatching one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

impl DispatchOutcome {
    /// Whether the envelope reached no callback at all.
    #[must_use]
    pub fn is_unrouted(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

/// Routes decoded envelopes to the callbacks registered for their category.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Invoke every callback registered for the envelope's category.
    ///
    /// Callbacks run synchronously in registration order. The callback list
    /// is captured before the first invocation: entries added during
    /// dispatch see the next envelope, entries removed during dispatch are
    /// skipped if not yet reached. A panicking callback is logged and does
    /// not prevent the others from running.
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let Some(category) = envelope.category() else {
            trace!(kind = envelope.payload.kind(), "No route for envelope");
            return outcome;
        };

        for entry in self.registry.snapshot(category) {
            if !entry.is_active() {
                continue;
            }

            let callback = &entry.callback;
            match catch_unwind(AssertUnwindSafe(|| callback(&envelope.payload))) {
                Ok(()) => outcome.delivered += 1,
                Err(panic) => {
                    outcome.failed += 1;
                    error!(
                        category = %category,
                        subscription = entry.id,
                        reason = panic_message(&*panic),
                        "Subscriber callback panicked"
                    );
                }
            }
        }

        trace!(
            category = %category,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "Dispatched envelope"
        );
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Subscription;
    use livefeed_protocol::{codec, Category, Payload};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn order_envelope(id: &str) -> Envelope {
        let frame = serde_json::json!({
            "type": "order",
            "data": {
                "clientOrderId": id,
                "symbol": "BTCUSDT",
                "side": "BUY",
                "status": "FILLED"
            },
            "timestamp": 1
        });
        codec::decode_text(&frame.to_string()).unwrap()
    }

    fn other_envelope() -> Envelope {
        codec::decode_text(r#"{"type":"funding","data":{},"timestamp":1}"#).unwrap()
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry.subscribe(Category::Order, move |_| seen.lock().unwrap().push(tag));
        }

        let outcome = dispatcher.dispatch(&order_envelope("o-1"));
        assert_eq!(outcome.delivered, 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dispatch_only_matching_category() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let risk_calls = Arc::new(AtomicUsize::new(0));

        let calls = Arc::clone(&risk_calls);
        registry.subscribe(Category::Risk, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = dispatcher.dispatch(&order_envelope("o-1"));
        assert!(outcome.is_unrouted());
        assert_eq!(risk_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_unknown_category_is_dropped() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        for category in Category::ALL {
            registry.subscribe(category, |_| panic!("should not be called"));
        }

        let outcome = dispatcher.dispatch(&other_envelope());
        assert!(outcome.is_unrouted());
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let after = Arc::new(AtomicUsize::new(0));

        registry.subscribe(Category::Order, |_| panic!("boom"));
        let calls = Arc::clone(&after);
        registry.subscribe(Category::Order, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = dispatcher.dispatch(&order_envelope("o-1"));
        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 1 });
        assert_eq!(after.load(Ordering::SeqCst), 1);

        // The panicking entry stays registered.
        let outcome = dispatcher.dispatch(&order_envelope("o-2"));
        assert_eq!(outcome.failed, 1);
        assert_eq!(after.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_unsubscribes_itself_mid_dispatch() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let own: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let slot = Arc::clone(&own);
        let calls = Arc::clone(&first_calls);
        let sub = registry.subscribe(Category::Order, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *own.lock().unwrap() = Some(sub);

        let calls = Arc::clone(&second_calls);
        registry.subscribe(Category::Order, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&order_envelope("o-1"));
        dispatcher.dispatch(&order_envelope("o-2"));

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_removing_later_entry_skips_it() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let victim_calls = Arc::new(AtomicUsize::new(0));

        let slot = Arc::clone(&victim);
        registry.subscribe(Category::Order, move |_| {
            if let Some(sub) = slot.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        let calls = Arc::clone(&victim_calls);
        let sub = registry.subscribe(Category::Order, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        *victim.lock().unwrap() = Some(sub);

        let outcome = dispatcher.dispatch(&order_envelope("o-1"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(victim_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_subscribing_mid_dispatch_sees_next_envelope() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let late_calls = Arc::new(AtomicUsize::new(0));

        let reg = Arc::clone(&registry);
        let calls = Arc::clone(&late_calls);
        let added = Arc::new(AtomicUsize::new(0));
        registry.subscribe(Category::Order, move |_| {
            if added.fetch_add(1, Ordering::SeqCst) == 0 {
                let calls = Arc::clone(&calls);
                reg.subscribe(Category::Order, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        let outcome = dispatcher.dispatch(&order_envelope("o-1"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        let outcome = dispatcher.dispatch(&order_envelope("o-2"));
        assert_eq!(outcome.delivered, 2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_typed_subscription_receives_payload() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let ids = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&ids);
        registry.subscribe_to::<livefeed_protocol::OrderUpdate, _>(move |order| {
            seen.lock().unwrap().push(order.client_order_id.clone());
        });

        dispatcher.dispatch(&order_envelope("o-7"));
        assert_eq!(*ids.lock().unwrap(), vec!["o-7".to_string()]);
    }

    #[test]
    fn test_payload_passed_by_reference() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        registry.subscribe(Category::Order, |payload| {
            assert!(matches!(payload, Payload::Order(_)));
        });

        let outcome = dispatcher.dispatch(&order_envelope("o-1"));
        assert_eq!(outcome.failed, 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::sync::Weak;

        #[derive(Debug, Clone)]
        enum Op {
            Subscribe(Category),
            /// Subscriber that unsubscribes an earlier entry (or itself) each time it runs.
            SubscribeRemover { category: Category, victim: usize },
            /// Subscriber that registers a plain entry each time it runs.
            SubscribeAdder { category: Category, added: Category },
            Unsubscribe(usize),
            UnsubscribeAll,
            Dispatch(Category),
        }

        #[derive(Debug, Clone, Copy)]
        enum Kind {
            Plain,
            Remover(usize),
            Adder(Category),
        }

        #[derive(Debug)]
        struct ModelEntry {
            category: Category,
            kind: Kind,
            alive: bool,
        }

        type Slots = Arc<Mutex<Vec<Subscription>>>;
        type Log = Arc<Mutex<Vec<usize>>>;

        fn category() -> impl Strategy<Value = Category> {
            prop::sample::select(Category::ALL.to_vec())
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => category().prop_map(Op::Subscribe),
                1 => (category(), any::<usize>())
                    .prop_map(|(category, victim)| Op::SubscribeRemover { category, victim }),
                1 => (category(), category())
                    .prop_map(|(category, added)| Op::SubscribeAdder { category, added }),
                2 => any::<usize>().prop_map(Op::Unsubscribe),
                1 => Just(Op::UnsubscribeAll),
                3 => category().prop_map(Op::Dispatch),
            ]
        }

        fn envelope_for(category: Category) -> Envelope {
            let risk = serde_json::json!({
                "consecutiveLosses": 0,
                "maxConsecutiveLosses": 5,
                "macroCoolingMode": "inactive",
                "leverageStatus": "relaxed",
                "maxLeverage": "2.0",
                "currentLeverage": "1.0"
            });
            let data = match category {
                Category::Order => return order_envelope("o-1"),
                Category::Risk => risk,
                Category::Dashboard => serde_json::json!({
                    "pnlDaily": "0",
                    "pnlPercent": "0",
                    "totalEquity": "0",
                    "riskExposure": "0",
                    "dailyDrawdown": "0",
                    "systemHealth": [],
                    "riskStatus": risk,
                    "strategies": []
                }),
            };
            let frame =
                serde_json::json!({"type": category.as_str(), "data": data, "timestamp": 1});
            codec::decode_text(&frame.to_string()).unwrap()
        }

        /// Register a recorder for the next slot. Returns the slot.
        fn register(
            registry: &Arc<Registry>,
            slots: &Slots,
            log: &Log,
            category: Category,
            kind: Kind,
        ) -> usize {
            let mut guard = slots.lock().unwrap();
            let slot = guard.len();
            let log = Arc::clone(log);
            let own_slots = Arc::downgrade(slots);
            let own_registry = Arc::downgrade(registry);
            let own_log = Arc::clone(&log);

            let sub = registry.subscribe(category, move |_| {
                log.lock().unwrap().push(slot);
                run_effect(kind, &own_registry, &own_slots, &own_log);
            });
            guard.push(sub);
            slot
        }

        fn run_effect(
            kind: Kind,
            registry: &Weak<Registry>,
            slots: &Weak<Mutex<Vec<Subscription>>>,
            log: &Log,
        ) {
            let (Some(registry), Some(slots)) = (registry.upgrade(), slots.upgrade()) else {
                return;
            };
            match kind {
                Kind::Plain => {}
                Kind::Remover(victim) => {
                    let target = slots.lock().unwrap()[victim].clone();
                    target.unsubscribe();
                }
                Kind::Adder(added) => {
                    register(&registry, &slots, log, added, Kind::Plain);
                }
            }
        }

        fn apply_model(model: &mut Vec<ModelEntry>, kind: Kind) {
            match kind {
                Kind::Plain => {}
                Kind::Remover(victim) => model[victim].alive = false,
                Kind::Adder(added) => model.push(ModelEntry {
                    category: added,
                    kind: Kind::Plain,
                    alive: true,
                }),
            }
        }

        proptest! {
            #[test]
            fn registry_matches_model(ops in proptest::collection::vec(op(), 1..40)) {
                let registry = Registry::new();
                let dispatcher = Dispatcher::new(Arc::clone(&registry));
                let slots: Slots = Arc::new(Mutex::new(Vec::new()));
                let log: Log = Arc::new(Mutex::new(Vec::new()));
                let mut model: Vec<ModelEntry> = Vec::new();

                for op in ops {
                    match op {
                        Op::Subscribe(category) => {
                            register(&registry, &slots, &log, category, Kind::Plain);
                            model.push(ModelEntry { category, kind: Kind::Plain, alive: true });
                        }
                        Op::SubscribeRemover { category, victim } => {
                            let victim = victim % (model.len() + 1);
                            let kind = Kind::Remover(victim);
                            register(&registry, &slots, &log, category, kind);
                            model.push(ModelEntry { category, kind, alive: true });
                        }
                        Op::SubscribeAdder { category, added } => {
                            let kind = Kind::Adder(added);
                            register(&registry, &slots, &log, category, kind);
                            model.push(ModelEntry { category, kind, alive: true });
                        }
                        Op::Unsubscribe(pick) => {
                            if !model.is_empty() {
                                let slot = pick % model.len();
                                let target = slots.lock().unwrap()[slot].clone();
                                let removed = target.unsubscribe();
                                prop_assert_eq!(removed, model[slot].alive);
                                model[slot].alive = false;
                            }
                        }
                        Op::UnsubscribeAll => {
                            registry.unsubscribe_all();
                            for entry in &mut model {
                                entry.alive = false;
                            }
                        }
                        Op::Dispatch(category) => {
                            let snapshot: Vec<usize> = (0..model.len())
                                .filter(|&i| model[i].alive && model[i].category == category)
                                .collect();
                            let mut expected = Vec::new();
                            for slot in snapshot {
                                if model[slot].alive {
                                    expected.push(slot);
                                    let kind = model[slot].kind;
                                    apply_model(&mut model, kind);
                                }
                            }

                            let outcome = dispatcher.dispatch(&envelope_for(category));
                            let seen = std::mem::take(&mut *log.lock().unwrap());
                            prop_assert_eq!(outcome.delivered, expected.len());
                            prop_assert_eq!(outcome.failed, 0);
                            prop_assert_eq!(seen, expected);
                        }
                    }

                    for category in Category::ALL {
                        let alive = model
                            .iter()
                            .filter(|e| e.alive && e.category == category)
                            .count();
                        prop_assert_eq!(registry.subscriber_count(category), alive);
                    }
                    let held = slots.lock().unwrap();
                    prop_assert_eq!(held.len(), model.len());
                    for (sub, entry) in held.iter().zip(&model) {
                        prop_assert_eq!(sub.is_active(), entry.alive);
                    }
                }
            }
        }
    }
}
