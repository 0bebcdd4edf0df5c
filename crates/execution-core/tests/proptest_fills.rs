//! Property-based tests for fill accounting.
//!
//! Fills may arrive in any order, and the same fill may be delivered once by
//! the user stream and again by the polling loop. The executed amount must
//! still converge to the order amount and the completion event must fire once.

use execution_core::{
    ConnectorEvent, EventBus, InFlightOrder, InFlightOrderTracker, OrderSide, OrderType,
    StatusTable, TrackerConfig, TradeUpdate,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn trade(index: usize, base: Decimal) -> TradeUpdate {
    TradeUpdate {
        trade_id: format!("t{}", index),
        client_order_id: Some("order-1".into()),
        exchange_order_id: Some("ex-1".into()),
        trading_pair: "ETH-USDT".into(),
        fill_base_amount: base,
        fill_quote_amount: base * dec!(2000),
        fill_price: dec!(2000),
        fee_asset: Some("USDT".into()),
        fee_amount: dec!(0.001),
        fill_timestamp: 1_000 + index as u64,
    }
}

/// Fill sizes in 0.0001 lots.
fn fill_sizes() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(1u32..5_000, 1..12)
        .prop_map(|lots| lots.into_iter().map(|l| Decimal::new(l as i64, 4)).collect())
}

fn run(amount: Decimal, deliveries: &[TradeUpdate]) -> (Vec<ConnectorEvent>, InFlightOrderTracker) {
    let bus = EventBus::new(1024);
    let mut rx = bus.subscribe();
    let mut tracker =
        InFlightOrderTracker::new(StatusTable::canonical(), bus, TrackerConfig::default());
    tracker.start_tracking_order(InFlightOrder::new(
        "order-1",
        "ETH-USDT",
        OrderSide::Buy,
        OrderType::Limit,
        dec!(2000),
        amount,
        0,
    ));

    for trade in deliveries {
        tracker.process_trade_update(trade);
    }

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (events, tracker)
}

proptest! {
    /// Non-duplicate fills summing to the amount complete the order exactly once,
    /// whatever their delivery order.
    #[test]
    fn fills_converge_in_any_order(
        (sizes, order) in fill_sizes().prop_flat_map(|sizes| {
            let n = sizes.len();
            (Just(sizes), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        })
    ) {
        let amount: Decimal = sizes.iter().copied().sum();
        let deliveries: Vec<TradeUpdate> =
            order.iter().map(|&i| trade(i, sizes[i])).collect();

        let (events, tracker) = run(amount, &deliveries);

        let completed = events
            .iter()
            .filter(|e| matches!(e, ConnectorEvent::BuyOrderCompleted(_)))
            .count();
        prop_assert_eq!(completed, 1);

        match events.iter().find(|e| matches!(e, ConnectorEvent::BuyOrderCompleted(_))) {
            Some(ConnectorEvent::BuyOrderCompleted(c)) => {
                prop_assert_eq!(c.executed_amount_base, amount);
            }
            _ => prop_assert!(false, "no completion event"),
        }

        let fills = events
            .iter()
            .filter(|e| matches!(e, ConnectorEvent::OrderFilled(_)))
            .count();
        prop_assert_eq!(fills, sizes.len());
        prop_assert!(!tracker.is_tracking("order-1"));
    }

    /// Re-delivering fills never double counts them.
    #[test]
    fn duplicate_fills_are_ignored(
        sizes in fill_sizes(),
        repeats in prop::collection::vec(any::<prop::sample::Index>(), 1..20),
    ) {
        // One lot more than the fills so the order stays active and inspectable.
        let fills_total: Decimal = sizes.iter().copied().sum();
        let amount = fills_total + dec!(0.0001);

        let mut deliveries: Vec<TradeUpdate> =
            sizes.iter().enumerate().map(|(i, s)| trade(i, *s)).collect();
        for idx in &repeats {
            let i = idx.index(sizes.len());
            deliveries.push(trade(i, sizes[i]));
        }

        let (events, tracker) = run(amount, &deliveries);

        let order = tracker.fetch_tracked_order("order-1").expect("order still tracked");
        prop_assert_eq!(order.executed_amount_base, fills_total);
        prop_assert_eq!(order.trade_ids.len(), sizes.len());

        let fills = events
            .iter()
            .filter(|e| matches!(e, ConnectorEvent::OrderFilled(_)))
            .count();
        prop_assert_eq!(fills, sizes.len());
    }

    /// A fill that carries the executed amount past the order amount is kept
    /// and completes the order once; later fills land on the finished order.
    #[test]
    fn crossing_fill_completes_once(sizes in fill_sizes(), cut in 1usize..12) {
        let cut = cut.min(sizes.len());
        let crossed: Decimal = sizes[..cut].iter().copied().sum();
        let amount = crossed - dec!(0.00005);
        let deliveries: Vec<TradeUpdate> =
            sizes.iter().enumerate().map(|(i, s)| trade(i, *s)).collect();

        let (events, tracker) = run(amount, &deliveries);

        let completions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ConnectorEvent::BuyOrderCompleted(c) => Some(c),
                _ => None,
            })
            .collect();
        prop_assert_eq!(completions.len(), 1);
        prop_assert_eq!(completions[0].executed_amount_base, crossed);

        let fills = events
            .iter()
            .filter(|e| matches!(e, ConnectorEvent::OrderFilled(_)))
            .count();
        prop_assert_eq!(fills, sizes.len());

        let order = tracker
            .fetch_order(Some("order-1"), None)
            .expect("order recently finished");
        let total: Decimal = sizes.iter().copied().sum();
        prop_assert_eq!(order.executed_amount_base, total);
        prop_assert!(!tracker.is_tracking("order-1"));
    }
}
