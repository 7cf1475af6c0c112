//! Property-based tests for money arithmetic and month handling.
//!
//! These tests use proptest to verify invariants across a wide range of inputs,
//! helping to catch edge cases that unit tests might miss.

use buytrack_api::{
    money::{apply_vat, format_amount, round_money, Currency, VAT_RATE},
    period::Month,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000_000, 0u32..5).prop_map(|(units, scale)| Decimal::new(units, scale))
}

fn month_strategy() -> impl Strategy<Value = Month> {
    (1990i32..2100, 1u32..=12).prop_map(|(year, month)| Month::new(year, month).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn total_is_subtotal_plus_tax_within_a_cent(subtotal in amount_strategy()) {
        let subtotal = round_money(subtotal);
        let (tax, total) = apply_vat(subtotal);
        let drift = (subtotal + tax - total).abs();
        prop_assert!(drift <= Decimal::new(1, 2), "drift {} for {}", drift, subtotal);
        prop_assert_eq!(total, round_money(subtotal + subtotal * VAT_RATE));
    }

    #[test]
    fn rounded_money_has_at_most_two_places(value in amount_strategy()) {
        prop_assert!(round_money(value).scale() <= 2);
    }

    #[test]
    fn formatted_amount_reads_back(value in 0i64..1_000_000_000_000) {
        let text = format_amount(Decimal::from(value), Currency::Clp.decimals());
        prop_assert_eq!(text.replace('.', ""), value.to_string());
    }

    #[test]
    fn month_text_round_trips(month in month_strategy()) {
        let parsed: Month = month.to_string().parse().unwrap();
        prop_assert_eq!(parsed, month);
    }

    #[test]
    fn next_and_previous_are_inverse(month in month_strategy()) {
        prop_assert_eq!(month.next().previous(), month);
        prop_assert!(month.contains(month.first_day()));
        prop_assert!(month.contains(month.last_day()));
        prop_assert!(!month.contains(month.next().first_day()));
    }
}
