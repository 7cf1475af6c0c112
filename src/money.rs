//! Currencies and money formatting.
//!
//! Amounts are stored as [`Decimal`]. Display strings follow the es-CL
//! convention: `.` groups thousands and `,` separates decimals.

use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fixed value added tax applied to every purchase order subtotal.
pub const VAT_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2);

/// Largest line amount, subtotal or budget accepted (99.999.999.999,99).
/// A subtotal at this bound still fits a money column once VAT is added.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_316_134_911, 2_328, 0, false, 2);

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(3))")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Currency {
    #[default]
    #[sea_orm(string_value = "CLP")]
    Clp,
    #[sea_orm(string_value = "USD")]
    Usd,
    #[sea_orm(string_value = "UF")]
    Uf,
}

impl Currency {
    /// Decimal places shown on documents and in formatted values.
    pub fn decimals(self) -> u32 {
        match self {
            Currency::Clp => 0,
            Currency::Usd => 2,
            Currency::Uf => 4,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Currency::Clp => "$ ",
            Currency::Usd => "US$ ",
            Currency::Uf => "UF ",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Clp => "CLP",
            Currency::Usd => "USD",
            Currency::Uf => "UF",
        }
    }
}

/// Rounds a stored amount half away from zero to two decimals.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity * unit_price`, or `None` when it overflows or passes [`MAX_AMOUNT`].
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity.checked_mul(unit_price).filter(within_bounds)
}

/// Sum of `amounts`, or `None` when it overflows or passes [`MAX_AMOUNT`].
pub fn checked_sum<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount).filter(within_bounds)
    })
}

fn within_bounds(amount: &Decimal) -> bool {
    amount.abs() <= MAX_AMOUNT
}

/// Tax and total for a subtotal, both rounded with [`round_money`].
pub fn apply_vat(subtotal: Decimal) -> (Decimal, Decimal) {
    let tax = round_money(subtotal * VAT_RATE);
    let total = round_money(subtotal + subtotal * VAT_RATE);
    (tax, total)
}

/// Formats `value` with es-CL separators and exactly `decimals` places.
pub fn format_amount(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.*}", decimals as usize, rounded.abs());

    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut out = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if negative {
        out.push('-');
    }
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part.filter(|f| !f.is_empty()) {
        out.push(',');
        out.push_str(frac);
    }
    out
}

/// Formats `value` with the currency symbol and its decimal places.
pub fn format_money(value: Decimal, currency: Currency) -> String {
    format!(
        "{}{}",
        currency.symbol(),
        format_amount(value, currency.decimals())
    )
}

/// Formats a percentage with one decimal, e.g. `81,3%`.
pub fn format_percent(value: f64) -> String {
    let decimal = Decimal::from_f64_retain(value).unwrap_or_default();
    format!("{}%", format_amount(decimal, 1))
}
