//! Cart and order totals.
//!
//! Totals are a pure function of the line items plus the configured pricing
//! constants. Both the cart store and the checkout orchestrator go through
//! [`CartTotals::compute`] so persisted totals can never drift from the
//! items they were derived from.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Pricing constants applied to every totals recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    /// Tax rate applied to the discounted subtotal.
    pub tax_rate: Decimal,
    /// Discounted subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Flat fee charged below the free-shipping threshold.
    pub flat_shipping_fee: Decimal,
}

impl PricingConfig {
    /// Builds pricing constants from configuration floats.
    ///
    /// Uses lossy shortest-representation conversion so `0.10` arrives as
    /// exactly `0.10`, not its binary expansion.
    pub fn from_rates(tax_rate: f64, free_shipping_threshold: f64, flat_shipping_fee: f64) -> Self {
        Self {
            tax_rate: Decimal::from_f64(tax_rate).unwrap_or(Decimal::ZERO),
            free_shipping_threshold: Decimal::from_f64(free_shipping_threshold)
                .unwrap_or(Decimal::ZERO),
            flat_shipping_fee: Decimal::from_f64(flat_shipping_fee).unwrap_or(Decimal::ZERO),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.10),
            free_shipping_threshold: dec!(50),
            flat_shipping_fee: dec!(5.99),
        }
    }
}

/// Derived monetary totals for a cart or an order-in-the-making.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub shipping_total: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    /// Recomputes totals from `(unit_price, quantity)` lines.
    ///
    /// `subtotal = Σ(unit_price × quantity)`; discount is fixed at zero
    /// (coupons are out of scope); `tax = (subtotal − discount) × tax_rate`;
    /// shipping is the flat fee below the free-shipping threshold and zero at
    /// or above it. An empty cart sits below the threshold, so it carries the
    /// flat fee.
    pub fn compute<I>(lines: I, config: &PricingConfig) -> Self
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let subtotal: Decimal = lines
            .into_iter()
            .map(|(unit_price, quantity)| unit_price * Decimal::from(quantity))
            .sum();

        let discount_total = Decimal::ZERO;
        let discounted = subtotal - discount_total;

        let tax_total = discounted * config.tax_rate;

        let shipping_total = if discounted >= config.free_shipping_threshold {
            Decimal::ZERO
        } else {
            config.flat_shipping_fee
        };

        let total = subtotal - discount_total + tax_total + shipping_total;

        Self {
            subtotal,
            discount_total,
            tax_total,
            shipping_total,
            total,
        }
    }

    /// The empty-cart totals (subtotal zero, flat-fee shipping).
    pub fn empty(config: &PricingConfig) -> Self {
        Self::compute(std::iter::empty(), config)
    }

    /// Verifies the totals identity this module guarantees.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount_total + self.tax_total + self.shipping_total
    }
}
