//! Fixed-point quantity handling.
//!
//! Stock and reservation quantities are decimals with two fractional digits.
//! Every computed value is quantized half-up so the ledger never drifts, and
//! the product's unit decides whether fractions are allowed at all.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::entities::product::ProductUnit;
use crate::errors::ServiceError;

/// Number of fractional digits carried by every quantity.
pub const QUANTITY_SCALE: u32 = 2;

/// Largest quantity a `NUMERIC(12, 2)` stock column can hold: 9,999,999,999.99
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, QUANTITY_SCALE);

/// Rejects quantities the stock columns cannot store.
pub fn ensure_storable(value: Decimal) -> Result<Decimal, ServiceError> {
    if value > MAX_QUANTITY {
        return Err(ServiceError::validation(
            "quantity",
            format!("quantity must not exceed {}", MAX_QUANTITY),
        ));
    }
    Ok(value)
}

/// Quantizes to two decimals, rounding half-up, and pins the scale so that
/// `18` renders as `18.00`.
pub fn quantize(value: Decimal) -> Decimal {
    let mut q = value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    q.rescale(QUANTITY_SCALE);
    q
}

/// Rounds half-up to the nearest whole unit, keeping the two-decimal scale.
pub fn round_to_whole(value: Decimal) -> Decimal {
    quantize(value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

/// Applies the unit policy to an already-parsed quantity.
///
/// Kilogram products keep two decimals; piece, service and tray products are
/// rounded half-up to a whole unit. The result must be strictly positive.
pub fn normalize_for_unit(value: Decimal, unit: ProductUnit) -> Result<Decimal, ServiceError> {
    let normalized = if unit.allows_fraction() {
        quantize(value)
    } else {
        round_to_whole(value)
    };

    if normalized <= Decimal::ZERO {
        let reason = if unit.allows_fraction() {
            "quantity must be greater than 0"
        } else {
            "quantity must be a positive whole number"
        };
        return Err(ServiceError::validation("quantity", reason));
    }

    ensure_storable(normalized)
}

/// Parses operator input such as `"2.5"` or `" 3 "` into a decimal.
pub fn parse(raw: &str) -> Result<Decimal, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::validation("quantity", "quantity is required"));
    }
    Decimal::from_str(trimmed)
        .map_err(|_| ServiceError::validation("quantity", format!("'{}' is not a number", trimmed)))
}

/// Validates an absolute stock count entered on a counting screen.
pub fn normalize_count(value: Decimal) -> Result<Decimal, ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::validation(
            "quantity",
            "stock count cannot be negative",
        ));
    }
    ensure_storable(quantize(value))
}
