//! Quantity-tiered discount pricing.
//!
//! The discount depends on the total number of units in the cart, not on any
//! single line. All amounts are integer paise.
//!
//! Rounding is half-up on the exact rational result: `mrp * (100 - percent) / 100`
//! is rounded to the nearest paisa, with exact halves rounded up.

/// Discount applied when the cart holds one or two units.
pub const SINGLE_ITEM_DISCOUNT_PERCENT: u8 = 20;
/// Cart size from which the mid tier applies.
pub const MID_TIER_MIN_QUANTITY: u64 = 3;
pub const MID_TIER_DISCOUNT_PERCENT: u8 = 40;
/// Cart size from which the top tier applies.
pub const TOP_TIER_MIN_QUANTITY: u64 = 5;
pub const TOP_TIER_DISCOUNT_PERCENT: u8 = 50;

/// Discount percentage for a cart holding `total_qty` units in total.
pub fn discount_percent_for_quantity(total_qty: u64) -> u8 {
    match total_qty {
        0 => 0,
        q if q >= TOP_TIER_MIN_QUANTITY => TOP_TIER_DISCOUNT_PERCENT,
        q if q >= MID_TIER_MIN_QUANTITY => MID_TIER_DISCOUNT_PERCENT,
        _ => SINGLE_ITEM_DISCOUNT_PERCENT,
    }
}

/// Sale price for an MRP after a `percent` discount.
///
/// Negative MRPs are treated as zero and percentages above 100 as 100, so the
/// result is always a non-negative whole number of paise.
pub fn sale_price_from_mrp(mrp: i64, percent: u8) -> i64 {
    let mrp = i128::from(mrp.max(0));
    let keep = i128::from(100 - percent.min(100));
    let price = (mrp * keep + 50) / 100;
    i64::try_from(price).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_tiers() {
        assert_eq!(discount_percent_for_quantity(0), 0);
        assert_eq!(discount_percent_for_quantity(1), SINGLE_ITEM_DISCOUNT_PERCENT);
        assert_eq!(discount_percent_for_quantity(2), SINGLE_ITEM_DISCOUNT_PERCENT);
        assert_eq!(discount_percent_for_quantity(3), MID_TIER_DISCOUNT_PERCENT);
        assert_eq!(discount_percent_for_quantity(4), MID_TIER_DISCOUNT_PERCENT);
        assert_eq!(discount_percent_for_quantity(5), TOP_TIER_DISCOUNT_PERCENT);
        assert_eq!(discount_percent_for_quantity(120), TOP_TIER_DISCOUNT_PERCENT);
    }

    #[test]
    fn test_sale_price_exact() {
        assert_eq!(sale_price_from_mrp(19900, 50), 9950);
        assert_eq!(sale_price_from_mrp(19900, 40), 11940);
        assert_eq!(sale_price_from_mrp(10000, 33), 6700);
    }

    #[test]
    fn test_sale_price_rounds_half_up() {
        // 199 * 0.5 = 99.5
        assert_eq!(sale_price_from_mrp(199, 50), 100);
        // 12345 * 0.67 = 8271.15
        assert_eq!(sale_price_from_mrp(12345, 33), 8271);
        // 999 * 0.67 = 669.33
        assert_eq!(sale_price_from_mrp(999, 33), 669);
        // 1 * 0.8 = 0.8
        assert_eq!(sale_price_from_mrp(1, 20), 1);
    }

    #[test]
    fn test_sale_price_bounds() {
        assert_eq!(sale_price_from_mrp(-500, 20), 0);
        assert_eq!(sale_price_from_mrp(19900, 0), 19900);
        assert_eq!(sale_price_from_mrp(19900, 100), 0);
        assert_eq!(sale_price_from_mrp(19900, 250), 0);
    }
}
