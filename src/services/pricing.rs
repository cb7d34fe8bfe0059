use crate::config::CheckoutConfig;
use crate::entities::ProductModel;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

/// A cart line that survived validation, priced from the product snapshot
/// taken during the same pass.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product: ProductModel,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl PricedLine {
    pub fn new(product: ProductModel, quantity: i32) -> Self {
        let unit_price = product.price_to_charge();
        let line_total = unit_price * Decimal::from(quantity);
        Self {
            product,
            quantity,
            unit_price,
            line_total,
        }
    }

    pub fn product_id(&self) -> Uuid {
        self.product.id
    }
}

/// Order totals derived from the priced lines and the fixed pricing rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
}

/// Rounds a monetary amount to 2 decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes order totals.
///
/// Tax applies to the subtotal only. Shipping is free at or above the
/// threshold, the flat rate otherwise; the threshold compares the unrounded
/// subtotal. Each component is rounded once, then summed, so the stored
/// parts always add up to the stored total.
pub fn price_cart(lines: &[PricedLine], rules: &CheckoutConfig) -> PricingBreakdown {
    let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();

    let shipping_amount = if subtotal >= rules.free_shipping_threshold {
        Decimal::ZERO
    } else {
        rules.shipping_flat_rate
    };

    let subtotal = round_money(subtotal);
    let tax_amount = round_money(subtotal * rules.tax_rate);
    let shipping_amount = round_money(shipping_amount);
    let total_amount = subtotal + tax_amount + shipping_amount;

    PricingBreakdown {
        subtotal,
        tax_amount,
        shipping_amount,
        total_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ProductStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product(price: Decimal, sale_price: Option<Decimal>) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            name: "Cold-Pressed Orange".into(),
            sku: "JUICE-OJ-500".into(),
            description: String::new(),
            price,
            sale_price,
            stock_quantity: 100,
            sales_count: 0,
            is_active: true,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rules() -> CheckoutConfig {
        CheckoutConfig::default()
    }

    #[test]
    fn sale_price_wins_when_set_and_nonzero() {
        let line = PricedLine::new(product(dec!(12.00), Some(dec!(9.50))), 2);
        assert_eq!(line.unit_price, dec!(9.50));
        assert_eq!(line.line_total, dec!(19.00));

        let line = PricedLine::new(product(dec!(12.00), Some(dec!(0))), 1);
        assert_eq!(line.unit_price, dec!(12.00));

        let line = PricedLine::new(product(dec!(12.00), None), 1);
        assert_eq!(line.unit_price, dec!(12.00));
    }

    #[test]
    fn below_threshold_pays_flat_shipping() {
        // 3 x 9.99 = 29.97; tax 2.3976 -> 2.40; shipping 9.99
        let lines = vec![PricedLine::new(product(dec!(9.99), None), 3)];
        let totals = price_cart(&lines, &rules());
        assert_eq!(totals.subtotal, dec!(29.97));
        assert_eq!(totals.tax_amount, dec!(2.40));
        assert_eq!(totals.shipping_amount, dec!(9.99));
        assert_eq!(totals.total_amount, dec!(42.36));
    }

    #[test]
    fn at_threshold_ships_free() {
        // 2 x 25.00 = 50.00 exactly
        let lines = vec![PricedLine::new(product(dec!(25.00), None), 2)];
        let totals = price_cart(&lines, &rules());
        assert_eq!(totals.subtotal, dec!(50.00));
        assert_eq!(totals.tax_amount, dec!(4.00));
        assert_eq!(totals.shipping_amount, dec!(0.00));
        assert_eq!(totals.total_amount, dec!(54.00));
    }

    #[test]
    fn mixed_cart_uses_per_line_effective_prices() {
        let lines = vec![
            PricedLine::new(product(dec!(12.00), Some(dec!(9.50))), 2),
            PricedLine::new(product(dec!(7.25), None), 3),
        ];
        // 19.00 + 21.75 = 40.75; tax 3.26; shipping 9.99
        let totals = price_cart(&lines, &rules());
        assert_eq!(totals.subtotal, dec!(40.75));
        assert_eq!(totals.tax_amount, dec!(3.26));
        assert_eq!(totals.shipping_amount, dec!(9.99));
        assert_eq!(totals.total_amount, dec!(54.00));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        // 13.28 * 0.08 = 1.0624 -> 1.06; 9.69 * 0.08 = 0.7752 -> 0.78
        let lines = vec![PricedLine::new(product(dec!(13.28), None), 1)];
        assert_eq!(price_cart(&lines, &rules()).tax_amount, dec!(1.06));

        let lines = vec![PricedLine::new(product(dec!(9.69), None), 1)];
        assert_eq!(price_cart(&lines, &rules()).tax_amount, dec!(0.78));

        // midpoint: 28.125 * 0.08 isn't one; force it with subtotal 10.0625
        assert_eq!(round_money(dec!(0.805)), dec!(0.81));
    }

    #[test]
    fn empty_cart_totals_are_zero_plus_shipping() {
        let totals = price_cart(&[], &rules());
        assert_eq!(totals.subtotal, dec!(0));
        // An empty cart never reaches pricing in practice; the breakdown is
        // still well-defined.
        assert_eq!(totals.shipping_amount, dec!(9.99));
    }
}
