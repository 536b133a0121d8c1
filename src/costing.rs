//! Recipe cost and profitability arithmetic.
//!
//! Cost of goods is the weighted sum of ingredient quantities times their
//! current unit cost. Nothing here is persisted; callers recompute from
//! current stock and price rows on every read.

use serde::{Deserialize, Deserializer, Serialize};

/// Parse a quantity or cost that may arrive as free text from a form.
///
/// Accepts a comma as decimal separator ("0,35" -> 0.35) and strips
/// surrounding whitespace. Anything non-numeric coerces to zero.
pub fn parse_flexible_number(raw: &str) -> f64 {
    raw.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0)
}

/// Serde adapter for fields whose forms submit either a number or free
/// text ("0,35"). Use with `#[serde(deserialize_with = ...)]`.
pub fn de_flexible_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    Ok(match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => n,
        NumberOrText::Text(s) => parse_flexible_number(&s),
    })
}

/// Σ(quantity × unit_cost) over (quantity, unit_cost) pairs.
pub fn recipe_cost(pairs: &[(f64, f64)]) -> f64 {
    pairs.iter().map(|(qty, cost)| qty * cost).sum()
}

/// Profit as a percentage of sale price. Zero when the price is zero.
pub fn margin_percent(price: f64, cost: f64) -> f64 {
    if price > 0.0 {
        (price - cost) / price * 100.0
    } else {
        0.0
    }
}

/// Sale price as a multiple of cost. Zero when the cost is zero.
pub fn markup(price: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        price / cost
    } else {
        0.0
    }
}

/// Profitability summary for one menu product.
///
/// `uncosted` is set when the product has no recipe ingredients at all:
/// the arithmetic then reports margin 100, but that signals "nobody costed
/// this yet", not a perfect dish, and the UI renders it differently.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub cost: f64,
    pub profit: f64,
    pub margin_percent: f64,
    pub markup: f64,
    pub uncosted: bool,
}

/// Compute the full breakdown for a sale price and ingredient pairs.
pub fn cost_breakdown(sale_price: f64, pairs: &[(f64, f64)]) -> CostBreakdown {
    let cost = recipe_cost(pairs);
    CostBreakdown {
        cost,
        profit: sale_price - cost,
        margin_percent: margin_percent(sale_price, cost),
        markup: markup(sale_price, cost),
        uncosted: pairs.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flexible_parse_accepts_comma_decimals() {
        assert_eq!(parse_flexible_number("0,35"), 0.35);
        assert_eq!(parse_flexible_number(" 2.5 "), 2.5);
        assert_eq!(parse_flexible_number("12"), 12.0);
    }

    #[test]
    fn flexible_parse_coerces_garbage_to_zero() {
        assert_eq!(parse_flexible_number(""), 0.0);
        assert_eq!(parse_flexible_number("abc"), 0.0);
        assert_eq!(parse_flexible_number("1,2,3"), 0.0);
    }

    #[test]
    fn serde_adapter_accepts_numbers_and_text() {
        #[derive(Deserialize)]
        struct Field {
            #[serde(deserialize_with = "de_flexible_number")]
            quantity: f64,
        }

        let from_number: Field = serde_json::from_str(r#"{"quantity": 2.5}"#).unwrap();
        assert_eq!(from_number.quantity, 2.5);

        let from_text: Field = serde_json::from_str(r#"{"quantity": "0,35"}"#).unwrap();
        assert_eq!(from_text.quantity, 0.35);

        let from_garbage: Field = serde_json::from_str(r#"{"quantity": "a lot"}"#).unwrap();
        assert_eq!(from_garbage.quantity, 0.0);
    }

    #[test]
    fn cost_is_weighted_sum() {
        // 0.35 kg at 45.00 + 2 un at 2.50
        let pairs = [(0.35, 45.0), (2.0, 2.5)];
        let cost = recipe_cost(&pairs);
        assert!((cost - 20.75).abs() < 1e-9);
    }

    #[test]
    fn margin_and_markup_examples() {
        let m = margin_percent(45.90, 12.50);
        assert!((m - 72.766884).abs() < 1e-3);
        assert!((markup(45.90, 12.50) - 3.672).abs() < 1e-9);
    }

    #[test]
    fn zero_price_and_zero_cost_edges() {
        assert_eq!(margin_percent(0.0, 10.0), 0.0);
        assert_eq!(markup(10.0, 0.0), 0.0);
        // No ingredients: cost 0, margin 100, flagged uncosted
        let b = cost_breakdown(30.0, &[]);
        assert_eq!(b.cost, 0.0);
        assert_eq!(b.margin_percent, 100.0);
        assert!(b.uncosted);
    }

    #[test]
    fn costed_breakdown_is_not_flagged() {
        let b = cost_breakdown(45.90, &[(0.35, 45.0), (2.0, 2.5)]);
        assert!(!b.uncosted);
        assert!((b.cost - 20.75).abs() < 1e-9);
        assert!((b.profit - 25.15).abs() < 1e-9);
    }
}
