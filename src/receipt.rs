//! Order receipt rendering.
//!
//! Produces a small self-contained HTML document sized for 80mm receipt
//! paper. The webview opens it in a print window and hands it to the OS
//! print dialog; no printer driver talk happens on this side.

use crate::orders::Order;

const SHOP_NAME: &str = "FORNO PIZZARIA";
const FOOTER_NOTE: &str = "Thank you and see you soon!";

/// Escape text destined for HTML interpolation.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Money with two decimals, as the receipt shows it.
fn format_money(value: f64) -> String {
    format!("R$ {value:.2}")
}

const STYLES: &str = "
    @page { size: auto; margin: 0mm; }
    body {
      font-family: 'Courier New', Courier, monospace;
      margin: 0;
      padding: 10px;
      width: 280px;
      font-size: 12px;
      color: black;
      line-height: 1.2;
    }
    .header { text-align: center; border-bottom: 1px dashed #000; padding-bottom: 8px; margin-bottom: 8px; }
    .title { font-size: 16px; font-weight: bold; margin: 0; }
    .subtitle { font-size: 10px; margin: 2px 0; }
    .divider { border-top: 1px dashed #000; margin: 8px 0; }
    .item { margin-bottom: 6px; }
    .item-header { display: flex; justify-content: space-between; font-weight: bold; }
    .total-section { text-align: right; font-size: 14px; font-weight: bold; margin-top: 8px; }
    .info-row { display: flex; justify-content: space-between; margin-bottom: 2px; }
    .address-box { border: 1px solid #000; padding: 6px; margin-top: 10px; font-weight: bold; font-size: 11px; text-transform: uppercase; }
    .footer { text-align: center; margin-top: 15px; font-size: 9px; opacity: 0.7; }
";

/// Render the full printable document for one order.
pub fn build_receipt_html(order: &Order) -> String {
    let mut body = String::new();

    body.push_str(&format!(
        "<div class=\"header\">\
           <p class=\"title\">{SHOP_NAME}</p>\
           <p class=\"subtitle\">ORDER <b>#{}</b></p>\
           <p class=\"subtitle\">{}</p>\
         </div>",
        order.order_number,
        escape_html(&order.created_at),
    ));

    body.push_str(&format!(
        "<div class=\"info-row\"><span>CUSTOMER:</span> <b>{}</b></div>",
        escape_html(&order.customer_name.to_uppercase()),
    ));
    if let Some(phone) = order.customer_phone.as_deref().filter(|p| !p.is_empty()) {
        body.push_str(&format!(
            "<div class=\"info-row\"><span>PHONE:</span> {}</div>",
            escape_html(phone),
        ));
    }

    body.push_str("<div class=\"divider\"></div>");

    for item in &order.items {
        body.push_str(&format!(
            "<div class=\"item\"><div class=\"item-header\">\
               <span>{}x {}</span><span>{}</span>\
             </div></div>",
            item.quantity,
            escape_html(&item.name.to_uppercase()),
            format_money(item.quantity * item.unit_price),
        ));
    }

    body.push_str("<div class=\"divider\"></div>");

    let subtotal = order.total_amount - order.delivery_fee;
    body.push_str(&format!(
        "<div class=\"info-row\"><span>SUBTOTAL:</span><span>{}</span></div>\
         <div class=\"info-row\"><span>DELIVERY FEE:</span><span>{}</span></div>\
         <div class=\"total-section\">TOTAL: {}</div>",
        format_money(subtotal),
        format_money(order.delivery_fee),
        format_money(order.total_amount),
    ));

    if let Some(method) = order.payment_method.as_deref().filter(|m| !m.is_empty()) {
        body.push_str("<div class=\"divider\"></div>");
        body.push_str(&format!(
            "<div class=\"info-row\"><span>PAYMENT:</span><span>{}</span></div>",
            escape_html(&method.to_uppercase()),
        ));
        if let Some(change_for) = order.change_for {
            if change_for > order.total_amount {
                body.push_str(&format!(
                    "<div class=\"info-row\"><span>CHANGE FOR:</span><span>{}</span></div>\
                     <div class=\"info-row\"><span>CHANGE DUE:</span><span>{}</span></div>",
                    format_money(change_for),
                    format_money(change_for - order.total_amount),
                ));
            }
        }
    }

    if let Some(address) = order.customer_address.as_deref().filter(|a| !a.is_empty()) {
        body.push_str(&format!(
            "<div class=\"address-box\">DELIVER TO:<br>{}</div>",
            escape_html(address),
        ));
    }

    body.push_str(&format!("<div class=\"footer\">{FOOTER_NOTE}</div>"));

    format!(
        "<html><head><title>Order #{}</title><style>{STYLES}</style></head>\
         <body>{body}</body></html>",
        order.order_number,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{OrderItem, OrderStatus};

    fn sample_order() -> Order {
        Order {
            id: "ord-1".into(),
            order_number: 42,
            customer_name: "Maria & Co".into(),
            customer_phone: Some("11 99999-0000".into()),
            customer_address: Some("Rua A, 10 <apt 2>".into()),
            items: vec![
                OrderItem {
                    product_id: None,
                    name: "Margherita".into(),
                    quantity: 2.0,
                    unit_price: 45.90,
                },
                OrderItem {
                    product_id: None,
                    name: "Soda".into(),
                    quantity: 1.0,
                    unit_price: 6.0,
                },
            ],
            total_amount: 105.80,
            delivery_fee: 8.0,
            change_for: Some(120.0),
            payment_method: Some("cash".into()),
            status: OrderStatus::New,
            completed_at: None,
            created_at: "2025-06-01T19:30:00Z".into(),
            updated_at: "2025-06-01T19:30:00Z".into(),
        }
    }

    #[test]
    fn receipt_contains_items_and_totals() {
        let html = build_receipt_html(&sample_order());
        assert!(html.contains("ORDER <b>#42</b>"));
        assert!(html.contains("2x MARGHERITA"));
        assert!(html.contains("R$ 91.80")); // 2 × 45.90
        assert!(html.contains("SUBTOTAL:"));
        assert!(html.contains("R$ 97.80")); // total - delivery fee
        assert!(html.contains("TOTAL: R$ 105.80"));
        assert!(html.contains("DELIVERY FEE:"));
    }

    #[test]
    fn change_due_is_derived_from_change_for() {
        let html = build_receipt_html(&sample_order());
        assert!(html.contains("CHANGE FOR:"));
        assert!(html.contains("R$ 14.20")); // 120 - 105.80
    }

    #[test]
    fn interpolated_text_is_escaped() {
        let html = build_receipt_html(&sample_order());
        assert!(html.contains("MARIA &amp; CO"));
        assert!(html.contains("Rua A, 10 &lt;apt 2&gt;"));
        assert!(!html.contains("<apt"));
    }

    #[test]
    fn optional_blocks_are_omitted() {
        let mut order = sample_order();
        order.customer_phone = None;
        order.customer_address = None;
        order.payment_method = None;
        let html = build_receipt_html(&order);
        assert!(!html.contains("PHONE:"));
        assert!(!html.contains("DELIVER TO:"));
        assert!(!html.contains("PAYMENT:"));
    }
}
