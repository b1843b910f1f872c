//! Human-readable order summary and the chat deep link carrying it.

use std::fmt::Write;

use model::Order;
use reqwest::Url;

/// Formats paise as rupees, e.g. `35820` → `₹358.20`.
pub fn format_inr(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{sign}₹{}.{:02}", abs / 100, abs % 100)
}

/// Order summary the customer sends to (or receives from) the shop over chat.
pub fn order_confirmation_text(order: &Order) -> String {
    let mut text = String::new();
    let short_id: String = order.id.simple().to_string().chars().take(8).collect();
    let _ = writeln!(text, "Hello! I'd like to confirm my order #{short_id}.");
    let _ = writeln!(text);
    for (n, item) in order.items.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. {} x{} - {}",
            n + 1,
            item.title,
            item.quantity,
            format_inr(item.subtotal())
        );
    }
    let _ = writeln!(text, "Total: {}", format_inr(order.total_amount));
    let _ = writeln!(text, "Payment: {}", order.payment_method.as_str());
    let _ = writeln!(text);

    let c = &order.customer;
    let _ = writeln!(text, "Name: {}", c.name);
    let _ = writeln!(text, "Phone: {}", c.phone);
    if let Some(email) = c.email.as_deref().filter(|e| !e.is_empty()) {
        let _ = writeln!(text, "Email: {email}");
    }
    let locality: Vec<&str> = [c.city.as_deref(), c.state.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    let mut address = c.address.clone();
    if !locality.is_empty() {
        address = format!("{address}, {}", locality.join(", "));
    }
    if let Some(pin) = c.pincode.as_deref().filter(|p| !p.is_empty()) {
        address = format!("{address} - {pin}");
    }
    let _ = write!(text, "Address: {address}");
    text
}

/// `https://wa.me/<number>?text=<message>`; `None` when no business number is configured.
pub fn chat_deep_link(business_number: &str, message: &str) -> Option<String> {
    let digits: String = business_number.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Url::parse_with_params(&format!("https://wa.me/{digits}"), &[("text", message)])
        .ok()
        .map(String::from)
}
