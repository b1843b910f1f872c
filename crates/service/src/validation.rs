//! Shape checks for incoming carts and customer details.

use std::collections::HashMap;

use model::{CartLine, CreateOrderRequest, Customer};

use crate::ServiceError;

pub(crate) const MAX_LINE_QUANTITY: i32 = 100;

/// A request that passed validation: trimmed customer details and one line per product.
#[derive(Debug, Clone)]
pub(crate) struct ValidatedCart {
    pub customer: Customer,
    pub lines: Vec<CartLine>,
}

/// Reduces a phone number to its 10 local digits, dropping a `+91`/`91`/`0` prefix.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let local = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('0') => &digits[1..],
        12 if digits.starts_with("91") => &digits[2..],
        _ => return None,
    };
    Some(local.to_string())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Returns the first violation found, in the order: cart, phone, name, address, pincode, email, lines.
pub(crate) fn validate(request: &CreateOrderRequest) -> Result<ValidatedCart, ServiceError> {
    let invalid = |msg: String| -> Result<ValidatedCart, ServiceError> {
        Err(ServiceError::Validation(msg))
    };

    if request.cart.is_empty() {
        return invalid("Cart is empty".into());
    }

    let c = &request.customer;
    let Some(phone) = normalize_phone(&c.phone) else {
        return invalid("Phone number must have 10 digits".into());
    };
    let name = c.name.trim();
    if name.is_empty() {
        return invalid("Name is required".into());
    }
    let address = c.address.trim();
    if address.is_empty() {
        return invalid("Address is required".into());
    }
    let pincode = trimmed(&c.pincode);
    if let Some(pin) = &pincode {
        if pin.len() != 6 || !pin.chars().all(|ch| ch.is_ascii_digit()) {
            return invalid("Pincode must have 6 digits".into());
        }
    }
    let email = trimmed(&c.email);
    if let Some(email) = &email {
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return invalid("Email address is invalid".into());
        }
    }

    // Merge repeated products, keeping first-seen order.
    let mut lines: Vec<CartLine> = Vec::with_capacity(request.cart.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for (n, line) in request.cart.iter().enumerate() {
        let product_id = line.product_id.trim();
        if product_id.is_empty() {
            return invalid(format!("Cart line {} has no product id", n + 1));
        }
        if line.quantity < 1 {
            return invalid(format!("Quantity for {product_id} must be at least 1"));
        }
        match index.get(product_id) {
            Some(&i) => lines[i].quantity = lines[i].quantity.saturating_add(line.quantity),
            None => {
                index.insert(product_id.to_string(), lines.len());
                lines.push(CartLine {
                    product_id: product_id.to_string(),
                    quantity: line.quantity,
                });
            }
        }
    }
    if let Some(line) = lines.iter().find(|l| l.quantity > MAX_LINE_QUANTITY) {
        return invalid(format!(
            "Quantity for {} exceeds the limit of {MAX_LINE_QUANTITY}",
            line.product_id
        ));
    }

    Ok(ValidatedCart {
        customer: Customer {
            name: name.to_string(),
            phone,
            email,
            address: address.to_string(),
            pincode,
            city: trimmed(&c.city),
            state: trimmed(&c.state),
        },
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::PaymentMethod;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer: Customer {
                name: " Asha Rao ".into(),
                phone: "+91 98765 43210".into(),
                email: Some("".into()),
                address: "12 MG Road".into(),
                pincode: Some("560001".into()),
                city: None,
                state: None,
            },
            cart: vec![
                CartLine { product_id: "a".into(), quantity: 1 },
                CartLine { product_id: "b".into(), quantity: 2 },
                CartLine { product_id: "a".into(), quantity: 1 },
            ],
            payment_method: PaymentMethod::Gateway,
        }
    }

    fn message(req: &CreateOrderRequest) -> String {
        match validate(req) {
            Err(ServiceError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("9876543210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("+91-98765-43210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("09876543210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("98765"), None);
        assert_eq!(normalize_phone("449876543210"), None);
    }

    #[test]
    fn test_valid_request_is_normalized_and_merged() {
        let cart = validate(&request()).unwrap();
        assert_eq!(cart.customer.name, "Asha Rao");
        assert_eq!(cart.customer.phone, "9876543210");
        assert_eq!(cart.customer.email, None);
        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].product_id, "a");
        assert_eq!(cart.lines[0].quantity, 2);
        assert_eq!(cart.lines[1].quantity, 2);
    }

    #[test]
    fn test_first_violation_is_reported() {
        let mut req = request();
        req.cart.clear();
        req.customer.phone = "1".into();
        assert_eq!(message(&req), "Cart is empty");

        let mut req = request();
        req.customer.phone = "12345".into();
        req.customer.address = "".into();
        assert_eq!(message(&req), "Phone number must have 10 digits");

        let mut req = request();
        req.customer.address = "   ".into();
        assert_eq!(message(&req), "Address is required");

        let mut req = request();
        req.customer.pincode = Some("5600".into());
        assert_eq!(message(&req), "Pincode must have 6 digits");

        let mut req = request();
        req.cart[1].quantity = 0;
        assert_eq!(message(&req), "Quantity for b must be at least 1");

        let mut req = request();
        req.cart[0].quantity = MAX_LINE_QUANTITY;
        assert_eq!(message(&req), "Quantity for a exceeds the limit of 100");
    }
}
