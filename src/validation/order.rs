use crate::error::{AppError, Result};
use crate::models::plan::Plan;

/// An order correlation id split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef<'a> {
    pub username: &'a str,
    pub plan: Plan,
    pub nonce: &'a str,
}

/// Longest username that fits in an order id.
pub const MAX_ORDER_USERNAME_LEN: usize = 255;

/// Checks that `username` survives a round trip through an order id.
///
/// Accounts may carry any non-empty name, so the only hard rules are the
/// ones the id format imposes: no `:` separator and no control
/// characters.
///
/// # Arguments
///
/// * `username` - The account name to embed.
///
/// # Returns
///
/// A `Result<()>` indicating whether the username can be embedded.
pub fn validate_order_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(AppError::Validation("Username must not be empty".to_string()));
    }

    if username.len() > MAX_ORDER_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at most {} bytes",
            MAX_ORDER_USERNAME_LEN
        )));
    }

    if username.chars().any(|c| c == ':' || c.is_control()) {
        return Err(AppError::Validation(
            "Username cannot contain ':' or control characters".to_string(),
        ));
    }

    Ok(())
}

/// Parses `username:plan:nonce`.
///
/// The id comes back from the payment provider and is treated as
/// untrusted: every segment is checked before anything is looked up.
pub fn parse_order_id(order_id: &str) -> Result<OrderRef<'_>> {
    let invalid = || AppError::Validation("Invalid order_id.".to_string());

    let mut parts = order_id.splitn(3, ':');
    let username = parts.next().unwrap_or_default();
    let plan = parts.next().ok_or_else(invalid)?;
    let nonce = parts.next().ok_or_else(invalid)?;

    validate_order_username(username).map_err(|_| invalid())?;
    let plan: Plan = plan.parse().map_err(|_| invalid())?;
    if nonce.is_empty() {
        return Err(invalid());
    }

    Ok(OrderRef {
        username,
        plan,
        nonce,
    })
}

/// Builds the order id the payment provider will echo back. Callers
/// check the username with [`validate_order_username`] first.
pub fn format_order_id(username: &str, plan: Plan, nonce: &str) -> String {
    format!("{}:{}:{}", username, plan.as_str(), nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ids() {
        let order = parse_order_id("alice_01:week:9f86d081884c7d65").unwrap();
        assert_eq!(order.username, "alice_01");
        assert_eq!(order.plan, Plan::Week);
        assert_eq!(order.nonce, "9f86d081884c7d65");
    }

    #[test]
    fn round_trips_through_format() {
        let id = format_order_id("bob", Plan::Month, "00ff");
        assert_eq!(parse_order_id(&id).unwrap().plan, Plan::Month);
    }

    #[test]
    fn rejects_bad_segments() {
        for id in [
            "",
            "alice",
            "alice:week",
            ":week:abc",
            "alice:year:abc",
            "alice:week:",
            "al:ice:week:abc",
            "ali\nce:week:abc",
            "ali\u{7f}ce:week:abc",
        ] {
            assert!(
                matches!(parse_order_id(id), Err(AppError::Validation(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_any_name_the_login_component_allows() {
        for name in ["john.doe", "a@b.c", "al ice", "x", "ünïcode"] {
            let id = format_order_id(name, Plan::Day, "ab12");
            let order = parse_order_id(&id).unwrap();
            assert_eq!(order.username, name);
            assert_eq!(order.plan, Plan::Day);
            assert_eq!(order.nonce, "ab12");
        }
    }

    #[test]
    fn embeddable_names_always_parse_back() {
        let longest = "z".repeat(MAX_ORDER_USERNAME_LEN);
        for name in ["bob_92", "john.doe", "x", longest.as_str()] {
            validate_order_username(name).unwrap();
            let id = format_order_id(name, Plan::Week, "00");
            assert_eq!(parse_order_id(&id).unwrap().username, name);
        }
    }

    #[test]
    fn names_that_would_break_the_id_are_refused() {
        let too_long = "z".repeat(MAX_ORDER_USERNAME_LEN + 1);
        for name in ["", "a:b", "tab\there", too_long.as_str()] {
            assert!(validate_order_username(name).is_err(), "{name:?}");
        }
    }
}
