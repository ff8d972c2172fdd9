//! Validation gate. Runs before any registration row or gateway order is
//! created. Everything here is pure and synchronous.

use chrono::Utc;

use crate::errors::{RegistrarError, Result};
use crate::models::{CartItem, CartItemInput, EventPolicy, RegistrationIntent, UserIdentity};

const DEFAULT_MAX_TEAM_SIZE: i64 = 1;

/// Decide whether `user` may register for `event`.
///
/// Checks run in a fixed order, so a closed event reports
/// [`RegistrarError::RegistrationClosed`] whatever its capacity or fee.
pub fn validate_event_registration(
    event: Option<&EventPolicy>,
    user: Option<&UserIdentity>,
) -> Result<RegistrationIntent> {
    let (event, user) = match (event, user) {
        (Some(e), Some(u)) => (e, u),
        _ => {
            return Err(RegistrarError::InvalidInput(
                "event and user are required".to_string(),
            ))
        }
    };

    if !event.is_registration_open {
        return Err(RegistrarError::RegistrationClosed(event.id.clone()));
    }

    if event.registered_count >= event.total_slots {
        return Err(RegistrarError::CapacityExceeded(event.id.clone()));
    }

    let user_id = user
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(RegistrarError::Unauthenticated)?;

    if !event.fee.is_finite() || event.fee < 0.0 {
        return Err(RegistrarError::InvalidFee(event.id.clone()));
    }

    Ok(RegistrationIntent {
        event_id: event.id.clone(),
        price: event.fee,
        user_id: user_id.to_string(),
        registration_type: event.registration_type.clone(),
        max_team_size: event
            .max_team_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TEAM_SIZE),
    })
}

/// Check a single cart line: it needs an event id and a numeric price.
pub fn validate_cart_item(item: &CartItemInput) -> Result<CartItem> {
    let event_id = item
        .event_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RegistrarError::InvalidCartItem("missing event_id".to_string()))?;

    let price = item
        .price
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| {
            RegistrarError::InvalidCartItem(format!("price for {event_id} must be a number"))
        })?;

    Ok(CartItem {
        event_id: event_id.to_string(),
        price,
        added_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_event() -> EventPolicy {
        EventPolicy {
            id: "hackathon".to_string(),
            name: "Hackathon".to_string(),
            is_registration_open: true,
            total_slots: 100,
            registered_count: 10,
            fee: 250.0,
            registration_type: "team".to_string(),
            max_team_size: Some(4),
        }
    }

    fn user() -> UserIdentity {
        UserIdentity {
            id: Some("kp_42".to_string()),
        }
    }

    #[test]
    fn accepts_open_event_with_capacity() {
        let intent = validate_event_registration(Some(&open_event()), Some(&user())).unwrap();
        assert_eq!(intent.event_id, "hackathon");
        assert_eq!(intent.price, 250.0);
        assert_eq!(intent.user_id, "kp_42");
        assert_eq!(intent.registration_type, "team");
        assert_eq!(intent.max_team_size, 4);
    }

    #[test]
    fn max_team_size_defaults_to_one() {
        let mut event = open_event();
        event.max_team_size = None;
        let intent = validate_event_registration(Some(&event), Some(&user())).unwrap();
        assert_eq!(intent.max_team_size, 1);
    }

    #[test]
    fn missing_event_or_user_is_invalid_input() {
        assert!(matches!(
            validate_event_registration(None, Some(&user())),
            Err(RegistrarError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_event_registration(Some(&open_event()), None),
            Err(RegistrarError::InvalidInput(_))
        ));
    }

    #[test]
    fn closed_registration_wins_over_everything_else() {
        let cases = [
            (100, 10, 250.0, Some("kp_42")),
            (10, 10, 250.0, Some("kp_42")),
            (100, 10, -5.0, Some("kp_42")),
            (100, 10, 250.0, None),
            (0, 50, f64::NAN, None),
        ];
        for (slots, count, fee, uid) in cases {
            let event = EventPolicy {
                is_registration_open: false,
                total_slots: slots,
                registered_count: count,
                fee,
                ..open_event()
            };
            let user = UserIdentity {
                id: uid.map(String::from),
            };
            assert!(matches!(
                validate_event_registration(Some(&event), Some(&user)),
                Err(RegistrarError::RegistrationClosed(_))
            ));
        }
    }

    #[test]
    fn full_event_is_capacity_exceeded_even_when_open() {
        for count in [100, 101, 500] {
            let event = EventPolicy {
                registered_count: count,
                ..open_event()
            };
            assert!(matches!(
                validate_event_registration(Some(&event), Some(&user())),
                Err(RegistrarError::CapacityExceeded(_))
            ));
        }
    }

    #[test]
    fn user_without_id_is_unauthenticated() {
        for id in [None, Some(String::new()), Some("   ".to_string())] {
            let user = UserIdentity { id };
            assert!(matches!(
                validate_event_registration(Some(&open_event()), Some(&user)),
                Err(RegistrarError::Unauthenticated)
            ));
        }
    }

    #[test]
    fn negative_or_nan_fee_is_rejected() {
        for fee in [-1.0, f64::NAN, f64::INFINITY] {
            let event = EventPolicy {
                fee,
                ..open_event()
            };
            assert!(matches!(
                validate_event_registration(Some(&event), Some(&user())),
                Err(RegistrarError::InvalidFee(_))
            ));
        }
    }

    #[test]
    fn free_event_is_allowed() {
        let event = EventPolicy {
            fee: 0.0,
            ..open_event()
        };
        let intent = validate_event_registration(Some(&event), Some(&user())).unwrap();
        assert_eq!(intent.price, 0.0);
    }

    #[test]
    fn cart_item_requires_event_and_numeric_price() {
        let ok = validate_cart_item(&CartItemInput {
            event_id: Some("hackathon".to_string()),
            price: Some(json!(250)),
        })
        .unwrap();
        assert_eq!(ok.event_id, "hackathon");
        assert_eq!(ok.price, 250.0);

        let bad = [
            CartItemInput {
                event_id: None,
                price: Some(json!(250)),
            },
            CartItemInput {
                event_id: Some(" ".to_string()),
                price: Some(json!(250)),
            },
            CartItemInput {
                event_id: Some("hackathon".to_string()),
                price: None,
            },
            CartItemInput {
                event_id: Some("hackathon".to_string()),
                price: Some(json!("250")),
            },
        ];
        for item in &bad {
            assert!(matches!(
                validate_cart_item(item),
                Err(RegistrarError::InvalidCartItem(_))
            ));
        }
    }
}
