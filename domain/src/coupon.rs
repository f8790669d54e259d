//! Coupon definition and the computed status state machine.

use crate::error::{CouponError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum accepted coupon name length.
const MAX_NAME_LEN: usize = 255;

/// Opaque coupon identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CouponId(pub Uuid);

impl CouponId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CouponId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CouponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Enumerated discount category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CouponType {
    /// Fried chicken discount.
    Chicken,
    /// Pizza discount.
    Pizza,
    /// Burger discount.
    Burger,
}

impl CouponType {
    /// Canonical name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chicken => "CHICKEN",
            Self::Pizza => "PIZZA",
            Self::Burger => "BURGER",
        }
    }
}

impl fmt::Display for CouponType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CouponType {
    type Err = CouponError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHICKEN" => Ok(Self::Chicken),
            "PIZZA" => Ok(Self::Pizza),
            "BURGER" => Ok(Self::Burger),
            _ => Err(CouponError::InvalidType { value: s.to_string() }),
        }
    }
}

/// Computed coupon status.
///
/// Status is never persisted as ground truth: it is derived from the current
/// time and the validity window on every read, with `Disabled` as the only
/// stored administrative override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponStatus {
    /// Before the validity window opens.
    Pending,
    /// Inside the validity window; issuable and usable.
    Active,
    /// After the validity window closes.
    Expired,
    /// Administratively suspended, regardless of the window.
    Disabled,
}

impl CouponStatus {
    /// Pure transition function of the status state machine.
    ///
    /// The upper bound is inclusive: at exactly `now == valid_until` the
    /// coupon is still `Active`.
    #[must_use]
    pub fn at(now: DateTime<Utc>, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>) -> Self {
        if now < valid_from {
            Self::Pending
        } else if now > valid_until {
            Self::Expired
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// Durable coupon definition.
///
/// `total_quantity` is immutable after creation and is the bound the whole
/// pipeline enforces: the number of persisted issuances never exceeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Unique id.
    pub id: CouponId,
    /// Display name (non-blank, at most 255 chars).
    pub name: String,
    /// Discount category.
    pub coupon_type: CouponType,
    /// Total number of units that may ever be issued.
    pub total_quantity: u32,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window (inclusive).
    pub valid_until: DateTime<Utc>,
    /// Administrative suspension override.
    pub disabled: bool,
}

impl Coupon {
    /// Create a new coupon definition, validating every invariant.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::InvalidName`] for a blank or oversized name,
    /// [`CouponError::InvalidQuantity`] when `total_quantity` is zero, and
    /// [`CouponError::InvalidPeriod`] when the window is reversed.
    pub fn new(
        name: impl Into<String>,
        coupon_type: CouponType,
        total_quantity: u32,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CouponError::InvalidName {
                reason: "name must not be blank".to_string(),
            });
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CouponError::InvalidName {
                reason: format!("name must be at most {MAX_NAME_LEN} characters"),
            });
        }
        if total_quantity == 0 {
            return Err(CouponError::InvalidQuantity {
                quantity: i64::from(total_quantity),
            });
        }
        if valid_from > valid_until {
            return Err(CouponError::InvalidPeriod);
        }
        Ok(Self {
            id: CouponId::new(),
            name,
            coupon_type,
            total_quantity,
            valid_from,
            valid_until,
            disabled: false,
        })
    }

    /// Rehydrate a coupon from trusted storage without re-validating.
    #[must_use]
    pub const fn from_parts(
        id: CouponId,
        name: String,
        coupon_type: CouponType,
        total_quantity: u32,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        disabled: bool,
    ) -> Self {
        Self {
            id,
            name,
            coupon_type,
            total_quantity,
            valid_from,
            valid_until,
            disabled,
        }
    }

    /// Computed status at `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> CouponStatus {
        if self.disabled {
            CouponStatus::Disabled
        } else {
            CouponStatus::at(now, self.valid_from, self.valid_until)
        }
    }

    /// Check that the coupon may be issued right now.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::NotIssuable`] carrying the computed status.
    pub fn ensure_issuable(&self, now: DateTime<Utc>) -> Result<()> {
        match self.status(now) {
            CouponStatus::Active => Ok(()),
            status => Err(CouponError::NotIssuable { status }),
        }
    }

    /// Check that an issued unit of this coupon may be consumed right now.
    ///
    /// Same predicate as [`Coupon::ensure_issuable`], distinct error kind.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::NotCurrentlyUsable`] carrying the computed
    /// status.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<()> {
        match self.status(now) {
            CouponStatus::Active => Ok(()),
            status => Err(CouponError::NotCurrentlyUsable { status }),
        }
    }

    /// Administratively suspend the coupon.
    pub fn disable(&mut self) {
        self.disabled = true;
    }
}

/// Outcome of an admission request.
///
/// Duplicate and sold-out are expected results of a healthy system, not
/// errors; they are surfaced as values so the caller can map them to normal
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueRequestResult {
    /// Request admitted; fulfillment will happen asynchronously.
    Success,
    /// This user already passed admission for this coupon.
    Duplicate,
    /// The first N slots are taken.
    SoldOut,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::Duration;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::days(1), now + Duration::days(10))
    }

    #[test]
    fn status_transitions_follow_the_window() {
        let (from, until) = window();
        assert_eq!(
            CouponStatus::at(from - Duration::seconds(1), from, until),
            CouponStatus::Pending
        );
        assert_eq!(CouponStatus::at(from, from, until), CouponStatus::Active);
        assert_eq!(
            CouponStatus::at(until + Duration::seconds(1), from, until),
            CouponStatus::Expired
        );
    }

    #[test]
    fn status_is_active_at_exactly_valid_until() {
        let (from, until) = window();
        assert_eq!(CouponStatus::at(until, from, until), CouponStatus::Active);
    }

    #[test]
    fn disabled_overrides_the_window() {
        let (from, until) = window();
        let mut coupon = Coupon::new("launch event", CouponType::Chicken, 100, from, until)
            .expect("valid coupon");
        assert_eq!(coupon.status(Utc::now()), CouponStatus::Active);

        coupon.disable();
        assert_eq!(coupon.status(Utc::now()), CouponStatus::Disabled);
        assert!(matches!(
            coupon.ensure_issuable(Utc::now()),
            Err(CouponError::NotIssuable {
                status: CouponStatus::Disabled
            })
        ));
    }

    #[test]
    fn reversed_window_is_rejected() {
        let now = Utc::now();
        let result = Coupon::new(
            "backwards",
            CouponType::Pizza,
            10,
            now,
            now - Duration::hours(1),
        );
        assert_eq!(result, Err(CouponError::InvalidPeriod));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let (from, until) = window();
        let result = Coupon::new("empty", CouponType::Burger, 0, from, until);
        assert_eq!(result, Err(CouponError::InvalidQuantity { quantity: 0 }));
    }

    #[test]
    fn blank_name_is_rejected() {
        let (from, until) = window();
        assert!(matches!(
            Coupon::new("   ", CouponType::Burger, 5, from, until),
            Err(CouponError::InvalidName { .. })
        ));
    }

    #[test]
    fn coupon_type_parses_case_insensitively() {
        assert_eq!("chicken".parse::<CouponType>(), Ok(CouponType::Chicken));
        assert_eq!(" PIZZA ".parse::<CouponType>(), Ok(CouponType::Pizza));
        assert!(matches!(
            "sushi".parse::<CouponType>(),
            Err(CouponError::InvalidType { .. })
        ));
    }

    #[test]
    fn not_usable_and_not_issuable_are_distinct_errors() {
        let now = Utc::now();
        let coupon = Coupon::new(
            "over",
            CouponType::Chicken,
            1,
            now - Duration::days(2),
            now - Duration::days(1),
        )
        .expect("valid coupon");

        assert!(matches!(
            coupon.ensure_issuable(now),
            Err(CouponError::NotIssuable {
                status: CouponStatus::Expired
            })
        ));
        assert!(matches!(
            coupon.ensure_usable(now),
            Err(CouponError::NotCurrentlyUsable {
                status: CouponStatus::Expired
            })
        ));
    }
}
