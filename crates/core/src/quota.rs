//! Quota ledger: admission rules and consumption accounting.
//!
//! Operates on the quota counters stored on the user row and on the limits
//! of the user's subscription tier. Everything here is pure; the caller is
//! responsible for loading the counters (under a row lock) and writing them
//! back.
//!
//! Admission order:
//! 1. A positive free-credit balance always admits and bypasses the tier.
//! 2. Tier level 0 means no subscription.
//! 3. An expiry timestamp in the past rejects, whatever the tier.
//! 4. A limited tier rejects once the usage of the current period reaches
//!    the allowance. A period whose reset anchor has passed counts as empty.

use std::fmt;

use chrono::{Duration, Months};

use crate::artifacts::OutputShape;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// `monthly_allowance` sentinel meaning "no monthly limit".
pub const UNLIMITED_ALLOWANCE: i32 = -1;

/// Subscription level of a user without a subscription.
pub const NO_SUBSCRIPTION_LEVEL: i16 = 0;

/// Fallback period length when calendar month arithmetic overflows.
const FALLBACK_PERIOD_DAYS: i64 = 30;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Quota counters carried on the user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCounters {
    /// Free generations, spent before any tier-based quota.
    pub free_generations: i32,
    /// Subscription tier level (0 = none).
    pub subscription_level: i16,
    /// End of the paid subscription, if any.
    pub subscription_ends_at: Option<Timestamp>,
    /// Generations started in the current period.
    pub generations_used_this_month: i32,
    /// Reset anchor: once `now` reaches it the monthly counter is stale.
    pub generations_reset_at: Option<Timestamp>,
    /// Lifetime generation count.
    pub total_generations: i32,
}

/// Limits attached to one subscription tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLimits {
    pub level: i16,
    /// Generations per period, or [`UNLIMITED_ALLOWANCE`].
    pub monthly_allowance: i32,
    /// Whether the tier may attach subliminal text to a generation.
    pub allows_subliminal: bool,
    /// Whether the tier's worker output is an image set instead of a video.
    pub photos_only: bool,
}

impl TierLimits {
    pub fn is_unlimited(&self) -> bool {
        self.monthly_allowance == UNLIMITED_ALLOWANCE
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why a generation was not admitted. Surfaced verbatim to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    SubscriptionRequired,
    SubscriptionExpired,
    MonthlyLimitReached { allowance: i32 },
    SubliminalNotAllowed,
}

impl RejectionReason {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::SubscriptionRequired => "SUBSCRIPTION_REQUIRED",
            Self::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            Self::MonthlyLimitReached { .. } => "MONTHLY_LIMIT_REACHED",
            Self::SubliminalNotAllowed => "SUBLIMINAL_NOT_ALLOWED",
        }
    }

    /// Human-readable message.
    pub fn message(self) -> String {
        match self {
            Self::SubscriptionRequired => {
                "A subscription is required to generate a dream".to_string()
            }
            Self::SubscriptionExpired => "Your subscription has expired".to_string(),
            Self::MonthlyLimitReached { allowance } => {
                format!("Monthly limit reached ({allowance} generations per month)")
            }
            Self::SubliminalNotAllowed => {
                "Subliminal text is not available on your subscription".to_string()
            }
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Outcome of [`can_admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<RejectionReason>,
    /// Set when the free-credit path admitted the request.
    pub use_free_credit: bool,
}

impl AdmissionDecision {
    fn free_credit() -> Self {
        Self {
            allowed: true,
            reason: None,
            use_free_credit: true,
        }
    }

    fn subscription() -> Self {
        Self {
            allowed: true,
            reason: None,
            use_free_credit: false,
        }
    }

    fn rejected(reason: RejectionReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            use_free_credit: false,
        }
    }

    /// Convert into a `Result`, keeping only the free-credit flag on success.
    pub fn into_result(self) -> Result<bool, RejectionReason> {
        match self.reason {
            Some(reason) if !self.allowed => Err(reason),
            _ => Ok(self.use_free_credit),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Whether the monthly counter still belongs to the current period.
///
/// A missing anchor or an anchor at or before `now` means the counter is
/// stale and logically zero.
pub fn period_is_current(reset_at: Option<Timestamp>, now: Timestamp) -> bool {
    reset_at.is_some_and(|anchor| anchor > now)
}

/// Monthly usage as it should be compared against the allowance.
pub fn effective_monthly_usage(counters: &QuotaCounters, now: Timestamp) -> i32 {
    if period_is_current(counters.generations_reset_at, now) {
        counters.generations_used_this_month
    } else {
        0
    }
}

/// Decide whether the user may start a generation.
///
/// `tier` is the limits row for `counters.subscription_level`; `None` when no
/// such tier exists.
pub fn can_admit(
    counters: &QuotaCounters,
    tier: Option<&TierLimits>,
    now: Timestamp,
) -> AdmissionDecision {
    if counters.free_generations > 0 {
        return AdmissionDecision::free_credit();
    }

    if counters.subscription_level == NO_SUBSCRIPTION_LEVEL {
        return AdmissionDecision::rejected(RejectionReason::SubscriptionRequired);
    }

    if counters.subscription_ends_at.is_some_and(|ends| ends < now) {
        return AdmissionDecision::rejected(RejectionReason::SubscriptionExpired);
    }

    let Some(tier) = tier else {
        return AdmissionDecision::rejected(RejectionReason::SubscriptionRequired);
    };

    if !tier.is_unlimited() && effective_monthly_usage(counters, now) >= tier.monthly_allowance
    {
        return AdmissionDecision::rejected(RejectionReason::MonthlyLimitReached {
            allowance: tier.monthly_allowance,
        });
    }

    AdmissionDecision::subscription()
}

/// Apply one admitted generation to the counters.
///
/// Must be applied exactly once per admitted run, in the same transaction
/// that creates the run.
pub fn record_consumption(counters: &mut QuotaCounters, used_free_credit: bool, now: Timestamp) {
    if used_free_credit {
        counters.free_generations = (counters.free_generations - 1).max(0);
    } else if period_is_current(counters.generations_reset_at, now) {
        counters.generations_used_this_month += 1;
    } else {
        counters.generations_used_this_month = 1;
        counters.generations_reset_at = Some(one_month_after(now));
    }
    counters.total_generations += 1;
}

/// Reverse one consumption after a user cancellation.
///
/// Gives back what the run consumed: a free credit when the free path was
/// used, otherwise one unit of the monthly counter. The lifetime counter is
/// always decremented. Counters never go below zero.
pub fn refund_consumption(counters: &mut QuotaCounters, used_free_credit: bool) {
    if used_free_credit {
        counters.free_generations += 1;
    } else {
        counters.generations_used_this_month = (counters.generations_used_this_month - 1).max(0);
    }
    counters.total_generations = (counters.total_generations - 1).max(0);
}

/// Next reset anchor, one calendar month after `now`.
pub fn one_month_after(now: Timestamp) -> Timestamp {
    now.checked_add_months(Months::new(1))
        .unwrap_or_else(|| now + Duration::days(FALLBACK_PERIOD_DAYS))
}

// ---------------------------------------------------------------------------
// Feature gates
// ---------------------------------------------------------------------------

/// Subliminal text requires a tier flag. Free-credit users without a tier
/// row are refused.
pub fn check_subliminal(
    tier: Option<&TierLimits>,
    requested: bool,
) -> Result<(), RejectionReason> {
    if !requested || tier.is_some_and(|t| t.allows_subliminal) {
        Ok(())
    } else {
        Err(RejectionReason::SubliminalNotAllowed)
    }
}

/// The worker output shape is a tier property, never a user choice.
pub fn output_shape(tier: Option<&TierLimits>) -> OutputShape {
    if tier.is_some_and(|t| t.photos_only) {
        OutputShape::ImageSet
    } else {
        OutputShape::Video
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn counters() -> QuotaCounters {
        QuotaCounters {
            free_generations: 0,
            subscription_level: 1,
            subscription_ends_at: Some(now() + Duration::days(60)),
            generations_used_this_month: 0,
            generations_reset_at: Some(now() + Duration::days(10)),
            total_generations: 0,
        }
    }

    fn tier(allowance: i32) -> TierLimits {
        TierLimits {
            level: 1,
            monthly_allowance: allowance,
            allows_subliminal: false,
            photos_only: false,
        }
    }

    // -- can_admit --

    #[test]
    fn free_credit_admits_without_subscription() {
        let c = QuotaCounters {
            free_generations: 2,
            subscription_level: 0,
            subscription_ends_at: None,
            ..counters()
        };
        let d = can_admit(&c, None, now());
        assert!(d.allowed);
        assert!(d.use_free_credit);
        assert_eq!(d.reason, None);
    }

    #[test]
    fn free_credit_bypasses_expired_subscription_and_full_quota() {
        let c = QuotaCounters {
            free_generations: 1,
            subscription_ends_at: Some(now() - Duration::days(1)),
            generations_used_this_month: 99,
            ..counters()
        };
        let d = can_admit(&c, Some(&tier(3)), now());
        assert!(d.allowed);
        assert!(d.use_free_credit);
    }

    #[test]
    fn no_subscription_is_rejected() {
        let c = QuotaCounters {
            subscription_level: 0,
            ..counters()
        };
        let d = can_admit(&c, Some(&tier(3)), now());
        assert!(!d.allowed);
        assert_eq!(d.reason, Some(RejectionReason::SubscriptionRequired));
    }

    #[test]
    fn expired_subscription_is_rejected_even_with_zero_usage() {
        let c = QuotaCounters {
            subscription_ends_at: Some(now() - Duration::seconds(1)),
            ..counters()
        };
        let d = can_admit(&c, Some(&tier(UNLIMITED_ALLOWANCE)), now());
        assert_eq!(d.reason, Some(RejectionReason::SubscriptionExpired));
    }

    #[test]
    fn missing_tier_row_is_rejected() {
        let d = can_admit(&counters(), None, now());
        assert_eq!(d.reason, Some(RejectionReason::SubscriptionRequired));
    }

    #[test]
    fn monthly_limit_reached_within_period() {
        let c = QuotaCounters {
            generations_used_this_month: 3,
            ..counters()
        };
        let d = can_admit(&c, Some(&tier(3)), now());
        assert_eq!(
            d.reason,
            Some(RejectionReason::MonthlyLimitReached { allowance: 3 })
        );
    }

    #[test]
    fn stale_counter_admits_after_anchor_passed() {
        let c = QuotaCounters {
            generations_used_this_month: 3,
            generations_reset_at: Some(now() - Duration::hours(1)),
            ..counters()
        };
        let d = can_admit(&c, Some(&tier(3)), now());
        assert!(d.allowed);
        assert!(!d.use_free_credit);
    }

    #[test]
    fn anchor_equal_to_now_counts_as_passed() {
        let c = QuotaCounters {
            generations_used_this_month: 3,
            generations_reset_at: Some(now()),
            ..counters()
        };
        assert!(can_admit(&c, Some(&tier(3)), now()).allowed);
    }

    #[test]
    fn unlimited_tier_ignores_usage() {
        let c = QuotaCounters {
            generations_used_this_month: 10_000,
            ..counters()
        };
        assert!(can_admit(&c, Some(&tier(UNLIMITED_ALLOWANCE)), now()).allowed);
    }

    #[test]
    fn decision_into_result() {
        let ok = can_admit(&counters(), Some(&tier(3)), now()).into_result();
        assert_eq!(ok, Ok(false));
        let c = QuotaCounters {
            subscription_level: 0,
            ..counters()
        };
        let err = can_admit(&c, None, now()).into_result();
        assert_eq!(err, Err(RejectionReason::SubscriptionRequired));
    }

    // -- record / refund --

    #[test]
    fn free_credit_consumption_never_touches_monthly_counter() {
        let mut c = QuotaCounters {
            free_generations: 2,
            generations_used_this_month: 1,
            ..counters()
        };
        let anchor = c.generations_reset_at;
        record_consumption(&mut c, true, now());
        assert_eq!(c.free_generations, 1);
        assert_eq!(c.generations_used_this_month, 1);
        assert_eq!(c.generations_reset_at, anchor);
        assert_eq!(c.total_generations, 1);
    }

    #[test]
    fn consumption_within_period_increments() {
        let mut c = QuotaCounters {
            generations_used_this_month: 2,
            ..counters()
        };
        record_consumption(&mut c, false, now());
        assert_eq!(c.generations_used_this_month, 3);
        assert_eq!(c.total_generations, 1);
    }

    #[test]
    fn consumption_after_anchor_restarts_period() {
        let mut c = QuotaCounters {
            generations_used_this_month: 7,
            generations_reset_at: Some(now() - Duration::days(2)),
            ..counters()
        };
        record_consumption(&mut c, false, now());
        assert_eq!(c.generations_used_this_month, 1);
        assert_eq!(
            c.generations_reset_at,
            Some(Utc.with_ymd_and_hms(2026, 4, 15, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn refund_restores_free_credit() {
        let mut c = QuotaCounters {
            free_generations: 0,
            total_generations: 4,
            ..counters()
        };
        refund_consumption(&mut c, true);
        assert_eq!(c.free_generations, 1);
        assert_eq!(c.total_generations, 3);
    }

    #[test]
    fn refund_of_subscription_run_gives_back_monthly_unit() {
        let mut c = QuotaCounters {
            generations_used_this_month: 0,
            total_generations: 0,
            ..counters()
        };
        refund_consumption(&mut c, false);
        assert_eq!(c.generations_used_this_month, 0);
        assert_eq!(c.total_generations, 0);
    }

    #[test]
    fn one_month_after_clamps_end_of_month() {
        let jan31 = Utc.with_ymd_and_hms(2026, 1, 31, 8, 0, 0).unwrap();
        assert_eq!(
            one_month_after(jan31),
            Utc.with_ymd_and_hms(2026, 2, 28, 8, 0, 0).unwrap()
        );
    }

    // -- end-to-end ledger scenario --

    #[test]
    fn tier_allowance_over_a_period_boundary() {
        let limits = tier(3);
        let mut c = QuotaCounters {
            generations_used_this_month: 2,
            ..counters()
        };

        // Third generation of the period is admitted.
        let first = can_admit(&c, Some(&limits), now());
        assert!(first.allowed);
        record_consumption(&mut c, first.use_free_credit, now());
        assert_eq!(c.generations_used_this_month, 3);

        // Fourth is refused.
        let second = can_admit(&c, Some(&limits), now());
        assert_eq!(
            second.reason,
            Some(RejectionReason::MonthlyLimitReached { allowance: 3 })
        );

        // Once the anchor is in the past the period restarts.
        c.generations_reset_at = Some(now() - Duration::minutes(1));
        let third = can_admit(&c, Some(&limits), now());
        assert!(third.allowed);
        record_consumption(&mut c, third.use_free_credit, now());
        assert_eq!(c.generations_used_this_month, 1);
        assert!(period_is_current(c.generations_reset_at, now()));
        assert_eq!(c.total_generations, 2);
    }

    // -- feature gates --

    #[test]
    fn subliminal_requires_tier_flag() {
        let mut t = tier(3);
        assert_eq!(
            check_subliminal(Some(&t), true),
            Err(RejectionReason::SubliminalNotAllowed)
        );
        assert_eq!(check_subliminal(Some(&t), false), Ok(()));
        t.allows_subliminal = true;
        assert_eq!(check_subliminal(Some(&t), true), Ok(()));
        assert_eq!(
            check_subliminal(None, true),
            Err(RejectionReason::SubliminalNotAllowed)
        );
    }

    #[test]
    fn output_shape_follows_tier_flag() {
        let mut t = tier(3);
        assert_eq!(output_shape(Some(&t)), OutputShape::Video);
        t.photos_only = true;
        assert_eq!(output_shape(Some(&t)), OutputShape::ImageSet);
        assert_eq!(output_shape(None), OutputShape::Video);
    }

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(
            RejectionReason::MonthlyLimitReached { allowance: 5 }.code(),
            "MONTHLY_LIMIT_REACHED"
        );
        assert_eq!(
            RejectionReason::MonthlyLimitReached { allowance: 5 }.to_string(),
            "Monthly limit reached (5 generations per month)"
        );
    }
}
