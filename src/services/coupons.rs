use crate::{
    entities::coupon::{canonical_code, DiscountType, Model as CouponModel},
    errors::{RejectionReason, ServiceError},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Read access to locally stored coupons.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Exact match on the canonical code. At most one row exists per code.
    async fn get_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError>;
}

/// Discount math of a coupon, already converted to minor units where possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountRule {
    Percentage(Decimal),
    /// `cents` is `None` when the stored amount does not fit in minor units.
    FixedAmount { cents: Option<i64> },
}

impl DiscountRule {
    /// Amount taken off `base_price_cents`, or `None` when not representable.
    pub fn discount_for(&self, base_price_cents: i64) -> Option<i64> {
        match *self {
            DiscountRule::Percentage(percent) => Decimal::from(base_price_cents)
                .checked_mul(percent)?
                .checked_div(Decimal::ONE_HUNDRED)
                .map(round_to_cents)?
                .to_i64(),
            DiscountRule::FixedAmount { cents } => cents,
        }
    }
}

/// A coupon row normalized for evaluation: UTC window bounds and a rule in minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponTerms {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    /// `None` only when the stored value is not positive.
    pub rule: Option<DiscountRule>,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
}

impl From<&CouponModel> for CouponTerms {
    fn from(coupon: &CouponModel) -> Self {
        Self {
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            discount_type: coupon.discount_type,
            discount_value: coupon.discount_value,
            rule: discount_rule(coupon.discount_type, coupon.discount_value),
            active: coupon.active,
            starts_at: coupon.start_date.map(start_of_day),
            ends_at: coupon.end_date.map(end_of_day),
            usage_limit: coupon.usage_limit,
            used_count: coupon.used_count,
        }
    }
}

impl CouponTerms {
    /// Every usability condition that fails at `at`. Empty means usable.
    pub fn eligibility_failures(&self, at: DateTime<Utc>) -> Vec<RejectionReason> {
        let mut failures = Vec::new();

        if !self.active {
            failures.push(RejectionReason::Inactive);
        }
        if matches!(self.starts_at, Some(starts_at) if at < starts_at) {
            failures.push(RejectionReason::BeforeWindow);
        }
        if matches!(self.ends_at, Some(ends_at) if at > ends_at) {
            failures.push(RejectionReason::AfterWindow);
        }
        if matches!(self.usage_limit, Some(limit) if self.used_count >= limit) {
            failures.push(RejectionReason::UsageExhausted);
        }
        if self.rule.is_none() {
            failures.push(RejectionReason::InvalidDiscountValue);
        }

        failures
    }
}

/// Where an accepted discount comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountSource {
    Local {
        coupon_id: Uuid,
        discount_type: DiscountType,
        discount_value: Decimal,
    },
    /// Applied natively by the payment provider; the amount is not known here.
    External { promotion_id: String },
}

/// Discount accepted for one checkout attempt. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDiscount {
    pub source: DiscountSource,
    pub code: String,
    pub discount_cents: i64,
}

impl ResolvedDiscount {
    pub fn coupon_id(&self) -> Option<Uuid> {
        match self.source {
            DiscountSource::Local { coupon_id, .. } => Some(coupon_id),
            DiscountSource::External { .. } => None,
        }
    }

    pub fn external_promotion_id(&self) -> Option<&str> {
        match &self.source {
            DiscountSource::External { promotion_id } => Some(promotion_id),
            DiscountSource::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Blank input; checkout proceeds at full price.
    NoCodeProvided,
    /// Never empty.
    Rejected(Vec<RejectionReason>),
    Accepted(ResolvedDiscount),
    /// Unknown locally; carries the canonical code for the provider lookup.
    DeferToExternal(String),
}

/// Decides a locally stored coupon against a base price at a point in time.
pub fn evaluate_coupon(
    coupon: &CouponModel,
    base_price_cents: i64,
    at: DateTime<Utc>,
) -> ResolutionOutcome {
    let terms = CouponTerms::from(coupon);

    let failures = terms.eligibility_failures(at);
    if !failures.is_empty() {
        return ResolutionOutcome::Rejected(failures);
    }

    let discount_cents = match terms.rule.and_then(|rule| rule.discount_for(base_price_cents)) {
        Some(cents) if cents > 0 => cents,
        _ => return ResolutionOutcome::Rejected(vec![RejectionReason::InvalidComputedAmount]),
    };

    if discount_cents >= base_price_cents {
        return ResolutionOutcome::Rejected(vec![RejectionReason::DiscountExceedsPrice]);
    }

    ResolutionOutcome::Accepted(ResolvedDiscount {
        source: DiscountSource::Local {
            coupon_id: terms.coupon_id,
            discount_type: terms.discount_type,
            discount_value: terms.discount_value,
        },
        code: terms.code,
        discount_cents,
    })
}

/// Resolves user-entered codes against local coupon storage.
#[derive(Clone)]
pub struct CouponResolver {
    store: Arc<dyn CouponStore>,
}

impl CouponResolver {
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self { store }
    }

    /// Store failures are returned as errors, never folded into a rejection.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        raw_code: &str,
        base_price_cents: i64,
        reference_time: DateTime<Utc>,
    ) -> Result<ResolutionOutcome, ServiceError> {
        let code = canonical_code(raw_code);
        if code.is_empty() {
            return Ok(ResolutionOutcome::NoCodeProvided);
        }

        match self.store.get_by_code(&code).await? {
            Some(coupon) => {
                let outcome = evaluate_coupon(&coupon, base_price_cents, reference_time);
                debug!(coupon_id = %coupon.id, ?outcome, "Evaluated local coupon");
                Ok(outcome)
            }
            None => {
                debug!(%code, "Coupon not found locally, deferring to payment provider");
                Ok(ResolutionOutcome::DeferToExternal(code))
            }
        }
    }
}

fn discount_rule(discount_type: DiscountType, value: Decimal) -> Option<DiscountRule> {
    if value <= Decimal::ZERO {
        return None;
    }

    match discount_type {
        DiscountType::Percentage => Some(DiscountRule::Percentage(value)),
        DiscountType::FixedAmount => Some(DiscountRule::FixedAmount {
            cents: value
                .checked_mul(Decimal::ONE_HUNDRED)
                .map(round_to_cents)
                .and_then(|cents| cents.to_i64()),
        }),
    }
}

fn round_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}
