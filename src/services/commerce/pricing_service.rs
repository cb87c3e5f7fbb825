use crate::{
    errors::{CheckoutRejection, RejectionReason},
    services::{
        coupons::{CouponResolver, DiscountSource, ResolutionOutcome, ResolvedDiscount},
        promotions::PromotionLookup,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const META_DISCOUNT_SOURCE: &str = "discountSource";
pub const META_COUPON_ID: &str = "couponId";
pub const META_DISCOUNT_TYPE: &str = "discountType";
pub const META_DISCOUNT_VALUE: &str = "discountValue";
pub const META_DISCOUNT_APPLIED: &str = "discountAppliedInCents";
pub const META_ORIGINAL_AMOUNT: &str = "originalAmountInCents";
pub const META_PROMOTION_CODE_ID: &str = "promotionCodeId";

/// Amounts for one checkout attempt, in minor currency units.
///
/// `final_amount == base_amount - discount_amount` and `final_amount > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub base_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
}

impl PriceQuote {
    pub fn full_price(base_amount: i64) -> Self {
        Self {
            base_amount,
            discount_amount: 0,
            final_amount: base_amount,
        }
    }

    fn discounted(base_amount: i64, discount_amount: i64) -> Self {
        Self {
            base_amount,
            discount_amount,
            final_amount: base_amount - discount_amount,
        }
    }
}

/// Quote plus everything the checkout session request needs to know about the discount.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutQuote {
    pub quote: PriceQuote,
    pub discount: Option<ResolvedDiscount>,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutQuote {
    fn full_price(base_amount: i64) -> Self {
        Self {
            quote: PriceQuote::full_price(base_amount),
            discount: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Provider promotion to apply natively, when the code resolved externally.
    pub fn promotion_reference(&self) -> Option<&str> {
        self.discount
            .as_ref()
            .and_then(ResolvedDiscount::external_promotion_id)
    }
}

/// Computes the chargeable amount for a plan price and an optional discount code.
#[derive(Clone)]
pub struct PriceComposer {
    resolver: CouponResolver,
    promotions: Arc<dyn PromotionLookup>,
}

impl PriceComposer {
    pub fn new(resolver: CouponResolver, promotions: Arc<dyn PromotionLookup>) -> Self {
        Self {
            resolver,
            promotions,
        }
    }

    /// Returns exactly one of a quote or a rejection. Never retries.
    #[instrument(skip(self))]
    pub async fn compose(
        &self,
        base_price_cents: i64,
        raw_code: Option<&str>,
        reference_time: DateTime<Utc>,
    ) -> Result<CheckoutQuote, CheckoutRejection> {
        if base_price_cents <= 0 {
            return Err(CheckoutRejection::InvalidBasePrice(base_price_cents));
        }

        let outcome = self
            .resolver
            .resolve(raw_code.unwrap_or_default(), base_price_cents, reference_time)
            .await
            .map_err(|e| {
                warn!(error = %e, "Coupon store lookup failed");
                counter!("lovepage.checkout.lookup_unavailable", 1);
                CheckoutRejection::LookupUnavailable(e.to_string())
            })?;

        match outcome {
            ResolutionOutcome::NoCodeProvided => {
                counter!("lovepage.checkout.quotes.full_price", 1);
                Ok(CheckoutQuote::full_price(base_price_cents))
            }
            ResolutionOutcome::Rejected(reasons) => Err(reject(reasons)),
            ResolutionOutcome::Accepted(discount) => {
                let quote = PriceQuote::discounted(base_price_cents, discount.discount_cents);
                info!(
                    code = %discount.code,
                    discount_cents = discount.discount_cents,
                    final_amount = quote.final_amount,
                    "Applied local coupon"
                );
                counter!("lovepage.checkout.quotes.discounted", 1);
                Ok(CheckoutQuote {
                    metadata: discount_metadata(&discount, base_price_cents),
                    quote,
                    discount: Some(discount),
                })
            }
            ResolutionOutcome::DeferToExternal(code) => {
                self.resolve_external(code, base_price_cents).await
            }
        }
    }

    async fn resolve_external(
        &self,
        code: String,
        base_price_cents: i64,
    ) -> Result<CheckoutQuote, CheckoutRejection> {
        let promotion = self
            .promotions
            .find_active_promotion(&code)
            .await
            .map_err(|e| {
                warn!(%code, error = %e, "Promotion lookup failed");
                counter!("lovepage.checkout.lookup_unavailable", 1);
                CheckoutRejection::LookupUnavailable(e.to_string())
            })?;

        let Some(promotion) = promotion else {
            return Err(reject(vec![RejectionReason::NotFoundExternally]));
        };

        info!(%code, promotion_id = %promotion.id, "Deferring discount to payment provider");
        counter!("lovepage.checkout.quotes.deferred", 1);

        let discount = ResolvedDiscount {
            source: DiscountSource::External {
                promotion_id: promotion.id,
            },
            code,
            discount_cents: 0,
        };

        Ok(CheckoutQuote {
            quote: PriceQuote::full_price(base_price_cents),
            metadata: discount_metadata(&discount, base_price_cents),
            discount: Some(discount),
        })
    }
}

fn reject(reasons: Vec<RejectionReason>) -> CheckoutRejection {
    let rejection = CheckoutRejection::InvalidPromoCode(reasons);
    warn!(%rejection, "Rejected promo code");
    for reason in rejection.reasons() {
        counter!("lovepage.checkout.rejections", 1, "reason" => reason.as_ref().to_string());
    }
    rejection
}

fn discount_metadata(discount: &ResolvedDiscount, base_price_cents: i64) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    match &discount.source {
        DiscountSource::Local {
            coupon_id,
            discount_type,
            discount_value,
        } => {
            metadata.insert(META_DISCOUNT_SOURCE.to_string(), "internal".to_string());
            metadata.insert(META_COUPON_ID.to_string(), coupon_id.to_string());
            metadata.insert(META_DISCOUNT_TYPE.to_string(), discount_type.as_str().to_string());
            metadata.insert(META_DISCOUNT_VALUE.to_string(), discount_value.normalize().to_string());
            metadata.insert(
                META_DISCOUNT_APPLIED.to_string(),
                discount.discount_cents.to_string(),
            );
        }
        DiscountSource::External { promotion_id } => {
            metadata.insert(META_DISCOUNT_SOURCE.to_string(), "external".to_string());
            metadata.insert(META_PROMOTION_CODE_ID.to_string(), promotion_id.clone());
        }
    }

    metadata.insert(META_ORIGINAL_AMOUNT.to_string(), base_price_cents.to_string());
    metadata
}
