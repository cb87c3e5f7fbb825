pub mod coupon;
pub mod partner;
pub mod plan;

// Re-export entities
pub use coupon::{DiscountType, Entity as Coupon, Model as CouponModel};
pub use partner::{Entity as Partner, Model as PartnerModel};
pub use plan::{Entity as Plan, Model as PlanModel};
