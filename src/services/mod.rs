// Discount code resolution
pub mod coupons;
pub mod promotions;

// Pricing and checkout
pub mod commerce;

// Payment provider
pub mod payments;

// Service factory for dependency injection
pub mod factory;
