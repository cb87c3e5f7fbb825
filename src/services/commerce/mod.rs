/// Commerce services module - plan pricing and checkout
pub mod checkout_service;
pub mod pricing_service;

// Re-export services for convenience
pub use checkout_service::{
    CheckoutGateway, CheckoutService, CheckoutSession, CheckoutSessionRequest, CheckoutSettings,
};
pub use pricing_service::{CheckoutQuote, PriceComposer, PriceQuote};
