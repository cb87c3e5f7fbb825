//! LovePage API Library
//!
//! Promotional pricing core for commemorative page checkout: local coupons,
//! payment-provider promotions, price composition and hosted checkout sessions.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod repositories;
pub mod services;

pub use errors::{CheckoutRejection, RejectionReason, ServiceError};
pub use services::commerce::{CheckoutQuote, CheckoutService, PriceComposer, PriceQuote};
pub use services::coupons::{CouponResolver, ResolutionOutcome, ResolvedDiscount};
