//! Canonical invoice model and shared reference data.
//!
//! Both syntax mappers ([`crate::mapping`]) normalise into
//! [`model::CanonicalInvoice`]; the arithmetic and business stages operate on
//! it exclusively.

pub mod countries;
pub mod currencies;
pub mod iban;
pub mod model;

pub use model::*;
