//! Conditions
//!
//! Resolves which commercial conditions, and which visibility and discount rules inside
//! them, apply to a user at a given instant by walking the `user -> membership -> company
//! -> assignment -> condition -> rule` associations of an [`store::EntityStore`].

pub mod access;
pub mod context;
pub mod discounts;
pub mod errors;
pub mod fixtures;
pub mod prelude;
pub mod projector;
pub mod records;
pub mod resolver;
pub mod service;
pub mod store;
pub mod uuids;
pub mod validity;

pub use errors::ConditionsError;
