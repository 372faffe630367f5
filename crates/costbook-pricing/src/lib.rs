//! Rate tables and cost calculator for costbook
//!
//! This crate holds the pricing collaborator the ledger consumes: per-category
//! rate tables (built-in or loaded from JSON) and the calculator that turns
//! usage quantities into fixed-point costs.

pub mod cost_calculator;
pub mod rates;

pub use cost_calculator::{CostCalculator, Pricing};
pub use rates::{CategoryRates, PricingTable, Rate};
