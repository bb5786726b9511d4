//! Utility modules

pub mod decimal;
pub mod validation;

pub use decimal::*;
pub use validation::*;
