pub mod solution;
pub mod tariff;
pub mod types;

pub use solution::*;
pub use tariff::*;
pub use types::*;
