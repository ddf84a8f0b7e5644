//! Set-partitioning optimization of duties by column generation.
//!
//! - [`master`]: the restricted master LP over the known duties,
//! - [`pricing`]: search for new duties with negative reduced cost,
//! - [`column_generation`]: the solve / price / inject loop and the final
//!   integer selection.

pub mod column_generation;
pub mod master;
pub mod pricing;

pub use column_generation::*;
pub use master::*;
pub use pricing::*;
