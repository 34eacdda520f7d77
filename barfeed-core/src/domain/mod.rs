//! Domain types: symbols, bars, per-symbol outcomes.

pub mod bar;
pub mod outcome;
pub mod symbol;

pub use bar::{round_to, Bar};
pub use outcome::FetchOutcome;
pub use symbol::{dedupe, normalize_all, Symbol};
