//! Dynamic pickup/delivery insertion into live routes.
//!
//! - [`DynamicInsertionComparator`] — Prices a constrained re-insertion against a tail append and keeps the cheaper
//! - [`InsertionReport`] — Both costs, the decision, and why a comparison was partial

mod comparator;

pub use comparator::{DynamicInsertionComparator, InsertionOutcome, InsertionReport, Strategy};
