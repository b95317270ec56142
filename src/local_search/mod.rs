//! Local search operators for improving routes.
//!
//! - [`two_opt_path`] — Fixed-endpoint 2-opt segment reversal, first improvement

mod two_opt;

pub use two_opt::two_opt_path;
