//! Error handling foundation for atelier.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error types in their own
//! error modules, and I/O layers wrap them in a `Report` as they propagate.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }
}
