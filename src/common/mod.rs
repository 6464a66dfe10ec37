//! Common functionality.

use std::ops::Range;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;
pub mod noodles;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Parameter or input validation failed; maps to exit code 100.
#[derive(thiserror::Error, Debug)]
#[error("invalid parameters or inputs:\n{}", messages.join("\n"))]
pub struct ParamsError {
    /// All collected validation failures.
    pub messages: Vec<String>,
}

/// Compute reciprocal overlap between two half-open ranges.
///
/// This is the length of the intersection divided by the length of the
/// longer of the two ranges; `0.0` when they do not intersect.
pub fn reciprocal_overlap(lhs: Range<i64>, rhs: Range<i64>) -> f64 {
    let ovl_b = std::cmp::max(lhs.start, rhs.start);
    let ovl_e = std::cmp::min(lhs.end, rhs.end);
    if ovl_b >= ovl_e {
        0f64
    } else {
        let ovl_len = (ovl_e - ovl_b) as f64;
        let x1 = ovl_len / (lhs.end - lhs.start) as f64;
        let x2 = ovl_len / (rhs.end - rhs.start) as f64;
        x1.min(x2)
    }
}

/// Round `value` to `digits` decimal places.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// The version of the `sv-bencher` package.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return the version of the `sv-bencher` crate and `x.y.z` in tests.
pub fn bencher_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case(0..10, 0..10, 1.0)]
    #[case(0..10, 5..15, 0.5)]
    #[case(5..15, 0..10, 0.5)]
    #[case(0..10, 10..20, 0.0)]
    #[case(0..2, 0..10, 0.2)]
    #[case(0..10, 0..2, 0.2)]
    #[case(100..200, 120..160, 0.4)]
    fn reciprocal_overlap(
        #[case] lhs: std::ops::Range<i64>,
        #[case] rhs: std::ops::Range<i64>,
        #[case] expected: f64,
    ) {
        let actual = super::reciprocal_overlap(lhs, rhs);
        assert!(float_cmp::approx_eq!(f64, expected, actual, ulps = 2))
    }

    #[rstest::rstest]
    #[case(0.123456, 4, 0.1235)]
    #[case(0.1, 4, 0.1)]
    #[case(-8.04, 1, -8.0)]
    fn round_to(#[case] value: f64, #[case] digits: i32, #[case] expected: f64) {
        assert_eq!(expected, super::round_to(value, digits));
    }

    #[test]
    fn bencher_version() {
        assert_eq!("x.y.z", super::bencher_version());
    }
}
