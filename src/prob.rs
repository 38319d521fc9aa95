//! Log-domain probability arithmetic.
//!
//! Probabilities are carried as natural logarithms. `log_plus` and
//! `log_minus` add and subtract them without leaving the log domain, with
//! the same floors as the HTK-style originals so that pruning decisions
//! downstream stay reproducible.

/// A probability represented by its natural logarithm.
pub type LnProb = f64;

/// Log of zero.
pub const LZERO: LnProb = -1.0e10;
/// Values below this are treated as log zero.
pub const LSMALL: LnProb = -0.5e10;
/// Lowest exp() argument that does not underflow.
pub const MINEARG: f64 = -708.3;
/// Lowest argument accepted by ln().
pub const MINLARG: f64 = 2.45e-308;

/// `ln(exp(x) + exp(y))`.
pub fn log_plus(x: LnProb, y: LnProb) -> LnProb {
    let (x, y) = if x < y { (y, x) } else { (x, y) };
    let diff = y - x;
    if diff < MINEARG {
        if x < LSMALL {
            LZERO
        } else {
            x
        }
    } else {
        x + (1.0 + diff.exp()).ln()
    }
}

/// `ln(exp(x) - exp(y))`.
///
/// Returns [`LZERO`] when `x == y`.
///
/// # Panics
///
/// Panics if `x < y`: the difference would be negative.
pub fn log_minus(x: LnProb, y: LnProb) -> LnProb {
    assert!(x >= y, "log_minus: {x} < {y}");
    if x == y {
        return LZERO;
    }
    let diff = y - x;
    if diff < MINEARG {
        if x < LSMALL {
            LZERO
        } else {
            x
        }
    } else {
        let z = 1.0 - diff.exp();
        assert!(z >= 0.0, "log_minus: negative argument {z}");
        if z < MINLARG {
            LZERO
        } else {
            x + z.ln()
        }
    }
}
