//! Bounded scalar root finding.
//!
//! Every routine here has a compile-time iteration cap so that solve time
//! is bounded regardless of input.

/// Iteration cap of the safeguarded Newton search.
pub const MAX_NEWTON_ITERATIONS: usize = 64;

/// Iteration cap of plain bisection. 2⁻¹⁰⁰ of any bracket is below f64
/// resolution.
pub const MAX_BISECTION_ITERATIONS: usize = 100;

/// Safeguarded Newton iteration on a sign-changing bracket.
///
/// `f` returns the function value and its derivative. A Newton step is
/// taken when it stays strictly inside the current bracket, otherwise the
/// bracket is bisected. Returns the best estimate after convergence
/// (`|f| ≤ tol_f` or bracket width ≤ `tol_x`) or the iteration cap.
///
/// The caller guarantees `f(lo)` and `f(hi)` have opposite signs.
pub fn newton_bracketed<F>(mut lo: f64, mut hi: f64, f: F, tol_x: f64, tol_f: f64) -> f64
where
    F: Fn(f64) -> (f64, f64),
{
    if lo > hi {
        core::mem::swap(&mut lo, &mut hi);
    }
    let (mut f_lo, _) = f(lo);
    let mut x = 0.5 * (lo + hi);

    for _ in 0..MAX_NEWTON_ITERATIONS {
        let (fx, dfx) = f(x);
        if fx.abs() <= tol_f {
            return x;
        }
        if (fx < 0.0) == (f_lo < 0.0) {
            lo = x;
            f_lo = fx;
        } else {
            hi = x;
        }
        if hi - lo <= tol_x {
            break;
        }

        let newton = x - fx / dfx;
        x = if newton.is_finite() && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    0.5 * (lo + hi)
}

/// Plain bisection between `from` and `to` for the last point (seen from
/// `from`) where `pred` holds, assuming `pred(from)` is true and `pred`
/// flips at most once. The endpoints may be given in either order.
pub fn bisect_last<P>(mut from: f64, mut to: f64, pred: P) -> f64
where
    P: Fn(f64) -> bool,
{
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = 0.5 * (from + to);
        if mid == from || mid == to {
            break;
        }
        if pred(mid) {
            from = mid;
        } else {
            to = mid;
        }
    }
    from
}
