use crate::models::{Greeks, OptionSide};

const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

// -----------------------------------------------
// IV BISECTION BOUNDS
// -----------------------------------------------
pub const IV_LOWER: f64 = 1e-6;
pub const IV_UPPER: f64 = 5.0;
pub const IV_ITERATIONS: usize = 50;

/// Standard normal cumulative distribution function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal probability density function.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

fn d1(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

/// Black-Scholes delta/vega/theta, continuous compounding, no dividends.
///
/// Returned Greeks are raw per-unit values: delta per unit of spot, vega per
/// unit of vol (not per 1%), theta per year (not per day). Any display
/// scaling happens downstream of the log, never here.
///
/// Expired or unpriced instruments (t <= 0 or sigma <= 0) yield exactly
/// (0, 0, 0) so they cannot poison aggregate sums with NaN.
pub fn option_greeks(side: OptionSide, s: f64, k: f64, t: f64, r: f64, sigma: f64) -> Greeks {
    if t <= 0.0 || sigma <= 0.0 {
        return Greeks::default();
    }

    let sqrt_t = t.sqrt();
    let d1 = d1(s, k, t, r, sigma);
    let d2 = d1 - sigma * sqrt_t;
    let decay = -s * norm_pdf(d1) * sigma / (2.0 * sqrt_t);
    let carry = r * k * (-r * t).exp();

    let (delta, theta) = match side {
        OptionSide::Call => (norm_cdf(d1), decay - carry * norm_cdf(d2)),
        OptionSide::Put => (-norm_cdf(-d1), decay + carry * norm_cdf(-d2)),
    };

    Greeks {
        delta,
        vega: s * norm_pdf(d1) * sqrt_t,
        theta,
    }
}

/// Black-Scholes theoretical price.
pub fn bs_price(side: OptionSide, s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    if t <= 0.0 {
        return intrinsic(side, s, k);
    }
    if sigma <= 0.0 {
        // zero-vol limit: discounted intrinsic
        return match side {
            OptionSide::Call => (s - k * (-r * t).exp()).max(0.0),
            OptionSide::Put => (k * (-r * t).exp() - s).max(0.0),
        };
    }

    let d1 = d1(s, k, t, r, sigma);
    let d2 = d1 - sigma * t.sqrt();
    let disc_k = k * (-r * t).exp();
    match side {
        OptionSide::Call => s * norm_cdf(d1) - disc_k * norm_cdf(d2),
        OptionSide::Put => disc_k * norm_cdf(-d2) - s * norm_cdf(-d1),
    }
}

fn intrinsic(side: OptionSide, s: f64, k: f64) -> f64 {
    match side {
        OptionSide::Call => (s - k).max(0.0),
        OptionSide::Put => (k - s).max(0.0),
    }
}

/// Invert Black-Scholes for the vol implied by a traded price.
///
/// Price is monotone increasing in vol, so plain bisection over
/// [IV_LOWER, IV_UPPER] converges; 50 halvings leave an interval far below
/// any tolerance we care about. Returns None when the price is out of
/// no-arbitrage range (<= 0 or <= the zero-vol lower bound); callers skip
/// that instrument rather than aborting.
pub fn implied_vol(side: OptionSide, s: f64, k: f64, t: f64, r: f64, price: f64) -> Option<f64> {
    if t <= 0.0 || price <= 0.0 {
        return None;
    }
    if price <= bs_price(side, s, k, t, r, 0.0) {
        return None;
    }

    let mut lo = IV_LOWER;
    let mut hi = IV_UPPER;
    for _ in 0..IV_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if bs_price(side, s, k, t, r, mid) < price {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}
