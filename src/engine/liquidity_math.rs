//! Liquidity and price derivations from observed token flows.

use crate::tables::{LiqChange, PositionType};

/// Flows below this magnitude on both sides are treated as rounding noise.
pub const MIN_NUMERIC_STABLE_FLOW: f64 = 1000.0;

pub fn tick_to_price(tick: i32) -> f64 {
    1.0001_f64.powi(tick)
}

fn tick_to_sqrt_price(tick: i32) -> f64 {
    tick_to_price(tick).sqrt()
}

/// False only when both flows are below the noise threshold.
pub fn is_flow_numerically_stable(base_flow: f64, quote_flow: f64) -> bool {
    base_flow.abs() >= MIN_NUMERIC_STABLE_FLOW || quote_flow.abs() >= MIN_NUMERIC_STABLE_FLOW
}

/// Both flows are large enough for their ratio to be a usable price.
pub fn is_flow_dual_stable(base_flow: f64, quote_flow: f64) -> bool {
    base_flow.abs() >= MIN_NUMERIC_STABLE_FLOW && quote_flow.abs() >= MIN_NUMERIC_STABLE_FLOW
}

pub fn derive_liquidity_from_ambient_flow(base_flow: f64, quote_flow: f64) -> f64 {
    (base_flow.abs() * quote_flow.abs()).sqrt()
}

pub fn derive_price_from_ambient_flow(base_flow: f64, quote_flow: f64) -> f64 {
    (base_flow / quote_flow).abs()
}

pub fn derive_price_from_swap_flow(base_flow: f64, quote_flow: f64) -> f64 {
    (base_flow / quote_flow).abs()
}

/// Square-root price implied by a two-sided in-range flow at `[bid, ask]`.
///
/// Solves `a·p² + b·p + c = 0` with `a = quote·pa`, `b = base − quote·pb·pa`,
/// `c = −base·pa` and returns the root inside `[pb, pa]`, or the other root
/// when neither lands inside.
pub fn derive_sqrt_price_in_range(base_flow: f64, quote_flow: f64, bid_tick: i32, ask_tick: i32) -> f64 {
    let base_flow = base_flow.abs();
    let quote_flow = quote_flow.abs();
    let pb = tick_to_sqrt_price(bid_tick);
    let pa = tick_to_sqrt_price(ask_tick);

    let term_a = quote_flow * pa;
    let term_b = base_flow - quote_flow * pb * pa;
    let term_c = -base_flow * pa;

    let disc = (term_b * term_b - 4.0 * term_a * term_c).max(0.0).sqrt();
    let root_pos = (-term_b + disc) / (2.0 * term_a);
    let root_neg = (-term_b - disc) / (2.0 * term_a);

    if root_pos >= pb && root_pos <= pa {
        root_pos
    } else {
        root_neg
    }
}

/// Pool price implied by a concentrated liquidity flow, if both sides moved.
pub fn derive_price_from_conc_flow(
    base_flow: f64,
    quote_flow: f64,
    bid_tick: i32,
    ask_tick: i32,
) -> Option<f64> {
    if base_flow == 0.0 || quote_flow == 0.0 {
        return None;
    }
    let sqrt_price = derive_sqrt_price_in_range(base_flow, quote_flow, bid_tick, ask_tick);
    Some(sqrt_price * sqrt_price)
}

pub fn derive_liquidity_from_conc_flow(
    base_flow: f64,
    quote_flow: f64,
    bid_tick: i32,
    ask_tick: i32,
) -> f64 {
    let base_flow = base_flow.abs();
    let quote_flow = quote_flow.abs();
    let pb = tick_to_sqrt_price(bid_tick);
    let pa = tick_to_sqrt_price(ask_tick);

    if quote_flow == 0.0 {
        base_flow / (pa - pb)
    } else if base_flow == 0.0 {
        quote_flow / (1.0 / pb - 1.0 / pa)
    } else {
        let price = derive_sqrt_price_in_range(base_flow, quote_flow, bid_tick, ask_tick);
        base_flow / (price - pb)
    }
}

/// Unsigned liquidity magnitude of a change, derived from its flows rather
/// than the declared `liq` field.
pub fn determine_liquidity_magn(change: &LiqChange) -> f64 {
    if !is_flow_numerically_stable(change.base_flow, change.quote_flow) {
        return 0.0;
    }
    match change.position_type {
        PositionType::Ambient => {
            derive_liquidity_from_ambient_flow(change.base_flow, change.quote_flow)
        }
        PositionType::Concentrated | PositionType::Knockout => derive_liquidity_from_conc_flow(
            change.base_flow,
            change.quote_flow,
            change.bid_tick,
            change.ask_tick,
        ),
    }
}

/// Capital efficiency of a range relative to ambient liquidity.
pub fn est_liq_amplification(bid_tick: i32, ask_tick: i32) -> f64 {
    let width = (ask_tick - bid_tick).max(1) as f64;
    let price_range = tick_to_price((width / 2.0) as i32);
    let sqrt_range = price_range.sqrt();
    1.0 / (1.0 - 1.0 / sqrt_range)
}
