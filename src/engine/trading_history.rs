//! Cumulative per-pool trading statistics and their time series.

use super::candle::{Candle, CandleBuilder};
use super::liquidity_math::{
    derive_price_from_ambient_flow, derive_price_from_conc_flow, derive_price_from_swap_flow,
    is_flow_dual_stable,
};
use crate::tables::{AggEvent, FeeChange};
use serde::Serialize;

/// Raw fee rates are expressed in millionths.
const FEE_RATE_MULTIPLIER: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumPoolStats {
    pub latest_time: i64,
    pub base_tvl: f64,
    pub quote_tvl: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub base_fees: f64,
    pub quote_fees: f64,
    pub last_price_swap: f64,
    pub last_price_liq: f64,
    pub last_price_indic: f64,
    pub fee_rate: f64,
}

impl AccumPoolStats {
    pub fn accumulate(&mut self, event: &AggEvent) {
        self.latest_time = self.latest_time.max(event.time);

        if event.is_fee_change {
            self.fee_rate = event.fee_rate as f64 / FEE_RATE_MULTIPLIER;
        } else if event.is_swap {
            self.accum_swap(event);
        } else if event.is_liq {
            self.accum_liq(event);
        }
    }

    fn accum_swap(&mut self, event: &AggEvent) {
        self.accumulate_flows(event.base_flow, event.quote_flow);
        self.base_volume += event.base_flow.abs();
        self.quote_volume += event.quote_flow.abs();

        if event.in_base_qty {
            self.quote_fees += event.quote_flow.abs() * self.fee_rate;
        } else {
            self.base_fees += event.base_flow.abs() * self.fee_rate;
        }

        if is_flow_dual_stable(event.base_flow, event.quote_flow) {
            let price = derive_price_from_swap_flow(event.base_flow, event.quote_flow);
            self.last_price_swap = price;
            self.last_price_indic = price;
        }
    }

    fn accum_liq(&mut self, event: &AggEvent) {
        self.accumulate_flows(event.base_flow, event.quote_flow);

        if !is_flow_dual_stable(event.base_flow, event.quote_flow) || !event.flows_at_market {
            return;
        }
        if event.is_tick_skewed {
            if let Some(price) = derive_price_from_conc_flow(
                event.base_flow,
                event.quote_flow,
                event.bid_tick,
                event.ask_tick,
            ) {
                self.last_price_liq = price;
                self.last_price_indic = price;
            }
        } else {
            self.last_price_liq = derive_price_from_ambient_flow(event.base_flow, event.quote_flow);
            self.last_price_indic = self.last_price_liq;
        }
    }

    /// TVL follows signed flows, so it falls on withdrawals.
    fn accumulate_flows(&mut self, base_flow: f64, quote_flow: f64) {
        self.base_tvl += base_flow;
        self.quote_tvl += quote_flow;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTradingHistory {
    pub stats_counter: AccumPoolStats,
    time_snaps: Vec<AccumPoolStats>,
}

impl PoolTradingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_event(&mut self, event: &AggEvent) {
        self.snapshot_if_newer(event.time);
        self.stats_counter.accumulate(event);
    }

    pub fn next_fee_change(&mut self, change: &FeeChange) {
        self.snapshot_if_newer(change.time);
        let stats = &mut self.stats_counter;
        stats.latest_time = stats.latest_time.max(change.time);
        stats.fee_rate = change.fee_rate as f64 / FEE_RATE_MULTIPLIER;
    }

    /// Snapshot times only ever increase, so the series stays sorted.
    fn snapshot_if_newer(&mut self, time: i64) {
        let latest = self.stats_counter.latest_time;
        if time > latest && latest > 0 {
            self.time_snaps.push(self.stats_counter);
        }
    }

    pub fn time_snaps(&self) -> &[AccumPoolStats] {
        &self.time_snaps
    }

    /// Snapshots followed by the live counter.
    pub fn time_series(&self) -> Vec<AccumPoolStats> {
        let mut series = self.time_snaps.clone();
        series.push(self.stats_counter);
        series
    }

    /// Stats as of just before `time`.
    pub fn stats_before(&self, time: i64) -> AccumPoolStats {
        self.time_snaps
            .iter()
            .chain(std::iter::once(&self.stats_counter))
            .take_while(|s| s.latest_time < time)
            .last()
            .copied()
            .unwrap_or_default()
    }

    /// Candles of `period` seconds covering `[start, end)`. Empty for a
    /// non-positive period.
    pub fn candles(&self, period: i64, start: i64, end: i64) -> Vec<Candle> {
        if period <= 0 {
            return Vec::new();
        }
        let mut builder = CandleBuilder::new(start, period, self.stats_before(start));
        for snap in self
            .time_snaps
            .iter()
            .chain(std::iter::once(&self.stats_counter))
            .filter(|s| s.latest_time >= start && s.latest_time < end)
        {
            builder.increment(snap);
        }
        builder.close(end)
    }
}
