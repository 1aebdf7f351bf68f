//! Fixed-period OHLC candles built from pool stats snapshots.

use super::trading_history::AccumPoolStats;
use serde::Serialize;

/// Pools under this TVL on both sides have no meaningful price, so their
/// candles are withheld until either side has crossed the threshold once.
pub const MIN_CANDLE_TVL: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub price_open: f64,
    pub price_close: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub volume_base: f64,
    pub volume_quote: f64,
    pub tvl_base: f64,
    pub tvl_quote: f64,
    pub fee_rate_open: f64,
    pub fee_rate_close: f64,
    pub period: i64,
    pub time: i64,
}

pub struct CandleBuilder {
    series: Vec<Candle>,
    running: Candle,
    last_accum: AccumPoolStats,
    open_cum_base_vol: f64,
    open_cum_quote_vol: f64,
    period: i64,
    at_valid_hist: bool,
}

impl CandleBuilder {
    /// Panics if `period` is not positive.
    pub fn new(start_time: i64, period: i64, open: AccumPoolStats) -> Self {
        assert!(period > 0, "candle period must be positive, got {}", period);
        let mut builder = Self {
            series: Vec::new(),
            running: Candle::default(),
            last_accum: open,
            open_cum_base_vol: 0.0,
            open_cum_quote_vol: 0.0,
            period,
            at_valid_hist: false,
        };
        builder.open_candle(start_time);
        builder
    }

    pub fn increment(&mut self, accum: &AccumPoolStats) {
        while accum.latest_time >= self.running.time + self.period {
            self.close_candle();
        }

        let price = accum.last_price_swap;
        self.running.min_price = self.running.min_price.min(price);
        self.running.max_price = self.running.max_price.max(price);
        self.running.price_close = price;
        self.running.volume_base = accum.base_volume - self.open_cum_base_vol;
        self.running.volume_quote = accum.quote_volume - self.open_cum_quote_vol;
        self.running.tvl_base = accum.base_tvl;
        self.running.tvl_quote = accum.quote_tvl;
        self.running.fee_rate_close = accum.fee_rate;
        self.last_accum = *accum;
    }

    /// Close out every candle that ends at or before `end_time` and return
    /// the finished series.
    pub fn close(mut self, end_time: i64) -> Vec<Candle> {
        while self.running.time + self.period <= end_time {
            self.close_candle();
        }
        self.series
    }

    fn close_candle(&mut self) {
        if self.running.tvl_base >= MIN_CANDLE_TVL || self.running.tvl_quote >= MIN_CANDLE_TVL {
            self.at_valid_hist = true;
        }
        if self.at_valid_hist {
            self.series.push(self.running);
        }
        let next = self.running.time + self.period;
        self.open_candle(next);
    }

    fn open_candle(&mut self, time: i64) {
        let accum = &self.last_accum;
        let price = accum.last_price_swap;
        self.running = Candle {
            price_open: price,
            price_close: price,
            min_price: price,
            max_price: price,
            volume_base: 0.0,
            volume_quote: 0.0,
            tvl_base: accum.base_tvl,
            tvl_quote: accum.quote_tvl,
            fee_rate_open: accum.fee_rate,
            fee_rate_close: accum.fee_rate,
            period: self.period,
            time,
        };
        self.open_cum_base_vol = accum.base_volume;
        self.open_cum_quote_vol = accum.quote_volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(time: i64, price: f64, base_volume: f64, quote_volume: f64, base_tvl: f64) -> AccumPoolStats {
        AccumPoolStats {
            latest_time: time,
            base_tvl,
            base_volume,
            quote_volume,
            last_price_swap: price,
            ..Default::default()
        }
    }

    #[test]
    fn test_candles_roll_forward_and_close_at_end() {
        let mut builder = CandleBuilder::new(1000, 60, stats(990, 100.0, 0.0, 0.0, 200_000.0));
        builder.increment(&stats(1075, 105.0, 10.0, 1.0, 200_000.0));
        let candles = builder.close(1180);

        let times: Vec<i64> = candles.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1000, 1060, 1120]);

        assert_eq!(candles[0].price_open, 100.0);
        assert_eq!(candles[0].price_close, 100.0);
        assert_eq!(candles[0].volume_base, 0.0);

        let mid = candles[1];
        assert_eq!(mid.price_open, 100.0);
        assert_eq!(mid.price_close, 105.0);
        assert_eq!(mid.min_price, 100.0);
        assert_eq!(mid.max_price, 105.0);
        assert_eq!(mid.volume_base, 10.0);
        assert_eq!(mid.volume_quote, 1.0);

        assert_eq!(candles[2].price_open, 105.0);
        assert_eq!(candles[2].volume_base, 0.0);
        assert!(candles.iter().all(|c| c.period == 60));
    }

    #[test]
    fn test_low_tvl_pool_emits_nothing() {
        let mut builder = CandleBuilder::new(1000, 60, stats(990, 100.0, 0.0, 0.0, 5_000.0));
        builder.increment(&stats(1075, 105.0, 10.0, 1.0, 5_000.0));
        assert!(builder.close(1180).is_empty());
    }

    #[test]
    fn test_history_stays_valid_after_tvl_drops() {
        let mut builder = CandleBuilder::new(0, 10, stats(0, 1.0, 0.0, 0.0, 150_000.0));
        builder.increment(&stats(12, 1.0, 0.0, 0.0, 10.0));
        let candles = builder.close(30);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[2].tvl_base, 10.0);
    }

    #[test]
    fn test_quote_side_tvl_is_enough() {
        let mut open = stats(990, 100.0, 0.0, 0.0, 0.0);
        open.quote_tvl = 200_000.0;
        let mut next = stats(1075, 105.0, 10.0, 1.0, 0.0);
        next.quote_tvl = 200_000.0;

        let mut builder = CandleBuilder::new(1000, 60, open);
        builder.increment(&next);
        let candles = builder.close(1180);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[1].tvl_quote, 200_000.0);
    }

    #[test]
    fn test_prices_follow_swaps_not_liquidity_events() {
        let mut open = stats(990, 100.0, 0.0, 0.0, 200_000.0);
        open.last_price_indic = 100.0;
        let mut next = stats(1075, 105.0, 10.0, 1.0, 200_000.0);
        // A later liquidity event moved the indicative price elsewhere.
        next.last_price_indic = 90.0;

        let mut builder = CandleBuilder::new(1000, 60, open);
        builder.increment(&next);
        let candles = builder.close(1180);

        assert_eq!(candles[1].price_close, 105.0);
        assert_eq!(candles[1].max_price, 105.0);
        assert_eq!(candles[1].min_price, 100.0);
        assert_eq!(candles[2].price_open, 105.0);
    }

    #[test]
    #[should_panic(expected = "candle period must be positive")]
    fn test_zero_period_is_rejected() {
        CandleBuilder::new(1000, 0, AccumPoolStats::default());
    }
}
