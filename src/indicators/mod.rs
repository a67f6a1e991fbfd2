//! Trailing indicator calculations

/// EMA period used for the deviation indicator across the app
pub const EMA_PERIOD: usize = 50;

/// Compute a trailing exponential moving average over chronologically
/// ordered prices (oldest first).
///
/// Returns 0.0 when fewer than `period` prices are available. Insufficient
/// data is a defined neutral state, not an error; callers treat 0.0 as
/// "indicator not ready yet".
pub fn ema(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period {
        return 0.0;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;

    prices[period..]
        .iter()
        .fold(seed, |ema, price| price * multiplier + ema * (1.0 - multiplier))
}

/// Percentage deviation of the current price from its EMA:
/// `((current - ema) / ema) * 100`.
///
/// Returns 0.0 when the EMA itself is 0.0, which doubles as the
/// insufficient-data sentinel from [`ema`] and guards the division.
pub fn ema_percent_diff(current_price: f64, ema: f64) -> f64 {
    if ema == 0.0 {
        return 0.0;
    }
    (current_price - ema) / ema * 100.0
}
