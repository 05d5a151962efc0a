//! Technical indicators for feature engineering
//!
//! Every function returns a vector aligned with its input; positions without
//! enough history hold `NaN`.

/// Simple Moving Average
pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return vec![f64::NAN; prices.len()];
    }

    let mut result = vec![f64::NAN; period - 1];

    for i in (period - 1)..prices.len() {
        let sum: f64 = prices[(i + 1 - period)..=i].iter().sum();
        result.push(sum / period as f64);
    }

    result
}

/// Exponential Moving Average with span `span`
///
/// Smoothing factor is `2 / (span + 1)`, seeded with the first value and
/// without bias adjustment, so the output is defined from index 0.
pub fn ema(prices: &[f64], span: usize) -> Vec<f64> {
    let Some(&first) = prices.first() else {
        return vec![];
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut result = Vec::with_capacity(prices.len());
    result.push(first);

    for price in &prices[1..] {
        let prev = result[result.len() - 1];
        result.push(alpha * price + (1.0 - alpha) * prev);
    }

    result
}

/// Relative Strength Index using simple rolling means of gains and losses
///
/// Defined from index `period` onwards. A window without any loss saturates
/// to 100.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return result;
    }

    let mut gains = vec![f64::NAN; prices.len()];
    let mut losses = vec![f64::NAN; prices.len()];

    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change.is_nan() {
            continue;
        }
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }

    for i in period..prices.len() {
        let window = (i + 1 - period)..=i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;

        if avg_gain.is_nan() || avg_loss.is_nan() {
            continue;
        }

        result[i] = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        };
    }

    result
}

/// MACD line: fast EMA minus slow EMA
pub fn macd(prices: &[f64], fast_span: usize, slow_span: usize) -> Vec<f64> {
    let fast_ema = ema(prices, fast_span);
    let slow_ema = ema(prices, slow_span);

    fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect()
}
