//! Incremental indicator cores.
//!
//! All cores follow the same contract: feed candles oldest-first, read the
//! current value after each `update`. Values during the warmup period are
//! best-effort; the frame blanks them before anything downstream looks.
//! Non-finite inputs are ignored so a single bad tick cannot poison the
//! smoothing accumulators.

use std::collections::VecDeque;

/// Fixed-capacity rolling window with O(1) mean and O(n) extremes.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: VecDeque<f64>,
    cap: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.buf.len() == self.cap {
            if let Some(old) = self.buf.pop_front() {
                self.sum -= old;
            }
        }
        self.buf.push_back(value);
        self.sum += value;
    }

    pub fn full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn mean(&self) -> f64 {
        if self.buf.is_empty() {
            return f64::NAN;
        }
        self.sum / self.buf.len() as f64
    }

    /// Population standard deviation over the current window
    pub fn std_dev(&self) -> f64 {
        if self.buf.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        let var = self.buf.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
            / self.buf.len() as f64;
        var.sqrt()
    }

    pub fn min(&self) -> f64 {
        self.buf.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.buf.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Exponential moving average, seeded with the first observation
/// (pandas `ewm(span=window, adjust=False)` semantics).
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(window: usize) -> Self {
        Self {
            alpha: 2.0 / (window as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, price: f64) -> f64 {
        if !price.is_finite() {
            return self.value.unwrap_or(f64::NAN);
        }
        let next = match self.value {
            None => price,
            Some(prev) => self.alpha * price + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> f64 {
        self.value.unwrap_or(f64::NAN)
    }
}

/// MACD(12,26,9): fast EMA − slow EMA, signal EMA of the difference.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

#[derive(Debug, Clone, Copy)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }

    pub fn update(&mut self, close: f64) -> MacdOutput {
        let macd = self.fast.update(close) - self.slow.update(close);
        let signal = self.signal.update(macd);
        MacdOutput {
            macd,
            signal,
            histogram: macd - signal,
        }
    }
}

/// RSI with Wilder smoothing of average gain/loss. Neutral 50 until warm.
#[derive(Debug, Clone)]
pub struct Rsi {
    window: usize,
    prev_close: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
    seen: usize,
}

impl Rsi {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            prev_close: None,
            avg_gain: 0.0,
            avg_loss: 0.0,
            seen: 0,
        }
    }

    pub fn update(&mut self, close: f64) -> f64 {
        if !close.is_finite() {
            return self.value();
        }
        let Some(prev) = self.prev_close.replace(close) else {
            return 50.0;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let w = self.window as f64;

        if self.seen < self.window {
            // Simple averages until the first full window, then Wilder
            self.avg_gain += gain / w;
            self.avg_loss += loss / w;
            self.seen += 1;
            if self.seen < self.window {
                return 50.0;
            }
        } else {
            self.avg_gain = (self.avg_gain * (w - 1.0) + gain) / w;
            self.avg_loss = (self.avg_loss * (w - 1.0) + loss) / w;
        }
        self.value()
    }

    pub fn value(&self) -> f64 {
        if self.seen < self.window {
            return 50.0;
        }
        if self.avg_loss == 0.0 {
            return 100.0;
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Average True Range with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct Atr {
    window: usize,
    prev_close: Option<f64>,
    value: f64,
    seen: usize,
}

impl Atr {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            prev_close: None,
            value: 0.0,
            seen: 0,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> f64 {
        if !high.is_finite() || !low.is_finite() || !close.is_finite() {
            return self.value;
        }
        let tr = match self.prev_close {
            Some(prev) => (high - low).max((high - prev).abs()).max((low - prev).abs()),
            None => high - low,
        };
        self.prev_close = Some(close);

        let w = self.window as f64;
        if self.seen < self.window {
            self.seen += 1;
            // Running mean of the first `window` true ranges
            self.value += (tr - self.value) / self.seen as f64;
        } else {
            self.value = (self.value * (w - 1.0) + tr) / w;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Average Directional Index with Wilder smoothing.
///
/// +DM/−DM and TR are Wilder-accumulated; DX values are averaged into the
/// initial ADX, after which ADX itself is Wilder-smoothed.
#[derive(Debug, Clone)]
pub struct Adx {
    window: usize,
    prev: Option<(f64, f64, f64)>, // (high, low, close)
    sm_plus_dm: f64,
    sm_minus_dm: f64,
    sm_tr: f64,
    dm_seen: usize,
    dx_sum: f64,
    dx_seen: usize,
    adx: f64,
}

impl Adx {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            prev: None,
            sm_plus_dm: 0.0,
            sm_minus_dm: 0.0,
            sm_tr: 0.0,
            dm_seen: 0,
            dx_sum: 0.0,
            dx_seen: 0,
            adx: 0.0,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> f64 {
        if !high.is_finite() || !low.is_finite() || !close.is_finite() {
            return self.adx;
        }
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return 0.0;
        };

        let up = high - prev_high;
        let down = prev_low - low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        let w = self.window as f64;
        if self.dm_seen < self.window {
            self.sm_plus_dm += plus_dm;
            self.sm_minus_dm += minus_dm;
            self.sm_tr += tr;
            self.dm_seen += 1;
            if self.dm_seen < self.window {
                return 0.0;
            }
        } else {
            self.sm_plus_dm += plus_dm - self.sm_plus_dm / w;
            self.sm_minus_dm += minus_dm - self.sm_minus_dm / w;
            self.sm_tr += tr - self.sm_tr / w;
        }

        let dx = self.dx();
        if self.dx_seen < self.window {
            self.dx_sum += dx;
            self.dx_seen += 1;
            self.adx = self.dx_sum / self.dx_seen as f64;
        } else {
            self.adx = (self.adx * (w - 1.0) + dx) / w;
        }
        self.adx
    }

    fn dx(&self) -> f64 {
        if self.sm_tr <= 0.0 {
            return 0.0;
        }
        let di_pos = self.sm_plus_dm / self.sm_tr * 100.0;
        let di_neg = self.sm_minus_dm / self.sm_tr * 100.0;
        let di_sum = di_pos + di_neg;
        if di_sum <= 0.0 {
            return 0.0;
        }
        (di_pos - di_neg).abs() / di_sum * 100.0
    }

    pub fn value(&self) -> f64 {
        self.adx
    }
}
