//! Small statistics helpers shared by the analyzer, classifier and segmenter.

/// Incremental mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance; zero for fewer than two values.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Root-mean-square deviation from the mean.
#[must_use]
pub fn rms_about_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Pearson correlation of `a[i]` against `b[i + lag]` over the overlap.
///
/// Returns 0.0 when either side has no variance.
#[must_use]
pub fn lagged_correlation(a: &[f64], b: &[f64], lag: isize) -> f64 {
    let n = a.len().min(b.len());
    let shift = lag.unsigned_abs();
    if shift >= n {
        return 0.0;
    }
    let len = n - shift;
    let (xs, ys) = if lag >= 0 {
        (&a[..len], &b[shift..shift + len])
    } else {
        (&a[shift..shift + len], &b[..len])
    };

    let mx = mean(xs);
    let my = mean(ys);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let denom = (sxx * syy).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        sxy / denom
    }
}

/// Largest absolute correlation over lags in `-max_lag..=max_lag`.
#[must_use]
pub fn max_abs_lagged_correlation(a: &[f64], b: &[f64], max_lag: usize) -> f64 {
    let max_lag = max_lag as isize;
    (-max_lag..=max_lag)
        .map(|lag| lagged_correlation(a, b, lag).abs())
        .fold(0.0, f64::max)
        .min(1.0)
}
