//! Sample statistics shared by the Monte Carlo and backtest engines.
//! Empty input yields 0.0 rather than NaN; callers report counts alongside.

#[inline]
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n-1). 0.0 for fewer than two values.
pub fn std_dev(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}

/// Linear-interpolated percentile of an ascending slice, q in [0, 100].
/// Matches numpy's default: rank = q/100 * (n-1).
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[inline]
pub fn median(sorted: &[f64]) -> f64 {
    percentile(sorted, 50.0)
}

/// Copy and sort ascending (total order, NaN last).
pub fn sorted(xs: &[f64]) -> Vec<f64> {
    let mut out = xs.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// A ratio whose denominator is a loss magnitude. When nothing was lost the
/// value is reported as `NoDownside` instead of infinity.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Ratio {
    Finite(f64),
    NoDownside,
}

impl Ratio {
    pub fn of(upside: f64, downside: f64) -> Self {
        let denom = downside.abs();
        if denom < 1e-12 {
            Self::NoDownside
        } else {
            Self::Finite(upside / denom)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(*v),
            Self::NoDownside => None,
        }
    }
}

/// Win/loss split of a set of profits. Exactly zero counts as neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Outcomes {
    pub wins: usize,
    pub losses: usize,
    pub flat: usize,
}

impl Outcomes {
    pub fn count(profits: &[f64]) -> Self {
        profits.iter().fold(Self::default(), |mut o, &p| {
            if p > 0.0 {
                o.wins += 1;
            } else if p < 0.0 {
                o.losses += 1;
            } else {
                o.flat += 1;
            }
            o
        })
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.wins + self.losses + self.flat
    }

    pub fn win_fraction(&self) -> f64 {
        fraction(self.wins, self.total())
    }

    pub fn loss_fraction(&self) -> f64 {
        fraction(self.losses, self.total())
    }
}

#[inline]
pub fn fraction(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
