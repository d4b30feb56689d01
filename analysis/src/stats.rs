/// Mean and sample standard deviation of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: std_dev(values),
        }
    }
}

/// NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator), 0 for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = mean(values);
    let squares = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>();

    (squares / (values.len() - 1) as f64).sqrt()
}

/// Quantile with linear interpolation between the closest ranks
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64))
}
