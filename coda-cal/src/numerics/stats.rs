//! Small descriptive statistics helpers

/// Running arithmetic mean
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of the added values (None when empty)
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median (average of the two middle values for even counts)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Coefficient of variation of the RMS deviation between two series
///
/// `sqrt(mean((a - b)^2)) / mean(a)`; 0 for empty or mismatched input.
pub fn cvrmsd(observed: &[f64], predicted: &[f64]) -> f64 {
    if observed.is_empty() || observed.len() != predicted.len() {
        return 0.0;
    }
    let n = observed.len() as f64;
    let sum_sq: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p) * (o - p))
        .sum();
    let mean_observed = observed.iter().sum::<f64>() / n;
    if mean_observed == 0.0 {
        return 0.0;
    }
    (sum_sq / n).sqrt() / mean_observed
}

/// Ordinary least squares slope of `y` against sample index
pub fn index_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    if sxx == 0.0 {
        None
    } else {
        Some(sxy / sxx)
    }
}

/// Least squares solution of `A c = y` for a small dense system
///
/// `rows` holds one row of `A` per observation. Solves the normal equations
/// by Gaussian elimination with partial pivoting; None when singular.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let m = rows.first()?.len();
    if m == 0 || rows.len() != y.len() || rows.len() < m {
        return None;
    }

    // Normal equations: (A^T A) c = A^T y
    let mut ata = vec![vec![0.0; m + 1]; m];
    for (row, yi) in rows.iter().zip(y) {
        for i in 0..m {
            for j in 0..m {
                ata[i][j] += row[i] * row[j];
            }
            ata[i][m] += row[i] * yi;
        }
    }

    for col in 0..m {
        let pivot = (col..m).max_by(|&a, &b| ata[a][col].abs().total_cmp(&ata[b][col].abs()))?;
        if ata[pivot][col].abs() < 1e-12 {
            return None;
        }
        ata.swap(col, pivot);
        for row in (col + 1)..m {
            let factor = ata[row][col] / ata[col][col];
            for k in col..=m {
                ata[row][k] -= factor * ata[col][k];
            }
        }
    }

    let mut solution = vec![0.0; m];
    for i in (0..m).rev() {
        let mut acc = ata[i][m];
        for j in (i + 1)..m {
            acc -= ata[i][j] * solution[j];
        }
        solution[i] = acc / ata[i][i];
    }
    Some(solution)
}
