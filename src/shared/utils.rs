use crate::shared::errors::RtaError;
use anyhow::Result;
use itertools::Itertools;

/// `n + 1` edges evenly spaced in log space between `min` and `max`
/// (`n` bins).
///```
/// use restime::shared::utils::log_bins;
/// let edges = log_bins(1., 100., 2).unwrap();
/// assert_eq!(edges.len(), 3);
/// assert!((edges[1] - 10.).abs() < 1e-10);
/// assert!((edges[2] - 100.).abs() < 1e-10);
///```
pub fn log_bins(min: f64, max: f64, n: usize) -> Result<Vec<f64>> {
    if !(min > 0.) || !(max >= min) || !max.is_finite() || n == 0 {
        return Err(RtaError::Numerical(format!(
            "cannot build {} log-spaced bins between {} and {}",
            n, min, max
        ))
        .into());
    }
    let (lmin, lmax) = (min.ln(), max.ln());
    let mut edges: Vec<f64> = (0..=n)
        .map(|i| (lmin + (lmax - lmin) * i as f64 / n as f64).exp())
        .collect();
    // pin the extremities, exp(ln(x)) is not always x
    edges[0] = min;
    edges[n] = max;
    Ok(edges)
}

/// Count the values falling in each bin. Bins are half-open except the last
/// one, which also contains its right edge. Values outside are ignored.
///```
/// use restime::shared::utils::histogram;
/// let counts = histogram(&[0.5, 1., 1.5, 2., 3.], &[1., 2., 3.]);
/// assert_eq!(counts, vec![2, 2]);
///```
pub fn histogram(data: &[f64], edges: &[f64]) -> Vec<usize> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let nbins = edges.len() - 1;
    let mut counts = vec![0; nbins];
    let (low, high) = (edges[0], edges[nbins]);
    for &x in data {
        if !(x >= low && x <= high) {
            continue;
        }
        // first edge strictly larger than x
        let idx = edges.partition_point(|&e| e <= x);
        counts[idx.saturating_sub(1).min(nbins - 1)] += 1;
    }
    counts
}

/// Center of the most populated log-spaced bin spanning `[min, max]` of
/// `data`. The first maximal bin wins.
pub fn density_mode(data: &[f64], nbins: usize) -> Result<f64> {
    let (min, max) = min_max(data)?;
    if min == max {
        return Ok(min);
    }
    let edges = log_bins(min, max, nbins)?;
    let counts = histogram(data, &edges);
    let imax = argmax_first(&counts).unwrap_or(0);
    Ok(0.5 * (edges[imax] + edges[imax + 1]))
}

/// Percentile interval containing `percentage` percent of the samples,
/// symmetric around the median.
///```
/// use restime::shared::utils::confidence_interval;
/// let data: Vec<f64> = (1..=1000).map(|x| x as f64).collect();
/// let (lower, upper) = confidence_interval(&data, 95.).unwrap();
/// assert_eq!(lower, 25.);
/// assert_eq!(upper, 975.);
///```
pub fn confidence_interval(data: &[f64], percentage: f64) -> Result<(f64, f64)> {
    if data.is_empty() {
        return Err(RtaError::Numerical(
            "cannot compute an interval on an empty sample".to_string(),
        )
        .into());
    }
    let sorted: Vec<f64> = data.iter().copied().sorted_by(|a, b| a.total_cmp(b)).collect();
    let n = sorted.len() as f64;
    let lower_p = (100. - percentage) / 200.;
    let upper_p = (percentage + (100. - percentage) / 2.) / 100.;

    // empirical cdf of the i-th sorted value is (i + 1) / n
    let lower = (0..sorted.len())
        .rev()
        .find(|&i| (i + 1) as f64 / n <= lower_p + 1e-12)
        .map_or(sorted[0], |i| sorted[i]);
    let upper = (0..sorted.len())
        .find(|&i| (i + 1) as f64 / n >= upper_p - 1e-12)
        .map_or(sorted[sorted.len() - 1], |i| sorted[i]);
    Ok((lower, upper))
}

/// Most frequent value. Ties are broken toward the smallest value.
///```
/// use restime::shared::utils::smallest_mode;
/// assert_eq!(smallest_mode(&[3, 2, 3, 2, 4]), Some(2));
/// assert_eq!(smallest_mode(&[]), None);
///```
pub fn smallest_mode(values: &[usize]) -> Option<usize> {
    values
        .iter()
        .copied()
        .counts()
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(vb.cmp(va)))
        .map(|(v, _)| v)
}

/// Index of the first maximum
pub fn argmax_first<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if !(v > b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

pub fn min_max(data: &[f64]) -> Result<(f64, f64)> {
    if data.is_empty() {
        return Err(RtaError::Numerical("empty sample".to_string()).into());
    }
    Ok(data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        }))
}

/// Round to two decimals, non-finite values become 0
pub fn round2(x: f64) -> f64 {
    if x.is_finite() {
        (x * 100.).round() / 100.
    } else {
        0.
    }
}
