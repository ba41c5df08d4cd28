use num_traits::{Float, FromPrimitive};

pub fn _isclose<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

pub fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    _isclose(x, y, T::from_f64(1e-5).unwrap(), T::from_f64(1e-8).unwrap())
}

/// `num` evenly spaced values covering `[start, end]` inclusive.
pub fn linspace<T: Float + FromPrimitive>(start: T, end: T, num: usize) -> Vec<T> {
    if num == 0 {
        return Vec::new();
    }
    if num == 1 {
        return vec![start];
    }
    let step = (end - start) / T::from_usize(num - 1).unwrap();
    (0..num)
        .map(|i| start + T::from_usize(i).unwrap() * step)
        .collect()
}

/// `num` log-spaced values covering `[start, end]` inclusive, spaced evenly
/// in the logarithm of the given `base`.
pub fn logspace<T: Float + FromPrimitive>(start: T, end: T, num: usize, base: T) -> Vec<T> {
    linspace(start.log(base), end.log(base), num)
        .into_iter()
        .map(|x| base.powf(x))
        .collect()
}

/// The `q`-th percentile of `values` on the 0-100 scale, using linear
/// interpolation between adjacent ranked samples.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Find the index of the value in `vec` nearest to `target_val`
pub fn nearest<T: Float>(vec: &[T], target_val: T) -> usize {
    let mut best = 0;
    let mut best_distance = T::infinity();
    for (i, val) in vec.iter().enumerate() {
        let dist = (*val - target_val).abs();
        if dist < best_distance {
            best_distance = dist;
            best = i;
        }
    }
    best
}
