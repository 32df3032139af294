//! 可分离高斯平滑.

use super::for_each_lane;
use ndarray::{Array3, ArrayView3, Axis};

/// 归一化的一维高斯核. 半径为 `(truncate * sigma + 0.5)` 取整.
pub fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    let radius = (truncate * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

/// 对 3D 体数据做高斯平滑. 依次沿三个轴做一维相关, 边界按最近值延拓.
///
/// `sigma <= 0` 时原样返回.
pub fn gaussian_filter(input: ArrayView3<'_, f64>, sigma: f64, truncate: f64) -> Array3<f64> {
    let mut data = input.to_owned();
    if sigma.is_nan() || sigma <= 0.0 {
        return data;
    }
    let weights = gaussian_kernel(sigma, truncate);
    for axis in 0..3 {
        correlate_nearest(&mut data, Axis(axis), &weights);
    }
    data
}

/// 把掩膜转换为 0/1 浮点体数据后做高斯平滑.
pub fn smooth_mask(mask: ArrayView3<'_, u8>, sigma: f64, truncate: f64) -> Array3<f64> {
    let data = mask.mapv(|v| if v != 0 { 1.0 } else { 0.0 });
    gaussian_filter(data.view(), sigma, truncate)
}

/// 沿 `axis` 对每条线做一维相关. 越界索引取最近的边界值.
fn correlate_nearest(data: &mut Array3<f64>, axis: Axis, weights: &[f64]) {
    let radius = weights.len() / 2;
    for_each_lane(data, axis, |mut lane| {
        let line = lane.to_vec();
        let Some(last) = line.len().checked_sub(1) else {
            return;
        };
        for (i, v) in lane.iter_mut().enumerate() {
            *v = weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * line[(i + k).saturating_sub(radius).min(last)])
                .sum();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_kernel() {
        let k = gaussian_kernel(1.0, 4.0);
        assert_eq!(k.len(), 9);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((k[0] - k[8]).abs() < 1e-15);
        assert!(k[4] > k[3] && k[3] > k[2]);
    }

    #[test]
    fn test_constant_volume_is_preserved() {
        let data = Array3::from_elem((5, 6, 7), 3.5);
        let out = gaussian_filter(data.view(), 1.0, 4.0);
        assert!(out.iter().all(|v| (v - 3.5).abs() < 1e-12));
    }

    #[test]
    fn test_mass_and_symmetry() {
        let mut mask = Array3::<u8>::zeros((11, 11, 11));
        mask[(5, 5, 5)] = 1;
        let out = smooth_mask(mask.view(), 1.0, 4.0);
        // 远离边界时总和守恒.
        assert!((out.sum() - 1.0).abs() < 1e-12);
        assert!((out[(4, 5, 5)] - out[(6, 5, 5)]).abs() < 1e-15);
        assert!((out[(5, 4, 5)] - out[(5, 5, 6)]).abs() < 1e-15);
        assert!(out[(5, 5, 5)] < 1.0);
    }

    #[test]
    fn test_zero_sigma() {
        let data = Array3::from_shape_fn((3, 3, 3), |(z, y, x)| (z * 9 + y * 3 + x) as f64);
        assert_eq!(gaussian_filter(data.view(), 0.0, 4.0), data);
    }
}
