//! 仿射重采样.
//!
//! 对输出体素 `o`, 取输入在 `M · o + offset` 处的插值. 坐标落在
//! `[0, n - 1]` 之外的体素填 0.

use super::{fill_indexed, for_each_lane, AffineTransform};
use crate::{Idx3d, Point3};
use ndarray::{Array3, ArrayView3, Axis};
use num::traits::AsPrimitive;
use num::Zero;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 判断坐标是否越界时的容差.
const BOUNDARY_TOL: f64 = 1e-6;

/// B 样条预滤波的精度.
const PREFILTER_TOL: f64 = 1e-10;

/// 插值方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Interpolation {
    /// 0 阶, 最近邻. 输出值都来自输入, 适用于标签.
    Nearest,

    /// 1 阶, 三线性.
    Linear,

    /// 3 阶, 三次 B 样条.
    #[default]
    Cubic,
}

impl Interpolation {
    /// 由样条阶数构造. 只支持 0, 1, 3.
    pub fn from_order(order: u8) -> Option<Self> {
        match order {
            0 => Some(Interpolation::Nearest),
            1 => Some(Interpolation::Linear),
            3 => Some(Interpolation::Cubic),
            _ => None,
        }
    }

    /// 样条阶数.
    pub fn order(self) -> u8 {
        match self {
            Interpolation::Nearest => 0,
            Interpolation::Linear => 1,
            Interpolation::Cubic => 3,
        }
    }
}

/// 用采样变换 `sampling` (输出坐标 -> 输入坐标) 重采样 `input`, 输出形状为 `shape`.
pub fn resample<A>(
    input: ArrayView3<'_, A>,
    sampling: &AffineTransform,
    interpolation: Interpolation,
    shape: Idx3d,
) -> Array3<A>
where
    A: Copy + Zero + AsPrimitive<f64> + Send + Sync,
    f64: AsPrimitive<A>,
{
    let mut out = Array3::zeros(shape);
    if input.is_empty() {
        return out;
    }
    let dim = input.dim();
    match interpolation {
        Interpolation::Nearest => fill_indexed(&mut out, |o| {
            locate(sampling, o, dim)
                .map(|c| input[nearest_index(&c, dim)])
                .unwrap_or_else(A::zero)
        }),
        Interpolation::Linear => {
            let data: Array3<f64> = input.mapv(|v| v.as_());
            fill_indexed(&mut out, |o| {
                locate(sampling, o, dim).map_or_else(A::zero, |c| {
                    AsPrimitive::<A>::as_(trilinear(&data.view(), &c))
                })
            })
        }
        Interpolation::Cubic => {
            let coef = spline_coefficients(input.mapv(|v| -> f64 { v.as_() }));
            fill_indexed(&mut out, |o| {
                locate(sampling, o, dim)
                    .map_or_else(A::zero, |c| AsPrimitive::<A>::as_(cubic(&coef.view(), &c)))
            })
        }
    }
    out
}

/// 输出体素在输入中的坐标. 越界时返回 `None`.
#[inline]
fn locate(sampling: &AffineTransform, (z, y, x): Idx3d, dim: Idx3d) -> Option<Point3> {
    let c = sampling.apply(&[z as f64, y as f64, x as f64]);
    let n = [dim.0, dim.1, dim.2];
    let inside = c
        .iter()
        .zip(n)
        .all(|(&v, n)| v >= -BOUNDARY_TOL && v <= (n - 1) as f64 + BOUNDARY_TOL);
    inside.then_some(c)
}

#[inline]
fn clamp_index(v: f64, n: usize) -> usize {
    if v <= 0.0 {
        0
    } else {
        (v as usize).min(n - 1)
    }
}

#[inline]
fn nearest_index(c: &Point3, (nz, ny, nx): Idx3d) -> Idx3d {
    (
        clamp_index((c[0] + 0.5).floor(), nz),
        clamp_index((c[1] + 0.5).floor(), ny),
        clamp_index((c[2] + 0.5).floor(), nx),
    )
}

/// 线性插值的下标与权重.
#[inline]
fn linear_stencil(v: f64, n: usize) -> (usize, usize, f64) {
    if n == 1 {
        return (0, 0, 0.0);
    }
    let i = clamp_index(v.floor(), n - 1);
    (i, i + 1, (v - i as f64).clamp(0.0, 1.0))
}

fn trilinear(data: &ArrayView3<'_, f64>, c: &Point3) -> f64 {
    let (nz, ny, nx) = data.dim();
    let (z0, z1, tz) = linear_stencil(c[0], nz);
    let (y0, y1, ty) = linear_stencil(c[1], ny);
    let (x0, x1, tx) = linear_stencil(c[2], nx);
    let mut ans = 0.0;
    for (z, wz) in [(z0, 1.0 - tz), (z1, tz)] {
        for (y, wy) in [(y0, 1.0 - ty), (y1, ty)] {
            for (x, wx) in [(x0, 1.0 - tx), (x1, tx)] {
                let w = wz * wy * wx;
                if w != 0.0 {
                    ans += w * data[(z, y, x)];
                }
            }
        }
    }
    ans
}

/// 镜像延拓下的下标. 周期为 `2 (n - 1)`.
#[inline]
fn mirror(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let j = i.rem_euclid(period);
    if j >= n as isize {
        (period - j) as usize
    } else {
        j as usize
    }
}

/// 三次 B 样条的 4 个权重, 对应下标 `i - 1 .. i + 2`, 其中 `t = v - i`.
#[inline]
fn cubic_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        (1.0 - t).powi(3) / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ]
}

#[inline]
fn cubic_stencil(v: f64, n: usize) -> ([usize; 4], [f64; 4]) {
    let i = v.floor();
    let w = cubic_weights(v - i);
    let i = i as isize;
    ([-1, 0, 1, 2].map(|d| mirror(i + d, n)), w)
}

fn cubic(coef: &ArrayView3<'_, f64>, c: &Point3) -> f64 {
    let (nz, ny, nx) = coef.dim();
    let (iz, wz) = cubic_stencil(c[0], nz);
    let (iy, wy) = cubic_stencil(c[1], ny);
    let (ix, wx) = cubic_stencil(c[2], nx);
    let mut ans = 0.0;
    for (z, wz) in iz.into_iter().zip(wz) {
        for (y, wy) in iy.into_iter().zip(wy) {
            let w = wz * wy;
            for (x, wx) in ix.into_iter().zip(wx) {
                ans += w * wx * coef[(z, y, x)];
            }
        }
    }
    ans
}

/// 沿三个轴做三次 B 样条预滤波, 得到插值系数.
pub(crate) fn spline_coefficients(mut data: Array3<f64>) -> Array3<f64> {
    for axis in 0..3 {
        for_each_lane(&mut data, Axis(axis), |mut lane| {
            let mut line = lane.to_vec();
            prefilter_line(&mut line);
            lane.iter_mut().zip(line).for_each(|(v, c)| *v = c);
        });
    }
    data
}

/// 一维三次 B 样条预滤波 (镜像边界).
fn prefilter_line(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }
    let z = 3.0_f64.sqrt() - 2.0;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    c.iter_mut().for_each(|v| *v *= gain);

    let c0 = initial_causal(c, z);
    c[0] = c0;
    for k in 1..n {
        c[k] += z * c[k - 1];
    }
    c[n - 1] = (z / (z * z - 1.0)) * (c[n - 1] + z * c[n - 2]);
    for k in (0..n - 1).rev() {
        c[k] = z * (c[k + 1] - c[k]);
    }
}

fn initial_causal(c: &[f64], z: f64) -> f64 {
    let n = c.len();
    let horizon = (PREFILTER_TOL.ln() / z.abs().ln()).ceil() as usize;
    if horizon < n {
        let mut zn = z;
        let mut sum = c[0];
        for &v in c.iter().take(horizon).skip(1) {
            sum += zn * v;
            zn *= z;
        }
        sum
    } else {
        let iz = 1.0 / z;
        let mut zn = z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for &v in c.iter().take(n - 1).skip(1) {
            sum += (zn + z2n) * v;
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> Array3<f32> {
        Array3::from_shape_fn((6, 7, 8), |(z, y, x)| {
            ((z * 31 + y * 17 + x * 7) % 23) as f32 - 4.0
        })
    }

    #[test]
    fn test_orders() {
        for order in [0, 1, 3] {
            assert_eq!(Interpolation::from_order(order).unwrap().order(), order);
        }
        assert!(Interpolation::from_order(2).is_none());
    }

    #[test]
    fn test_identity_reproduces_input() {
        let v = volume();
        let id = AffineTransform::identity();
        assert_eq!(resample(v.view(), &id, Interpolation::Nearest, v.dim()), v);
        let lin = resample(v.view(), &id, Interpolation::Linear, v.dim());
        assert!(lin.iter().zip(v.iter()).all(|(a, b)| (a - b).abs() < 1e-5));
        let cub = resample(v.view(), &id, Interpolation::Cubic, v.dim());
        assert!(cub.iter().zip(v.iter()).all(|(a, b)| (a - b).abs() < 1e-4));
    }

    #[test]
    fn test_integer_shift() {
        let v = volume();
        let shift = AffineTransform::translation([1.0, 0.0, -2.0]);
        for interp in [Interpolation::Nearest, Interpolation::Linear, Interpolation::Cubic] {
            let out = resample(v.view(), &shift, interp, v.dim());
            // out[o] = v[o + (1, 0, -2)]
            assert!((out[(2, 3, 4)] - v[(3, 3, 2)]).abs() < 1e-4);
            assert_eq!(out[(5, 0, 0)], 0.0);
            assert_eq!(out[(0, 0, 1)], 0.0);
        }
    }

    #[test]
    fn test_linear_midpoint() {
        let v = Array3::from_shape_fn((2, 2, 2), |(z, _, _)| z as f64 * 10.0);
        let half = AffineTransform::translation([0.5, 0.0, 0.0]);
        let out = resample(v.view(), &half, Interpolation::Linear, (1, 2, 2));
        assert!(out.iter().all(|&x| (x - 5.0).abs() < 1e-12));
    }

    #[test]
    fn test_nearest_keeps_labels() {
        let labels = Array3::from_shape_fn((5, 5, 5), |(z, y, x)| ((z + y + x) % 3) as u8);
        let t = AffineTransform::translation([0.4, -0.3, 0.2]);
        let out = resample(labels.view(), &t, Interpolation::Nearest, labels.dim());
        assert!(out.iter().all(|&v| v < 3));
        assert_eq!(out[(1, 1, 1)], labels[(1, 1, 1)]);
    }

    #[test]
    fn test_mirror() {
        let idx: Vec<_> = (-3..8).map(|i| mirror(i, 4)).collect();
        assert_eq!(idx, [3, 2, 1, 0, 1, 2, 3, 2, 1, 0, 1]);
        assert_eq!(mirror(-5, 1), 0);
    }

    #[test]
    fn test_cubic_weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            assert!((cubic_weights(t).iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }
}
