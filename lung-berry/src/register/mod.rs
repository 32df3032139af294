//! 基于肺部掩膜的仿射配准.
//!
//! 对参考时间点与待配准时间点的肺部掩膜:
//!
//! 1. 高斯平滑 (sigma = 1), 转为实值体数据;
//! 2. 提取阈值 0.5 处的等值面顶点;
//! 3. 以质心对齐与主轴对齐为起点, 用 ICP 把待配准点云对齐到参考点云,
//!   得到 "待配准空间 -> 参考空间" 的变换;
//! 4. 用该变换的逆 (参考空间 -> 待配准空间) 对图像与掩膜做拉回重采样.
//!   图像默认使用三次插值, 掩膜只使用最近邻.
//!
//! 时间序列中所有时间点都对齐到第一个时间点, 第一个时间点保持不变.

mod icp;
mod nearest;
mod resample;
mod smooth;
mod surface;
mod transform;

pub use icp::{align, fit_landmarks, IcpParams, LandmarkMode};
pub use resample::{resample, Interpolation};
pub use smooth::{gaussian_filter, gaussian_kernel, smooth_mask};
pub use surface::{centroid, isosurface_vertices};
pub use transform::AffineTransform;

use crate::consts::registration as defaults;
use crate::{Idx3d, Point3};
use log::{debug, warn};
use ndarray::{Array3, Array4, ArrayView3, ArrayView4, ArrayViewMut1, Axis, Zip};
use num::traits::AsPrimitive;
use num::Zero;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};

        /// 借助 `rayon`, 并行地把第 `1..n` 个时间点分别配准到参考时间点.
        fn fit_timepoints(
            reference: ArrayView3<'_, u8>,
            lungs: ArrayView4<'_, u8>,
            params: &RegistrationParams,
        ) -> Vec<AffineTransform> {
            (1..lungs.len_of(Axis(0)))
                .into_par_iter()
                .map(|k| fit_timepoint(reference, lungs, k, params))
                .collect()
        }

        /// 借助 `rayon`, 并行地对 `data` 沿 `axis` 的每条线实施 `op` 操作.
        pub(crate) fn for_each_lane<F>(data: &mut Array3<f64>, axis: Axis, op: F)
        where
            F: Fn(ArrayViewMut1<'_, f64>) + Sync + Send,
        {
            Zip::from(data.lanes_mut(axis)).par_for_each(op);
        }

        /// 借助 `rayon`, 并行地以 `op(索引)` 填充 `out`.
        pub(crate) fn fill_indexed<A, F>(out: &mut Array3<A>, op: F)
        where
            A: Send,
            F: Fn(Idx3d) -> A + Sync + Send,
        {
            Zip::indexed(out).par_for_each(|idx, v| *v = op(idx));
        }
    } else {
        /// 把第 `1..n` 个时间点分别配准到参考时间点.
        fn fit_timepoints(
            reference: ArrayView3<'_, u8>,
            lungs: ArrayView4<'_, u8>,
            params: &RegistrationParams,
        ) -> Vec<AffineTransform> {
            (1..lungs.len_of(Axis(0)))
                .map(|k| fit_timepoint(reference, lungs, k, params))
                .collect()
        }

        /// 对 `data` 沿 `axis` 的每条线实施 `op` 操作.
        pub(crate) fn for_each_lane<F>(data: &mut Array3<f64>, axis: Axis, op: F)
        where
            F: Fn(ArrayViewMut1<'_, f64>),
        {
            Zip::from(data.lanes_mut(axis)).for_each(op);
        }

        /// 以 `op(索引)` 填充 `out`.
        pub(crate) fn fill_indexed<A, F>(out: &mut Array3<A>, op: F)
        where
            F: Fn(Idx3d) -> A,
        {
            Zip::indexed(out).for_each(|idx, v| *v = op(idx));
        }
    }
}

/// 配准参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistrationParams {
    /// 掩膜平滑的高斯标准差 (体素).
    pub sigma: f64,

    /// 高斯核截断位置, 以 `sigma` 为单位.
    pub truncate: f64,

    /// 等值面阈值.
    pub level: f64,

    /// ICP 每轮最多使用的 landmark 个数.
    pub max_landmarks: usize,

    /// ICP 最大迭代次数.
    pub max_iterations: usize,

    /// ICP landmark 拟合模式.
    pub mode: LandmarkMode,

    /// 图像重采样的插值方式. 掩膜总是使用最近邻.
    pub image_interpolation: Interpolation,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            sigma: defaults::GAUSSIAN_SIGMA,
            truncate: defaults::GAUSSIAN_TRUNCATE,
            level: defaults::ISO_LEVEL,
            max_landmarks: defaults::ICP_MAX_LANDMARKS,
            max_iterations: defaults::ICP_MAX_ITERATIONS,
            mode: LandmarkMode::default(),
            image_interpolation: Interpolation::Cubic,
        }
    }
}

impl RegistrationParams {
    fn icp(&self) -> IcpParams {
        IcpParams {
            max_landmarks: self.max_landmarks,
            max_iterations: self.max_iterations,
            identity_tolerance: defaults::ICP_IDENTITY_TOLERANCE,
            mode: self.mode,
        }
    }
}

/// 平滑后的掩膜等值面顶点.
pub fn mask_surface(mask: ArrayView3<'_, u8>, params: &RegistrationParams) -> Vec<Point3> {
    let smoothed = smooth_mask(mask, params.sigma, params.truncate);
    isosurface_vertices(smoothed.view(), params.level)
}

/// 估计把 `moving` 的肺部对齐到 `reference` 的仿射变换 (待配准空间 -> 参考空间).
///
/// # 返回值
///
/// 任一掩膜没有等值面 (全空或全满), 或拟合退化时返回 `None`.
pub fn fit_affine_from_lung_masks(
    reference: ArrayView3<'_, u8>,
    moving: ArrayView3<'_, u8>,
    params: &RegistrationParams,
) -> Option<AffineTransform> {
    let target = mask_surface(reference, params);
    let source = mask_surface(moving, params);
    debug!(
        "Isosurface vertices: reference = {}, moving = {}",
        target.len(),
        source.len()
    );
    align(&source, &target, &params.icp())
}

/// 用 `transform` (待配准空间 -> 参考空间) 把 `image` 重采样到参考空间. 形状不变.
///
/// 实际采样使用 `transform` 的逆. 变换不可逆时返回 `None`.
pub fn apply_transform<A>(
    image: ArrayView3<'_, A>,
    transform: &AffineTransform,
    interpolation: Interpolation,
) -> Option<Array3<A>>
where
    A: Copy + Zero + AsPrimitive<f64> + Send + Sync,
    f64: AsPrimitive<A>,
{
    let sampling = transform.inverse()?;
    Some(resample(image, &sampling, interpolation, image.dim()))
}

/// 配准后的时间序列.
#[derive(Clone, Debug)]
pub struct Registered<A> {
    /// 配准后的图像, 形状与输入相同.
    pub images: Array4<A>,

    /// 配准后的肺部掩膜.
    pub lungs: Array4<u8>,

    /// 每个时间点的变换 (该时间点 -> 第一个时间点). 第一个恒为恒等变换.
    pub transforms: Vec<AffineTransform>,
}

impl<A> Registered<A> {
    /// 用同样的变换以最近邻方式重采样另一组标签序列, 例如肿瘤掩膜.
    ///
    /// # 注意
    ///
    /// `labels` 的时间点个数必须与配准时相同.
    pub fn warp_labels(&self, labels: ArrayView4<'_, u8>) -> Array4<u8> {
        assert_eq!(
            labels.len_of(Axis(0)),
            self.transforms.len(),
            "标签序列的时间点个数与配准结果不一致"
        );
        warp_series::<u8>(labels, &self.transforms, Interpolation::Nearest)
    }
}

fn warp_series<A>(
    series: ArrayView4<'_, A>,
    transforms: &[AffineTransform],
    interpolation: Interpolation,
) -> Array4<A>
where
    A: Copy + Zero + AsPrimitive<f64> + Send + Sync,
    f64: AsPrimitive<A>,
{
    let mut out = series.to_owned();
    for (k, (mut slot, t)) in out
        .axis_iter_mut(Axis(0))
        .zip(transforms)
        .enumerate()
        .skip(1)
    {
        if t.is_identity(0.0) {
            continue;
        }
        match apply_transform(series.index_axis(Axis(0), k), t, interpolation) {
            Some(warped) => slot.assign(&warped),
            None => warn!("Timepoint {k}: transform is not invertible, kept unregistered"),
        }
    }
    out
}

/// 把时间序列中的每个时间点对齐到第一个时间点.
///
/// 每个时间点都直接与第一个时间点的掩膜配准, 误差不会沿序列累积.
/// 某个时间点无法拟合时, 记录警告并使用恒等变换.
///
/// # 注意
///
/// `images` 与 `lungs` 的形状必须相同.
pub fn register_timeseries<A>(
    images: ArrayView4<'_, A>,
    lungs: ArrayView4<'_, u8>,
    params: &RegistrationParams,
) -> Registered<A>
where
    A: Copy + Zero + AsPrimitive<f64> + Send + Sync,
    f64: AsPrimitive<A>,
{
    assert_eq!(images.dim(), lungs.dim(), "图像序列与肺部掩膜序列形状不一致");

    let mut transforms = vec![];
    if images.len_of(Axis(0)) > 0 {
        transforms.push(AffineTransform::identity());
        transforms.extend(fit_timepoints(lungs.index_axis(Axis(0), 0), lungs, params));
    }

    Registered {
        images: warp_series(images, &transforms, params.image_interpolation),
        lungs: warp_series::<u8>(lungs, &transforms, Interpolation::Nearest),
        transforms,
    }
}

/// 把第 `k` 个时间点配准到 `reference`. 无法拟合时使用恒等变换.
fn fit_timepoint(
    reference: ArrayView3<'_, u8>,
    lungs: ArrayView4<'_, u8>,
    k: usize,
    params: &RegistrationParams,
) -> AffineTransform {
    let t = fit_affine_from_lung_masks(reference, lungs.index_axis(Axis(0), k), params)
        .unwrap_or_else(|| {
            warn!("Timepoint {k}: lungs registration failed, using the identity");
            AffineTransform::identity()
        });
    debug!("Timepoint {k}: transform\n{t}");
    t
}
