//! 时间序列拼接.
//!
//! 各时间点的 ROI 形状一般不同. 拼接时取每个轴上的最大长度作为公共形状,
//! 每个体数据居中放置, 其余位置补零. 不做任何插值, 也不会裁剪.

use crate::Idx3d;
use ndarray::{s, Array4, ArrayBase, Axis, Data, Ix3};
use num::Zero;

/// 长度为 `extent` 的区间居中放入长度为 `max` 的区间时的起点.
#[inline]
pub const fn centered_offset(max: usize, extent: usize) -> usize {
    (max - extent) / 2
}

/// 所有体数据在每个轴上的最大长度. 输入为空时返回 `None`.
pub fn max_shape<'a, I: IntoIterator<Item = &'a [usize]>>(shapes: I) -> Option<Idx3d> {
    shapes.into_iter().fold(None, |acc, sh| {
        let (z, y, x) = acc.unwrap_or((0, 0, 0));
        Some((z.max(sh[0]), y.max(sh[1]), x.max(sh[2])))
    })
}

/// 把 `images` 拼接为形状 `(N, maxZ, maxY, maxX)` 的 4D 数组.
///
/// 第 `i` 个体数据在每个轴上的起点为 `floor((max - extent) / 2)`.
///
/// # 返回值
///
/// `images` 为空时返回 `None`.
pub fn combine_images<T, S>(images: &[ArrayBase<S, Ix3>]) -> Option<Array4<T>>
where
    T: Clone + Zero,
    S: Data<Elem = T>,
{
    let (mz, my, mx) = max_shape(images.iter().map(|a| a.shape()))?;
    let mut out = Array4::zeros((images.len(), mz, my, mx));
    for (mut slot, image) in out.axis_iter_mut(Axis(0)).zip(images) {
        let (z, y, x) = image.dim();
        let (oz, oy, ox) = (
            centered_offset(mz, z),
            centered_offset(my, y),
            centered_offset(mx, x),
        );
        slot.slice_mut(s![oz..oz + z, oy..oy + y, ox..ox + x])
            .assign(image);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_centered_offset() {
        assert_eq!(centered_offset(4, 2), 1);
        assert_eq!(centered_offset(5, 2), 1);
        assert_eq!(centered_offset(5, 5), 0);
        assert_eq!(centered_offset(7, 2), 2);
    }

    #[test]
    fn test_combine_two_cubes() {
        let a = Array3::<u8>::from_elem((4, 4, 4), 1);
        let b = Array3::<u8>::from_elem((2, 2, 2), 7);
        let out = combine_images(&[a.clone(), b]).unwrap();

        assert_eq!(out.dim(), (2, 4, 4, 4));
        assert_eq!(out.index_axis(Axis(0), 0), a);

        let second = out.index_axis(Axis(0), 1);
        assert_eq!(second.slice(s![1..3, 1..3, 1..3]), Array3::from_elem((2, 2, 2), 7));
        assert_eq!(second.iter().filter(|&&v| v == 7).count(), 8);
        assert_eq!(second.iter().filter(|&&v| v == 0).count(), 64 - 8);
    }

    #[test]
    fn test_combine_mixed_extents() {
        // 每个轴的最大值来自不同输入.
        let a = Array3::<f32>::ones((3, 1, 6));
        let b = Array3::<f32>::from_elem((1, 5, 2), 2.0);
        let out = combine_images(&[a.view(), b.view()]).unwrap();

        assert_eq!(out.dim(), (2, 3, 5, 6));
        assert_eq!(out.index_axis(Axis(0), 0).slice(s![.., 2..3, ..]), a);
        assert_eq!(out.index_axis(Axis(0), 1).slice(s![1..2, .., 2..4]), b);
        assert_eq!(out.sum(), 18.0 + 20.0);
    }

    #[test]
    fn test_combine_is_idempotent() {
        let images: Vec<_> = [(2, 3, 4), (4, 3, 2), (3, 3, 3)]
            .into_iter()
            .enumerate()
            .map(|(i, sh)| Array3::from_elem(sh, i as i32 + 1))
            .collect();
        let first = combine_images(&images).unwrap();
        let second = combine_images(&images).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.dim(), (3, 4, 3, 4));
    }

    #[test]
    fn test_combine_empty() {
        let images: Vec<Array3<f32>> = vec![];
        assert!(combine_images(&images).is_none());
    }
}
