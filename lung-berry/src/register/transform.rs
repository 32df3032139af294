//! 三维仿射变换.

use crate::Point3;
use ndarray::{s, Array2, ArrayView2};
use ndarray_linalg::Inverse;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 齐次坐标下的 4x4 仿射矩阵, 作用于 `(z, y, x)` 坐标. 最后一行恒为 `[0, 0, 0, 1]`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AffineTransform {
    matrix: Array2<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// 恒等变换.
    pub fn identity() -> Self {
        Self {
            matrix: Array2::eye(4),
        }
    }

    /// 平移变换.
    pub fn translation(t: Point3) -> Self {
        Self::from_parts(Array2::<f64>::eye(3).view(), t)
    }

    /// 由线性部分与平移部分构造.
    ///
    /// # 注意
    ///
    /// `linear` 必须是 3x3 矩阵, 否则 panic.
    pub fn from_parts(linear: ArrayView2<'_, f64>, offset: Point3) -> Self {
        assert_eq!(linear.dim(), (3, 3), "线性部分必须是 3x3 矩阵");
        let mut matrix: Array2<f64> = Array2::eye(4);
        matrix.slice_mut(s![..3, ..3]).assign(&linear);
        for (i, v) in offset.into_iter().enumerate() {
            matrix[(i, 3)] = v;
        }
        Self { matrix }
    }

    /// 由 4x4 齐次矩阵构造. 形状不对或最后一行不是 `[0, 0, 0, 1]` 时返回 `None`.
    pub fn from_matrix(matrix: Array2<f64>) -> Option<Self> {
        let last_row_ok = matrix.dim() == (4, 4)
            && matrix
                .row(3)
                .iter()
                .zip([0.0, 0.0, 0.0, 1.0])
                .all(|(a, b)| *a == b);
        last_row_ok.then_some(Self { matrix })
    }

    /// 4x4 齐次矩阵.
    #[inline]
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    /// 3x3 线性部分.
    #[inline]
    pub fn linear(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![..3, ..3])
    }

    /// 平移部分.
    #[inline]
    pub fn offset(&self) -> Point3 {
        [self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)]]
    }

    /// 变换一个点.
    #[inline]
    pub fn apply(&self, p: &Point3) -> Point3 {
        let m = &self.matrix;
        let mut ans = [0.0; 3];
        for (i, v) in ans.iter_mut().enumerate() {
            *v = m[(i, 0)] * p[0] + m[(i, 1)] * p[1] + m[(i, 2)] * p[2] + m[(i, 3)];
        }
        ans
    }

    /// 复合变换 `self ∘ first`: 先作用 `first`, 再作用 `self`.
    pub fn compose(&self, first: &AffineTransform) -> Self {
        Self {
            matrix: self.matrix.dot(&first.matrix),
        }
    }

    /// 逆变换. 线性部分奇异时返回 `None`.
    pub fn inverse(&self) -> Option<Self> {
        let matrix = self.matrix.inv().ok()?;
        if !matrix.iter().all(|v| v.is_finite()) {
            return None;
        }
        // 清除舍入误差, 保持齐次矩阵的形式.
        let mut ans = Self { matrix };
        ans.matrix.row_mut(3).assign(&ndarray::arr1(&[0.0, 0.0, 0.0, 1.0]));
        Some(ans)
    }

    /// 与恒等变换的逐元素差是否都不超过 `tol`.
    pub fn is_identity(&self, tol: f64) -> bool {
        self.matrix
            .indexed_iter()
            .all(|((i, j), &v)| (v - if i == j { 1.0 } else { 0.0 }).abs() <= tol)
    }
}

impl fmt::Display for AffineTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.matrix.rows() {
            writeln!(
                f,
                "[{:>12.6} {:>12.6} {:>12.6} {:>12.6}]",
                row[0], row[1], row[2], row[3]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn point_eq(a: &Point3, b: &Point3) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn test_apply_and_parts() {
        let t = AffineTransform::from_parts(
            array![[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 2.0]].view(),
            [1.0, 2.0, 3.0],
        );
        assert_eq!(t.offset(), [1.0, 2.0, 3.0]);
        assert_eq!(t.linear()[(2, 2)], 2.0);
        assert!(point_eq(&t.apply(&[1.0, 1.0, 1.0]), &[0.0, 3.0, 5.0]));
    }

    #[test]
    fn test_compose_and_inverse() {
        let a = AffineTransform::translation([1.0, -2.0, 0.5]);
        let b = AffineTransform::from_parts(
            array![[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]].view(),
            [0.0, 0.0, 0.0],
        );
        let ab = a.compose(&b);
        let p = [3.0, 4.0, 5.0];
        assert!(point_eq(&ab.apply(&p), &a.apply(&b.apply(&p))));

        let inv = ab.inverse().unwrap();
        assert!(point_eq(&inv.apply(&ab.apply(&p)), &p));
        assert!(inv.compose(&ab).is_identity(1e-12));
    }

    #[test]
    fn test_from_matrix() {
        assert!(AffineTransform::from_matrix(Array2::eye(4)).is_some());
        assert!(AffineTransform::from_matrix(Array2::eye(3)).is_none());
        let mut m: Array2<f64> = Array2::eye(4);
        m[(3, 0)] = 0.5;
        assert!(AffineTransform::from_matrix(m).is_none());
    }

    #[test]
    fn test_singular_inverse() {
        let t = AffineTransform::from_parts(Array2::<f64>::zeros((3, 3)).view(), [0.0; 3]);
        assert!(t.inverse().is_none());
        assert!(!t.is_identity(0.5));
    }
}
