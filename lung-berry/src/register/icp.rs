//! 迭代最近点 (ICP) 配准.
//!
//! 从若干个初始变换出发分别迭代, 每轮:
//!
//! 1. 用当前变换作用于源点云中等间隔抽取的 landmark;
//! 2. 在目标点云中为每个 landmark 找最近点;
//! 3. 用最小二乘拟合一个增量变换 (刚体, 相似或仿射) 并累积.
//!
//! 达到最大迭代次数, 或某一轮的增量已是恒等变换时停止.
//! 最终取 landmark 平均平方距离最小的结果.
//!
//! 初始变换包括质心对齐, 以及质心对齐后再对齐两个点云的主轴.
//! 只有质心对齐时, 较大的旋转容易停在局部极小值.

use super::nearest::PointGrid;
use super::surface::centroid;
use super::AffineTransform;
use crate::Point3;
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, Solve, UPLO};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 平均平方距离低于该值时不再尝试其余初始变换.
const EXACT_FIT: f64 = 1e-20;

/// landmark 拟合允许的自由度.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LandmarkMode {
    /// 旋转 + 平移.
    RigidBody,

    /// 旋转 + 平移 + 各向同性缩放.
    #[default]
    Similarity,

    /// 一般仿射变换.
    Affine,
}

/// ICP 参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IcpParams {
    /// 每轮最多使用的 landmark 个数.
    pub max_landmarks: usize,

    /// 最大迭代次数.
    pub max_iterations: usize,

    /// 增量变换视为恒等的容差.
    pub identity_tolerance: f64,

    /// landmark 拟合模式.
    pub mode: LandmarkMode,
}

/// 在 `source` 中等间隔抽取至多 `max` 个点.
pub(crate) fn landmarks(source: &[Point3], max: usize) -> Vec<Point3> {
    let n = source.len().min(max.max(1));
    if n == 0 {
        return vec![];
    }
    let step = source.len() / n;
    source.iter().step_by(step).take(n).copied().collect()
}

/// 求把 `source` 对齐到 `target` 的变换.
///
/// # 返回值
///
/// 任一点云为空, 或所有初始变换下的拟合都退化 (仿射模式下 landmark 共面等) 时返回 `None`.
pub fn align(source: &[Point3], target: &[Point3], params: &IcpParams) -> Option<AffineTransform> {
    let grid = PointGrid::new(target)?;
    let marks = landmarks(source, params.max_landmarks);

    let mut best: Option<(AffineTransform, f64)> = None;
    for start in initial_guesses(source, target)? {
        let Some((t, err)) = iterate(&marks, target, &grid, start, params) else {
            continue;
        };
        if best.as_ref().map_or(true, |(_, e)| err < *e) {
            best = Some((t, err));
        }
        if best.as_ref().is_some_and(|(_, e)| *e <= EXACT_FIT) {
            break;
        }
    }
    best.map(|(t, _)| t)
}

/// 从 `start` 出发迭代. 返回累积变换与最终的 landmark 平均平方距离.
fn iterate(
    marks: &[Point3],
    target: &[Point3],
    grid: &PointGrid<'_>,
    start: AffineTransform,
    params: &IcpParams,
) -> Option<(AffineTransform, f64)> {
    let mut acc = start;
    for _ in 0..params.max_iterations {
        let moved: Vec<Point3> = marks.iter().map(|p| acc.apply(p)).collect();
        let matched: Vec<Point3> = moved
            .iter()
            .map(|p| target[grid.nearest(p).0])
            .collect();
        let step = fit_landmarks(&moved, &matched, params.mode)?;
        acc = step.compose(&acc);
        if step.is_identity(params.identity_tolerance) {
            break;
        }
    }
    let err = marks
        .iter()
        .map(|p| grid.nearest(&acc.apply(p)).1)
        .sum::<f64>()
        / marks.len().max(1) as f64;
    Some((acc, err))
}

/// 初始变换: 先是质心对齐, 之后是所有符号组合下的主轴对齐 (只保留真旋转).
fn initial_guesses(source: &[Point3], target: &[Point3]) -> Option<Vec<AffineTransform>> {
    let (cs, ct) = (centroid(source)?, centroid(target)?);
    let mut ans = vec![AffineTransform::translation(sub(&ct, &cs))];

    let (Some(vs), Some(vt)) = (principal_axes(source, &cs), principal_axes(target, &ct)) else {
        return Some(ans);
    };
    for signs in 0..8u8 {
        let d = Array2::from_diag(&Array1::from_iter(
            (0..3).map(|k| if signs >> k & 1 == 1 { -1.0 } else { 1.0 }),
        ));
        let rotation = vt.dot(&d).dot(&vs.t());
        if det3(&rotation) <= 0.0 {
            continue;
        }
        let rc = rotation.dot(&Array1::from(cs.to_vec()));
        ans.push(AffineTransform::from_parts(
            rotation.view(),
            [ct[0] - rc[0], ct[1] - rc[1], ct[2] - rc[2]],
        ));
    }
    Some(ans)
}

/// 点云协方差矩阵的特征向量 (按列, 特征值升序). 分解失败时返回 `None`.
fn principal_axes(points: &[Point3], c: &Point3) -> Option<Array2<f64>> {
    let mut cov = Array2::<f64>::zeros((3, 3));
    for p in points {
        let d = sub(p, c);
        for i in 0..3 {
            for j in 0..3 {
                cov[(i, j)] += d[i] * d[j];
            }
        }
    }
    let (_, vectors) = cov.eigh(UPLO::Lower).ok()?;
    Some(vectors)
}

#[inline]
fn det3(m: &Array2<f64>) -> f64 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

/// 最小二乘意义下把 `a` 映到 `b` 的变换. 两个点集按下标一一对应.
pub fn fit_landmarks(a: &[Point3], b: &[Point3], mode: LandmarkMode) -> Option<AffineTransform> {
    assert_eq!(a.len(), b.len(), "landmark 必须一一对应");
    let (ca, cb) = (centroid(a)?, centroid(b)?);
    if a.len() == 1 {
        return Some(AffineTransform::translation(sub(&cb, &ca)));
    }
    match mode {
        LandmarkMode::Affine => fit_affine(a, b),
        LandmarkMode::RigidBody | LandmarkMode::Similarity => {
            fit_similarity(a, b, ca, cb, mode == LandmarkMode::Similarity)
        }
    }
}

#[inline]
fn sub(a: &Point3, b: &Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Horn 四元数法.
fn fit_similarity(
    a: &[Point3],
    b: &[Point3],
    ca: Point3,
    cb: Point3,
    scaled: bool,
) -> Option<AffineTransform> {
    // m[i][j] = sum a'_i * b'_j
    let mut m = [[0.0_f64; 3]; 3];
    let (mut sa, mut sb) = (0.0, 0.0);
    for (p, q) in a.iter().zip(b) {
        let (p, q) = (sub(p, &ca), sub(q, &cb));
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] += p[i] * q[j];
            }
        }
        sa += p.iter().map(|v| v * v).sum::<f64>();
        sb += q.iter().map(|v| v * v).sum::<f64>();
    }

    let rotation = if sa > 0.0 {
        let [[sxx, sxy, sxz], [syx, syy, syz], [szx, szy, szz]] = m;
        let n = ndarray::arr2(&[
            [sxx + syy + szz, syz - szy, szx - sxz, sxy - syx],
            [syz - szy, sxx - syy - szz, sxy + syx, szx + sxz],
            [szx - sxz, sxy + syx, -sxx + syy - szz, syz + szy],
            [sxy - syx, szx + sxz, syz + szy, -sxx - syy + szz],
        ]);
        // 特征值升序排列, 最大特征值对应最后一列.
        let (_, v) = n.eigh(UPLO::Lower).ok()?;
        let q = v.column(3);
        quaternion_to_matrix([q[0], q[1], q[2], q[3]])
    } else {
        Array2::eye(3)
    };

    let scale = if scaled && sa > 0.0 { (sb / sa).sqrt() } else { 1.0 };
    let linear = rotation * scale;
    let rc = linear.dot(&Array1::from(ca.to_vec()));
    Some(AffineTransform::from_parts(
        linear.view(),
        [cb[0] - rc[0], cb[1] - rc[1], cb[2] - rc[2]],
    ))
}

/// 单位四元数 `(w, x, y, z)` 对应的旋转矩阵.
fn quaternion_to_matrix(q: [f64; 4]) -> Array2<f64> {
    let norm = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    let [w, x, y, z] = q.map(|v| v / norm);
    ndarray::arr2(&[
        [
            w * w + x * x - y * y - z * z,
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
        ],
        [
            2.0 * (x * y + w * z),
            w * w - x * x + y * y - z * z,
            2.0 * (y * z - w * x),
        ],
        [
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            w * w - x * x - y * y + z * z,
        ],
    ])
}

/// 正规方程. 每个输出坐标分别求解一个 4x4 线性方程组.
fn fit_affine(a: &[Point3], b: &[Point3]) -> Option<AffineTransform> {
    let mut ata = Array2::<f64>::zeros((4, 4));
    let mut atb = Array2::<f64>::zeros((4, 3));
    for (p, q) in a.iter().zip(b) {
        let row = [p[0], p[1], p[2], 1.0];
        for i in 0..4 {
            for j in 0..4 {
                ata[(i, j)] += row[i] * row[j];
            }
            for j in 0..3 {
                atb[(i, j)] += row[i] * q[j];
            }
        }
    }

    let mut matrix = Array2::<f64>::eye(4);
    for j in 0..3 {
        let coef = ata.solve(&atb.column(j)).ok()?;
        if !coef.iter().all(|v| v.is_finite()) {
            return None;
        }
        matrix.row_mut(j).assign(&coef);
    }
    AffineTransform::from_matrix(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(mode: LandmarkMode) -> IcpParams {
        IcpParams {
            max_landmarks: 200,
            max_iterations: 100,
            identity_tolerance: 1e-10,
            mode,
        }
    }

    /// 一个非对称的点集.
    fn cloud() -> Vec<Point3> {
        let mut pts = vec![];
        for i in 0..6 {
            for j in 0..5 {
                for k in 0..4 {
                    let (i, j, k) = (i as f64, j as f64, k as f64);
                    pts.push([i * 1.5, j + 0.3 * i, k * 0.8 + 0.1 * j * j]);
                }
            }
        }
        pts
    }

    fn close(a: &Point3, b: &Point3, tol: f64) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_landmarks() {
        let pts: Vec<Point3> = (0..10).map(|i| [i as f64, 0.0, 0.0]).collect();
        let marks = landmarks(&pts, 3);
        assert_eq!(marks, [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [6.0, 0.0, 0.0]]);
        assert_eq!(landmarks(&pts, 200).len(), 10);
    }

    #[test]
    fn test_fit_rigid_recovers_rotation() {
        let a = cloud();
        let rot = AffineTransform::from_parts(
            array![[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]].view(),
            [2.0, -1.0, 0.5],
        );
        let b: Vec<_> = a.iter().map(|p| rot.apply(p)).collect();
        for mode in [LandmarkMode::RigidBody, LandmarkMode::Similarity, LandmarkMode::Affine] {
            let t = fit_landmarks(&a, &b, mode).unwrap();
            assert!(a.iter().zip(&b).all(|(p, q)| close(&t.apply(p), q, 1e-8)));
        }
    }

    #[test]
    fn test_fit_similarity_recovers_scale() {
        let a = cloud();
        let scaled = AffineTransform::from_parts(
            (Array2::<f64>::eye(3) * 1.25).view(),
            [0.0, 3.0, 0.0],
        );
        let b: Vec<_> = a.iter().map(|p| scaled.apply(p)).collect();
        let t = fit_landmarks(&a, &b, LandmarkMode::Similarity).unwrap();
        assert!((t.linear()[(0, 0)] - 1.25).abs() < 1e-9);

        // 刚体模式不允许缩放.
        let r = fit_landmarks(&a, &b, LandmarkMode::RigidBody).unwrap();
        assert!((r.linear()[(0, 0)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_affine_degenerate() {
        // 共面点无法确定一般仿射变换.
        let a: Vec<Point3> = (0..10).map(|i| [i as f64, (i * i) as f64, 0.0]).collect();
        assert!(fit_landmarks(&a, &a, LandmarkMode::Affine).is_none());
        assert!(fit_landmarks(&a, &a, LandmarkMode::Similarity)
            .unwrap()
            .is_identity(1e-9));
    }

    #[test]
    fn test_align_identical_clouds() {
        let a = cloud();
        let t = align(&a, &a, &params(LandmarkMode::Similarity)).unwrap();
        assert!(t.is_identity(1e-9));
    }

    #[test]
    fn test_align_translation() {
        let a = cloud();
        let shift = AffineTransform::translation([0.7, -1.2, 2.0]);
        let b: Vec<_> = a.iter().map(|p| shift.apply(p)).collect();
        let t = align(&a, &b, &params(LandmarkMode::Similarity)).unwrap();
        assert!(close(&t.offset(), &[0.7, -1.2, 2.0], 1e-9));
        assert!(align(&a, &[], &params(LandmarkMode::Affine)).is_none());
    }

    #[test]
    fn test_align_recovers_rotation() {
        // 只做质心对齐时, 这样的旋转会停在局部极小值.
        let a = cloud();
        let (sin, cos) = 12.0_f64.to_radians().sin_cos();
        let rot = AffineTransform::from_parts(
            array![[cos, -sin, 0.0], [sin, cos, 0.0], [0.0, 0.0, 1.0]].view(),
            [3.0, -2.0, 1.0],
        );
        let b: Vec<_> = a.iter().map(|p| rot.apply(p)).collect();
        for mode in [LandmarkMode::RigidBody, LandmarkMode::Similarity] {
            let t = align(&a, &b, &params(mode)).unwrap();
            assert!((t.linear()[(0, 1)] + sin).abs() < 1e-6);
            assert!(a.iter().all(|p| close(&t.apply(p), &rot.apply(p), 1e-6)));
        }
    }
}
