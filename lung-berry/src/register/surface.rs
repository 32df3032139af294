//! 等值面顶点提取.
//!
//! 与 marching cubes 产生的顶点集合相同: 每条穿过阈值的体素棱上恰有一个顶点,
//! 位置由两端值线性插值得到. 不生成三角面片, 配准只需要点云.

use crate::Point3;
use ndarray::ArrayView3;

/// 提取 `volume` 在阈值 `level` 处的等值面顶点, 坐标为 `(z, y, x)` 体素索引空间.
///
/// 按 `(z, y, x)` 行优先, 再按轴 `z, y, x` 的顺序产出, 结果是确定的.
pub fn isosurface_vertices(volume: ArrayView3<'_, f64>, level: f64) -> Vec<Point3> {
    let (nz, ny, nx) = volume.dim();
    let mut ans = Vec::new();
    for ((z, y, x), &a) in volume.indexed_iter() {
        let neighbours = [
            (z + 1 < nz).then(|| (z + 1, y, x)),
            (y + 1 < ny).then(|| (z, y + 1, x)),
            (x + 1 < nx).then(|| (z, y, x + 1)),
        ];
        for (axis, idx) in neighbours.into_iter().enumerate() {
            let Some(idx) = idx else {
                continue;
            };
            let b = volume[idx];
            if (a > level) == (b > level) {
                continue;
            }
            let t = (level - a) / (b - a);
            let mut p = [z as f64, y as f64, x as f64];
            p[axis] += t;
            ans.push(p);
        }
    }
    ans
}

/// 点云质心. 空点云返回 `None`.
pub fn centroid(points: &[Point3]) -> Option<Point3> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mut c = [0.0; 3];
    for p in points {
        for (ci, pi) in c.iter_mut().zip(p) {
            *ci += pi;
        }
    }
    Some(c.map(|v| v / n))
}
