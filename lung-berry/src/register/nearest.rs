//! 均匀网格上的最近邻查询.

use crate::Point3;

/// 每个轴上的最大格子数.
const MAX_CELLS_PER_AXIS: usize = 128;

/// 把点云放进均匀网格, 支持最近邻查询. 只借用点云.
pub(crate) struct PointGrid<'a> {
    points: &'a [Point3],
    origin: Point3,
    cell: f64,
    dims: [usize; 3],
    cells: Vec<Vec<u32>>,
}

impl<'a> PointGrid<'a> {
    /// 构造网格. 点云为空时返回 `None`.
    pub(crate) fn new(points: &'a [Point3]) -> Option<Self> {
        let first = points.first()?;
        let (mut lo, mut hi) = (*first, *first);
        for p in points {
            for k in 0..3 {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
        }
        let extent = [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]];
        let longest = extent.iter().fold(0.0_f64, |m, &e| m.max(e));

        // 平均每个格子约 8 个点.
        let volume: f64 = extent.iter().map(|e| e.max(longest * 1e-3)).product();
        let mut cell = (8.0 * volume / points.len() as f64).cbrt();
        if !cell.is_finite() || cell <= 0.0 {
            cell = longest.max(1.0);
        }
        cell = cell.max(longest / MAX_CELLS_PER_AXIS as f64);

        let dims = extent.map(|e| ((e / cell) as usize + 1).min(MAX_CELLS_PER_AXIS));
        let mut grid = Self {
            points,
            origin: lo,
            cell,
            dims,
            cells: vec![vec![]; dims[0] * dims[1] * dims[2]],
        };
        for (i, p) in points.iter().enumerate() {
            let c = grid.cell_of(p);
            let flat = grid.flat(c);
            grid.cells[flat].push(i as u32);
        }
        Some(grid)
    }

    #[inline]
    fn cell_of(&self, p: &Point3) -> [usize; 3] {
        let mut c = [0; 3];
        for k in 0..3 {
            let v = ((p[k] - self.origin[k]) / self.cell).floor();
            c[k] = if v <= 0.0 {
                0
            } else {
                (v as usize).min(self.dims[k] - 1)
            };
        }
        c
    }

    #[inline]
    fn flat(&self, [z, y, x]: [usize; 3]) -> usize {
        (z * self.dims[1] + y) * self.dims[2] + x
    }

    /// 距 `q` 最近的点的下标与距离平方.
    ///
    /// 按 Chebyshev 距离逐圈扩展搜索. 第 `r` 圈之外的点与 `q` 的距离至少为
    /// `r * cell`, 当已有结果不超过该界时停止.
    pub(crate) fn nearest(&self, q: &Point3) -> (usize, f64) {
        let qc = self.cell_of(q);
        let max_ring = self.dims.iter().copied().max().unwrap_or(1);
        let mut best = (0usize, f64::INFINITY);

        for r in 0..=max_ring {
            let r = r as isize;
            for dz in -r..=r {
                for dy in -r..=r {
                    for dx in -r..=r {
                        if dz.abs().max(dy.abs()).max(dx.abs()) != r {
                            continue;
                        }
                        let Some(c) = self.offset_cell(qc, [dz, dy, dx]) else {
                            continue;
                        };
                        for &i in self.cells[self.flat(c)].iter() {
                            let d = dist2(q, &self.points[i as usize]);
                            if d < best.1 || (d == best.1 && (i as usize) < best.0) {
                                best = (i as usize, d);
                            }
                        }
                    }
                }
            }
            let bound = r as f64 * self.cell;
            if best.1 <= bound * bound {
                break;
            }
        }
        best
    }

    #[inline]
    fn offset_cell(&self, c: [usize; 3], d: [isize; 3]) -> Option<[usize; 3]> {
        let mut ans = [0; 3];
        for k in 0..3 {
            let v = c[k] as isize + d[k];
            if v < 0 || v >= self.dims[k] as isize {
                return None;
            }
            ans[k] = v as usize;
        }
        Some(ans)
    }
}

/// 欧氏距离平方.
#[inline]
pub(crate) fn dist2(a: &Point3, b: &Point3) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}
