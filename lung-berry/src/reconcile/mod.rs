//! 记录核对.
//!
//! 把无序的仓库记录流整理成一致的 (个体, 时间) 处理状态:
//!
//! 1. 将 `other` 类记录单独存放;
//! 2. 统计存在矩阵;
//! 3. 反复剔除 "没有原始扫描" 和 "多于一张原始扫描" 的组合并重新统计,
//!   直到所有组合都恰好有一张原始扫描;
//! 4. 推导缺失 ROI 队列, 缺失预测队列, 以及缺失人工修正的报告集合.

mod matrix;
mod queue;
mod summary;

pub use matrix::{AnomalyKind, ClassCounts, PresenceMatrix};
pub use queue::{AnomalyPool, WorkKind, WorkQueue};
pub use summary::ProjectSummary;

use crate::error::ReconcileError;
use crate::record::{DatasetId, ImageClass, ImageId, ImageRecord, RawRecord};
use crate::remote::{ProjectInfo, RecordSource};
use itertools::Itertools;
use log::{info, warn};
use ordered_float::OrderedFloat;

/// 从 `source` 读取项目 `project` 的全部记录并核对.
///
/// 会先向适配器询问数据集个数, 每当记录流中的数据集 ID 变化时记录一次进度.
pub fn reconcile<S: RecordSource + ?Sized>(
    source: &mut S,
    project: &ProjectInfo,
) -> Result<ProjectState, ReconcileError> {
    let total = source.dataset_count(project.id);
    let records = DatasetProgress::new(source.stream_records(project.id), total);
    ProjectState::from_records(project.clone(), records)
}

/// 在记录流上记录数据集扫描进度的适配器.
struct DatasetProgress<I> {
    inner: I,
    total: usize,
    seen: usize,
    current: Option<DatasetId>,
}

impl<I> DatasetProgress<I> {
    fn new(inner: I, total: usize) -> Self {
        Self {
            inner,
            total,
            seen: 0,
            current: None,
        }
    }
}

impl<I: Iterator<Item = RawRecord>> Iterator for DatasetProgress<I> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let r = self.inner.next()?;
        if self.current != Some(r.dataset_id) {
            self.current = Some(r.dataset_id);
            self.seen += 1;
            info!("Scanning project: {} / {} datasets", self.seen, self.total);
        }
        Some(r)
    }
}

/// 项目的核对结果. 一次性的只读快照, 仓库写入后需要重新核对才能看到变化.
///
/// # 保证
///
/// 1. 工作集中每个 (个体, 时间) 组合恰好有一条 `image` 记录.
/// 2. 工作集, 两类异常池三者互不相交, 其并集等于输入中全部非 `other` 记录.
/// 3. 两条工作队列与异常池不相交, 且按 (个体, 时间) 字典序排列.
#[derive(Clone, Debug)]
pub struct ProjectState {
    project: ProjectInfo,
    working: Vec<ImageRecord>,
    other: Vec<ImageRecord>,
    anomalies: AnomalyPool,
    matrix: PresenceMatrix,
    roi_missing: WorkQueue,
    prediction_missing: WorkQueue,
    correction_gaps: Vec<ImageRecord>,
}

impl ProjectState {
    /// 消费全部记录后构造核对结果.
    ///
    /// 任一记录的时间字段无法解析时返回 `Err`, 不产生任何部分状态.
    pub fn from_records<I: IntoIterator<Item = RawRecord>>(
        project: ProjectInfo,
        records: I,
    ) -> Result<Self, ReconcileError> {
        let parsed = records
            .into_iter()
            .map(ImageRecord::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_parsed(project, parsed))
    }

    fn from_parsed(project: ProjectInfo, records: Vec<ImageRecord>) -> Self {
        let (mut working, other): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.class.is_tracked());

        let mut anomalies = AnomalyPool::default();
        let mut matrix = PresenceMatrix::build(&working);

        // 每轮剔除一类异常. 剔除总是以整个组合为单位, 不会制造新的异常,
        // 因此至多 `AnomalyKind::ALL.len()` 轮即到达不动点.
        let mut rounds = 0;
        while let Some((kind, keys)) = AnomalyKind::ALL.into_iter().find_map(|kind| {
            let keys = matrix.violations(kind);
            (!keys.is_empty()).then_some((kind, keys))
        }) {
            rounds += 1;
            assert!(rounds <= AnomalyKind::ALL.len(), "异常剔除未收敛");

            let (flagged, kept): (Vec<_>, Vec<_>) = working
                .into_iter()
                .partition(|r| keys.contains(&r.key()));
            warn!(
                "{} specimen-time combinations violate the single-image rule ({kind:?}); {} records moved out of the working set",
                keys.len(),
                flagged.len()
            );
            working = kept;
            anomalies.extend(kind, flagged);
            matrix = PresenceMatrix::build(&working);
        }
        debug_assert!(matrix.is_consistent());

        working.sort_by(ImageRecord::cmp_by_key);

        let roi_missing = WorkQueue::derive(WorkKind::Roi, &working, &matrix);
        let prediction_missing = WorkQueue::derive(WorkKind::Prediction, &working, &matrix);
        let correction_gaps = queue::select_sorted(
            &working,
            ImageClass::RawPred,
            &matrix.keys_where(|c| c.lacks_correction()),
        );

        Self {
            project,
            working,
            other,
            anomalies,
            matrix,
            roi_missing,
            prediction_missing,
            correction_gaps,
        }
    }

    /// 项目信息.
    #[inline]
    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    /// 工作集, 按 (个体, 时间) 字典序排列.
    #[inline]
    pub fn working(&self) -> &[ImageRecord] {
        &self.working
    }

    /// 类别为 `other` 的记录.
    #[inline]
    pub fn other(&self) -> &[ImageRecord] {
        &self.other
    }

    /// 异常池.
    #[inline]
    pub fn anomalies(&self) -> &AnomalyPool {
        &self.anomalies
    }

    /// 所有被排除在工作集之外的记录 (`other` 类与异常池), 供审计.
    pub fn excluded(&self) -> impl Iterator<Item = &ImageRecord> + '_ {
        self.other
            .iter()
            .chain(self.anomalies.iter().map(|(_, r)| r))
    }

    /// 与工作集一致的存在矩阵.
    #[inline]
    pub fn matrix(&self) -> &PresenceMatrix {
        &self.matrix
    }

    /// 缺失 ROI 队列. 元素为 `image` 记录.
    #[inline]
    pub fn roi_missing(&self) -> &WorkQueue {
        &self.roi_missing
    }

    /// 缺失预测队列. 元素为 `roi` 记录.
    #[inline]
    pub fn prediction_missing(&self) -> &WorkQueue {
        &self.prediction_missing
    }

    /// 有原始预测但缺少人工修正的组合中的 `raw_pred` 记录. 仅供报告.
    #[inline]
    pub fn correction_gaps(&self) -> &[ImageRecord] {
        &self.correction_gaps
    }

    /// 工作集中所有个体名称, 有序且去重.
    pub fn cases(&self) -> Vec<&str> {
        self.working
            .iter()
            .map(|r| r.specimen.as_str())
            .dedup()
            .collect()
    }

    /// 工作集中所有扫描时间, 升序且去重.
    pub fn times(&self) -> Vec<f64> {
        self.working
            .iter()
            .map(|r| OrderedFloat(r.time))
            .sorted()
            .dedup()
            .map(|t| t.0)
            .collect()
    }

    /// 个体 `specimen` 的原始扫描图像 ID, 按时间升序排列.
    pub fn image_timeseries_ids(&self, specimen: &str) -> Vec<ImageId> {
        self.working
            .iter()
            .filter(|r| r.specimen == specimen && r.class == ImageClass::Image)
            .map(|r| r.image_id)
            .collect()
    }

    /// 生成项目报告.
    #[inline]
    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary::new(self)
    }
}
