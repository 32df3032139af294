//! (个体, 时间) 存在矩阵.

use crate::record::{ImageClass, ImageRecord, StudyKey};
use std::collections::{BTreeMap, BTreeSet};

/// 某个 (个体, 时间) 组合下各类别的记录个数. 列顺序见 [`ImageClass::TRACKED`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ClassCounts([usize; 4]);

impl ClassCounts {
    /// 由四列计数直接构造.
    #[inline]
    pub const fn new(image: usize, roi: usize, raw_pred: usize, corrected_pred: usize) -> Self {
        Self([image, roi, raw_pred, corrected_pred])
    }

    /// 获取某类别的计数. `Other` 恒为 0.
    #[inline]
    pub fn get(&self, class: ImageClass) -> usize {
        class.column().map_or(0, |c| self.0[c])
    }

    /// 计入一条记录. `Other` 被忽略.
    #[inline]
    fn add(&mut self, class: ImageClass) {
        if let Some(c) = class.column() {
            self.0[c] += 1;
        }
    }

    /// 原始扫描个数.
    #[inline]
    pub fn images(&self) -> usize {
        self.0[0]
    }

    /// ROI 个数.
    #[inline]
    pub fn rois(&self) -> usize {
        self.0[1]
    }

    /// 原始预测个数.
    #[inline]
    pub fn raw_preds(&self) -> usize {
        self.0[2]
    }

    /// 修正预测个数.
    #[inline]
    pub fn corrected_preds(&self) -> usize {
        self.0[3]
    }

    /// 所有类别的记录总数.
    #[inline]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// 有扫描但没有 ROI.
    #[inline]
    pub fn needs_roi(&self) -> bool {
        self.images() > 0 && self.rois() == 0
    }

    /// 有 ROI 但既没有原始预测也没有修正预测.
    /// 仅存在修正预测时视为已满足.
    #[inline]
    pub fn needs_prediction(&self) -> bool {
        self.rois() > 0 && self.raw_preds() == 0 && self.corrected_preds() == 0
    }

    /// 有原始预测但没有修正预测. 需要人工处理, 仅用于报告.
    #[inline]
    pub fn lacks_correction(&self) -> bool {
        self.raw_preds() > 0 && self.corrected_preds() == 0
    }

    /// 该组合违反的 "恰好一张原始扫描" 不变量, 若有.
    #[inline]
    pub fn anomaly(&self) -> Option<AnomalyKind> {
        match self.images() {
            0 => Some(AnomalyKind::MissingImage),
            1 => None,
            _ => Some(AnomalyKind::MultipleImages),
        }
    }
}

/// 违反 "每个 (个体, 时间) 组合恰好一张原始扫描" 的方式.
///
/// 这是一种分类结果而不是错误: 对应组合的全部记录会被移入异常池.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AnomalyKind {
    /// 没有原始扫描.
    MissingImage,

    /// 多于一张原始扫描.
    MultipleImages,
}

impl AnomalyKind {
    /// 所有异常类别, 按检测顺序排列.
    pub const ALL: [AnomalyKind; 2] = [AnomalyKind::MissingImage, AnomalyKind::MultipleImages];
}

/// 以 (个体, 时间) 为键, 各类别计数为值的有序表. 迭代顺序即字典序.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresenceMatrix {
    rows: BTreeMap<StudyKey, ClassCounts>,
}

impl PresenceMatrix {
    /// 单遍扫描 `records` 构造矩阵. `Other` 类记录不计入, 也不会产生行.
    pub fn build<'a, I: IntoIterator<Item = &'a ImageRecord>>(records: I) -> Self {
        let mut rows: BTreeMap<StudyKey, ClassCounts> = BTreeMap::new();
        for r in records.into_iter().filter(|r| r.class.is_tracked()) {
            rows.entry(r.key()).or_default().add(r.class);
        }
        Self { rows }
    }

    /// 行数, 即不同 (个体, 时间) 组合的个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 获取某一行.
    #[inline]
    pub fn get(&self, key: &StudyKey) -> Option<&ClassCounts> {
        self.rows.get(key)
    }

    /// 按字典序迭代所有行.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&StudyKey, &ClassCounts)> + '_ {
        self.rows.iter()
    }

    /// 收集满足谓词 `pred` 的所有组合.
    pub fn keys_where<F: Fn(&ClassCounts) -> bool>(&self, pred: F) -> BTreeSet<StudyKey> {
        self.rows
            .iter()
            .filter_map(|(k, c)| pred(c).then(|| k.clone()))
            .collect()
    }

    /// 收集违反不变量且方式为 `kind` 的所有组合.
    #[inline]
    pub fn violations(&self, kind: AnomalyKind) -> BTreeSet<StudyKey> {
        self.keys_where(|c| c.anomaly() == Some(kind))
    }

    /// 所有行是否都恰好有一张原始扫描.
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.rows.values().all(|c| c.anomaly().is_none())
    }

    /// 所有行的记录总数.
    #[inline]
    pub fn total(&self) -> usize {
        self.rows.values().map(ClassCounts::total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::raw;
    use ImageClass::*;

    fn build(rows: &[(&str, &str, ImageClass)]) -> (Vec<ImageRecord>, PresenceMatrix) {
        let records: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, (s, t, c))| ImageRecord::parse(raw(i as u64, s, t, *c)).unwrap())
            .collect();
        let matrix = PresenceMatrix::build(&records);
        (records, matrix)
    }

    #[test]
    fn test_counts() {
        let (records, m) = build(&[
            ("S1", "0", Image),
            ("S1", "0", Roi),
            ("S1", "0", Other),
            ("S1", "1", Image),
            ("S1", "1", RawPred),
            ("S2", "0", CorrectedPred),
        ]);
        assert_eq!(m.len(), 3);
        assert_eq!(m.get(&StudyKey::new("S1", 0.0)), Some(&ClassCounts::new(1, 1, 0, 0)));
        assert_eq!(m.get(&StudyKey::new("S1", 1.0)), Some(&ClassCounts::new(1, 0, 1, 0)));
        assert_eq!(m.get(&StudyKey::new("S2", 0.0)), Some(&ClassCounts::new(0, 0, 0, 1)));

        // 每行计数之和等于该组合下非 other 记录数.
        let tracked = records.iter().filter(|r| r.class.is_tracked()).count();
        assert_eq!(m.total(), tracked);
        assert!(!m.is_consistent());
    }

    #[test]
    fn test_anomaly_kinds() {
        assert_eq!(ClassCounts::new(0, 1, 0, 0).anomaly(), Some(AnomalyKind::MissingImage));
        assert_eq!(ClassCounts::new(1, 1, 0, 0).anomaly(), None);
        assert_eq!(ClassCounts::new(3, 0, 0, 0).anomaly(), Some(AnomalyKind::MultipleImages));
    }

    #[test]
    fn test_work_predicates() {
        assert!(ClassCounts::new(1, 0, 0, 0).needs_roi());
        assert!(!ClassCounts::new(1, 1, 0, 0).needs_roi());

        assert!(ClassCounts::new(1, 1, 0, 0).needs_prediction());
        assert!(!ClassCounts::new(1, 1, 1, 0).needs_prediction());
        // 仅有修正预测也算满足.
        assert!(!ClassCounts::new(1, 1, 0, 1).needs_prediction());

        assert!(ClassCounts::new(1, 1, 2, 0).lacks_correction());
        assert!(!ClassCounts::new(1, 1, 1, 1).lacks_correction());
    }

    #[test]
    fn test_rows_sorted() {
        let (_, m) = build(&[
            ("S2", "0", Image),
            ("S1", "10", Image),
            ("S1", "2", Image),
        ]);
        let keys: Vec<_> = m.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            [
                StudyKey::new("S1", 2.0),
                StudyKey::new("S1", 10.0),
                StudyKey::new("S2", 0.0)
            ]
        );
    }
}
