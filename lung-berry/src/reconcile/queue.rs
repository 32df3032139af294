//! 工作队列与异常池.

use super::{AnomalyKind, PresenceMatrix};
use crate::record::{ImageClass, ImageId, ImageRecord, StudyKey};
use std::collections::BTreeSet;
use std::fmt;

/// 待完成工作的类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WorkKind {
    /// 缺少 ROI. 队列元素是 `image` 记录.
    Roi,

    /// 缺少肿瘤预测. 队列元素是 `roi` 记录.
    Prediction,
}

impl WorkKind {
    /// 队列元素的类别.
    #[inline]
    pub const fn source_class(self) -> ImageClass {
        match self {
            WorkKind::Roi => ImageClass::Image,
            WorkKind::Prediction => ImageClass::Roi,
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKind::Roi => f.write_str("ROIs"),
            WorkKind::Prediction => f.write_str("tumor predictions"),
        }
    }
}

/// 按 (个体, 时间) 字典序排列的工作队列.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkQueue {
    kind: WorkKind,
    items: Vec<ImageRecord>,
}

impl WorkQueue {
    /// 从工作集和对应的存在矩阵推导队列.
    ///
    /// 元素是工作集中类别为 `kind.source_class()`,
    /// 且所在行满足对应缺失条件的全部记录.
    pub(crate) fn derive(kind: WorkKind, working: &[ImageRecord], matrix: &PresenceMatrix) -> Self {
        let wanted = match kind {
            WorkKind::Roi => matrix.keys_where(|c| c.needs_roi()),
            WorkKind::Prediction => matrix.keys_where(|c| c.needs_prediction()),
        };
        Self {
            kind,
            items: select_sorted(working, kind.source_class(), &wanted),
        }
    }

    /// 队列类别.
    #[inline]
    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    /// 元素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 按顺序迭代元素.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ImageRecord> {
        self.items.iter()
    }

    /// 所有元素的图像 ID, 保持队列顺序.
    pub fn image_ids(&self) -> Vec<ImageId> {
        self.items.iter().map(|r| r.image_id).collect()
    }

    /// 队列是否包含某个组合.
    pub fn contains_key(&self, key: &StudyKey) -> bool {
        self.items.iter().any(|r| r.belongs_to(key))
    }
}

impl<'a> IntoIterator for &'a WorkQueue {
    type Item = &'a ImageRecord;
    type IntoIter = std::slice::Iter<'a, ImageRecord>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 从 `records` 中挑出类别为 `class` 且组合在 `keys` 中的记录, 按字典序排序.
pub(crate) fn select_sorted(
    records: &[ImageRecord],
    class: ImageClass,
    keys: &BTreeSet<StudyKey>,
) -> Vec<ImageRecord> {
    if keys.is_empty() {
        return vec![];
    }
    let mut ans: Vec<ImageRecord> = records
        .iter()
        .filter(|r| r.class == class && keys.contains(&r.key()))
        .cloned()
        .collect();
    ans.sort_by(ImageRecord::cmp_by_key);
    ans
}

/// 因违反 "恰好一张原始扫描" 而被移出工作集的记录. 只保留, 从不丢弃.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnomalyPool {
    missing_image: Vec<ImageRecord>,
    multiple_images: Vec<ImageRecord>,
}

impl AnomalyPool {
    /// 加入一批同类异常记录.
    pub(crate) fn extend<I: IntoIterator<Item = ImageRecord>>(&mut self, kind: AnomalyKind, it: I) {
        let pool = match kind {
            AnomalyKind::MissingImage => &mut self.missing_image,
            AnomalyKind::MultipleImages => &mut self.multiple_images,
        };
        pool.extend(it);
        pool.sort_by(ImageRecord::cmp_by_key);
    }

    /// 某类异常的全部记录, 按字典序排列.
    #[inline]
    pub fn records(&self, kind: AnomalyKind) -> &[ImageRecord] {
        match kind {
            AnomalyKind::MissingImage => &self.missing_image,
            AnomalyKind::MultipleImages => &self.multiple_images,
        }
    }

    /// 某类异常涉及的所有组合.
    pub fn keys(&self, kind: AnomalyKind) -> BTreeSet<StudyKey> {
        self.records(kind).iter().map(ImageRecord::key).collect()
    }

    /// 迭代全部异常记录及其类别.
    pub fn iter(&self) -> impl Iterator<Item = (AnomalyKind, &ImageRecord)> + '_ {
        AnomalyKind::ALL
            .into_iter()
            .flat_map(move |k| self.records(k).iter().map(move |r| (k, r)))
    }

    /// 异常记录总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.missing_image.len() + self.multiple_images.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 某组合是否在异常池中.
    pub fn contains_key(&self, key: &StudyKey) -> bool {
        self.iter().any(|(_, r)| r.belongs_to(key))
    }
}
