//! 影像仓库记录.
//!
//! 仓库中的每张图像对应一条不可变的扁平记录. 适配器产出 [`RawRecord`]
//! (时间字段仍是文本), 核对引擎将其解析为 [`ImageRecord`].

use crate::consts::class_name;
use crate::error::ReconcileError;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 仓库图像 ID.
pub type ImageId = u64;

/// 仓库数据集 ID.
pub type DatasetId = u64;

/// 仓库标签 ID.
pub type TagId = u64;

/// 图像类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ImageClass {
    /// 原始扫描.
    Image,

    /// 肺部 ROI 裁剪.
    Roi,

    /// 原始肿瘤预测.
    RawPred,

    /// 人工修正后的肿瘤预测.
    CorrectedPred,

    /// 无法可靠归类.
    Other,
}

impl ImageClass {
    /// 参与存在矩阵统计的类别, 按列顺序排列. 不包含 [`ImageClass::Other`].
    pub const TRACKED: [ImageClass; 4] = [
        ImageClass::Image,
        ImageClass::Roi,
        ImageClass::RawPred,
        ImageClass::CorrectedPred,
    ];

    /// 该类别在存在矩阵中的列号. `Other` 不参与统计, 返回 `None`.
    #[inline]
    pub const fn column(self) -> Option<usize> {
        match self {
            ImageClass::Image => Some(0),
            ImageClass::Roi => Some(1),
            ImageClass::RawPred => Some(2),
            ImageClass::CorrectedPred => Some(3),
            ImageClass::Other => None,
        }
    }

    /// 类别名称, 与仓库标签名一致.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            ImageClass::Image => class_name::IMAGE,
            ImageClass::Roi => class_name::ROI,
            ImageClass::RawPred => class_name::RAW_PRED,
            ImageClass::CorrectedPred => class_name::CORRECTED_PRED,
            ImageClass::Other => class_name::OTHER,
        }
    }

    /// 由名称解析类别. 无法识别的名称一律视为 [`ImageClass::Other`].
    pub fn from_name(name: &str) -> Self {
        match name {
            class_name::IMAGE => ImageClass::Image,
            class_name::ROI => ImageClass::Roi,
            class_name::RAW_PRED => ImageClass::RawPred,
            class_name::CORRECTED_PRED => ImageClass::CorrectedPred,
            _ => ImageClass::Other,
        }
    }

    /// 是否参与存在矩阵统计.
    #[inline]
    pub const fn is_tracked(self) -> bool {
        self.column().is_some()
    }
}

impl fmt::Display for ImageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 适配器产出的原始记录. 时间字段尚未解析.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawRecord {
    /// 数据集 ID.
    pub dataset_id: DatasetId,

    /// 数据集名称.
    pub dataset_name: String,

    /// 图像 ID.
    pub image_id: ImageId,

    /// 图像文件名.
    pub image_name: String,

    /// 个体名称.
    pub specimen: String,

    /// 扫描时间的文本形式. 应能解析为有限数值 (允许小数).
    pub time: String,

    /// 时间标签原文, 例如 `T02`.
    pub time_tag: String,

    /// 图像类别.
    pub class: ImageClass,
}

/// 解析后的不可变图像记录.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageRecord {
    /// 数据集 ID.
    pub dataset_id: DatasetId,

    /// 数据集名称.
    pub dataset_name: String,

    /// 图像 ID.
    pub image_id: ImageId,

    /// 图像文件名.
    pub image_name: String,

    /// 个体名称.
    pub specimen: String,

    /// 扫描时间. 保证有限.
    pub time: f64,

    /// 时间标签原文.
    pub time_tag: String,

    /// 图像类别.
    pub class: ImageClass,
}

impl ImageRecord {
    /// 解析原始记录. 时间字段不是有限数值时返回 `Err`.
    pub fn parse(raw: RawRecord) -> Result<Self, ReconcileError> {
        let time = match raw.time.trim().parse::<f64>() {
            Ok(t) if t.is_finite() => t,
            _ => {
                return Err(ReconcileError::MalformedRecord {
                    image_id: raw.image_id,
                    time: raw.time,
                })
            }
        };
        Ok(Self {
            dataset_id: raw.dataset_id,
            dataset_name: raw.dataset_name,
            image_id: raw.image_id,
            image_name: raw.image_name,
            specimen: raw.specimen,
            time,
            time_tag: raw.time_tag,
            class: raw.class,
        })
    }

    /// 该记录所属的 (个体, 时间) 组合.
    #[inline]
    pub fn key(&self) -> StudyKey {
        StudyKey::new(self.specimen.clone(), self.time)
    }

    /// 该记录是否属于 `key`. 不分配内存.
    #[inline]
    pub fn belongs_to(&self, key: &StudyKey) -> bool {
        self.specimen == key.specimen && OrderedFloat(self.time) == key.time
    }

    /// 按 (个体, 时间) 字典序比较, 相同组合内按图像 ID 排序.
    pub fn cmp_by_key(&self, other: &Self) -> Ordering {
        self.specimen
            .cmp(&other.specimen)
            .then_with(|| OrderedFloat(self.time).cmp(&OrderedFloat(other.time)))
            .then_with(|| self.image_id.cmp(&other.image_id))
    }
}

/// (个体, 时间) 组合. 按个体名称, 再按时间的字典序排序.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StudyKey {
    specimen: String,
    time: OrderedFloat<f64>,
}

impl StudyKey {
    /// 构造组合键.
    #[inline]
    pub fn new<S: Into<String>>(specimen: S, time: f64) -> Self {
        Self {
            specimen: specimen.into(),
            time: OrderedFloat(time),
        }
    }

    /// 个体名称.
    #[inline]
    pub fn specimen(&self) -> &str {
        &self.specimen
    }

    /// 扫描时间.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time.0
    }
}

impl fmt::Display for StudyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.specimen, self.time.0)
    }
}
