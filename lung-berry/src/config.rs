//! 显式配置对象. 批量分发与追踪都只读取传入的配置, 不依赖任何全局状态.

use crate::consts::class_name;
use crate::record::TagId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 批量分发配置.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DispatchConfig {
    /// 新上传 ROI 打上的标签 ID.
    pub roi_tag: TagId,

    /// 新上传肿瘤预测打上的标签 ID.
    pub prediction_tag: TagId,

    /// 从源图像向 ROI 复制标签时要排除的标签名.
    #[cfg_attr(feature = "serde", serde(default = "default_roi_exclude"))]
    pub roi_exclude: Vec<String>,

    /// 从源 ROI 向肿瘤预测复制标签时要排除的标签名.
    #[cfg_attr(feature = "serde", serde(default = "default_prediction_exclude"))]
    pub prediction_exclude: Vec<String>,
}

fn default_roi_exclude() -> Vec<String> {
    vec![class_name::IMAGE.to_string()]
}

fn default_prediction_exclude() -> Vec<String> {
    vec![class_name::ROI.to_string()]
}

impl DispatchConfig {
    /// 使用给定的两个标签 ID 构造配置. ROI 不继承源图像的 `image` 标签,
    /// 肿瘤预测不继承源 ROI 的 `roi` 标签.
    pub fn new(roi_tag: TagId, prediction_tag: TagId) -> Self {
        Self {
            roi_tag,
            prediction_tag,
            roi_exclude: default_roi_exclude(),
            prediction_exclude: default_prediction_exclude(),
        }
    }
}

/// 传给外部追踪算法的参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackingParams {
    /// 追踪前是否先做肺部配准.
    pub with_registration: bool,

    /// 关联算法名称.
    pub method: String,

    /// 相邻时间点之间允许的最大关联距离 (像素).
    pub max_dist: f64,

    /// 距离项在关联代价中的权重比例.
    pub dist_weight_ratio: f64,

    /// 允许的最大相对体积差.
    pub max_volume_diff_rel: f64,

    /// 允许目标消失的时间点个数.
    pub memory: u32,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            with_registration: true,
            method: "laptrack".to_string(),
            max_dist: 30.0,
            dist_weight_ratio: 0.9,
            max_volume_diff_rel: 1.0,
            memory: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_defaults() {
        let c = DispatchConfig::new(11, 12);
        assert_eq!(c.roi_exclude, ["image"]);
        assert_eq!(c.prediction_exclude, ["roi"]);
    }

    #[test]
    fn test_tracking_defaults() {
        let p = TrackingParams::default();
        assert!(p.with_registration);
        assert_eq!(p.method, "laptrack");
        assert_eq!(p.memory, 0);
    }
}
