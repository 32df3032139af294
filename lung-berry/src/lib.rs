#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 管理存放在远程影像仓库中的纵向小鼠肺部 CT 研究,
//! 并提供时间序列拼接与基于肺部掩膜的配准算法.
//!
//! 对每个个体 (specimen) 的每个扫描时间点, 仓库中可能存在原始扫描 (image),
//! 肺部 ROI 裁剪 (roi), 模型原始肿瘤预测 (raw_pred) 以及人工修正后的预测
//! (corrected_pred). 本 crate 负责把仓库给出的无序记录流整理成一致的处理状态.
//!
//! # 注意
//!
//! 1. 网络客户端, 检测/分割模型以及肿瘤追踪算法均是外部协作者,
//!   本 crate 只通过 [`remote`] 中的 trait 与它们交互.
//! 2. 所有派生表都是一次性快照, 不做持久化. 仓库本身是唯一的真实来源.
//!
//! # 模块概览
//!
//! ### 记录核对 ✅
//!
//! 将记录流整理为 (个体, 时间) 存在矩阵, 剔除异常组合,
//! 推导出缺失 ROI 与缺失预测两条工作队列.
//!
//! 实现位于 `lung-berry/src/reconcile`.
//!
//! ### 批量分发 ✅
//!
//! 遍历工作队列, 调用外部预测器, 上传结果并传播标签. 单个条目失败不会中断整批.
//!
//! 实现位于 `lung-berry/src/dispatch`.
//!
//! ### 时间序列拼接 ✅
//!
//! 将形状各异的 3D 体数据居中放入同一个 4D 数组.
//!
//! 实现位于 `lung-berry/src/timeseries.rs`.
//!
//! ### 肺部配准 ✅
//!
//! 高斯平滑 -> 等值面顶点 -> ICP 拟合仿射变换 -> 重采样.
//! 所有时间点都对齐到第一个时间点.
//!
//! 实现位于 `lung-berry/src/register`.
//!
//! ### 单个体完整流程 ✅
//!
//! 下载, ROI, 预测, 拼接, 配准, 外部追踪, 落盘.
//!
//! 实现位于 `lung-berry/src/pipeline.rs`.

/// 三维体素索引 / 形状, 按 `(z, y, x)` 顺序.
pub type Idx3d = (usize, usize, usize);

/// 三维浮点坐标, 按 `(z, y, x)` 体素索引顺序存放.
pub type Point3 = [f64; 3];

pub mod consts;

pub mod config;
pub mod error;
pub mod record;

pub mod reconcile;
pub mod remote;

pub mod dispatch;

pub mod pipeline;
pub mod register;
pub mod timeseries;

pub mod prelude;

pub use config::{DispatchConfig, TrackingParams};
pub use error::{PipelineError, PredictionError, ReconcileError, RemoteError, TrackingError};
pub use record::{DatasetId, ImageClass, ImageId, ImageRecord, RawRecord, StudyKey, TagId};
pub use reconcile::{reconcile, ProjectState};
pub use remote::{ProjectInfo, RecordSource};
pub use timeseries::combine_images;
