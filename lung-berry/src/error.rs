//! 运行时错误.

use crate::record::ImageId;
use thiserror::Error;

/// 记录核对错误. 一旦出现, 整个核对失败, 不会暴露任何中间状态.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// 时间字段无法解析为有限数值.
    #[error("image {image_id} has a malformed time value `{time}`")]
    MalformedRecord {
        /// 出错记录对应的仓库图像 ID.
        image_id: ImageId,

        /// 原始时间字段.
        time: String,
    },
}

/// 外部预测器 (ROI 检测或肿瘤分割) 的失败. 由分发器按条目捕获.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("prediction failed: {0}")]
pub struct PredictionError(pub String);

/// 远程仓库操作错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// 会话已断开 (通常是空闲超时). 需要在下一次远程操作前重连.
    #[error("connection to the image repository was lost")]
    ConnectionLost,

    /// 下载图像失败.
    #[error("failed to download image {0}")]
    Download(ImageId),

    /// 上传图像失败. 参数为待上传的文件名.
    #[error("failed to upload `{0}`")]
    Upload(String),

    /// 写标签失败.
    #[error("failed to write tags on image {0}")]
    Tag(ImageId),
}

/// 外部追踪算法的失败.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tracking failed: {0}")]
pub struct TrackingError(pub String);

/// 单个体完整流程的错误. 与批量分发不同, 该流程中任一步失败都会终止流程.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 该个体在工作集中没有任何扫描.
    #[error("specimen `{0}` has no scans in the working set")]
    UnknownSpecimen(String),

    /// 远程仓库错误.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// 某一时间点的预测失败.
    #[error("image {image_id}: {source}")]
    Prediction {
        /// 出错的源图像 ID.
        image_id: ImageId,

        /// 底层错误.
        source: PredictionError,
    },

    /// 追踪失败.
    #[error(transparent)]
    Tracking(#[from] TrackingError),

    /// 写出 `.npy` 文件失败.
    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
