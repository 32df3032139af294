//! 通用常量.

/// 仓库中的图像类别名称 (与仓库标签一致).
pub mod class_name {
    /// 原始扫描.
    pub const IMAGE: &str = "image";

    /// 肺部 ROI 裁剪.
    pub const ROI: &str = "roi";

    /// 模型给出的原始肿瘤预测.
    pub const RAW_PRED: &str = "raw_pred";

    /// 人工修正后的肿瘤预测.
    pub const CORRECTED_PRED: &str = "corrected_pred";

    /// 无法可靠归类的文件.
    pub const OTHER: &str = "other";
}

/// 配准相关默认参数.
pub mod registration {
    /// 肺部掩膜高斯平滑的标准差 (体素).
    pub const GAUSSIAN_SIGMA: f64 = 1.0;

    /// 高斯核在 `truncate * sigma` 处截断.
    pub const GAUSSIAN_TRUNCATE: f64 = 4.0;

    /// 提取等值面的阈值.
    pub const ISO_LEVEL: f64 = 0.5;

    /// ICP 每轮最多使用的源点 (landmark) 个数.
    pub const ICP_MAX_LANDMARKS: usize = 200;

    /// ICP 最大迭代次数.
    pub const ICP_MAX_ITERATIONS: usize = 100;

    /// 判断 ICP 单轮增量是否已是恒等变换的容差.
    pub const ICP_IDENTITY_TOLERANCE: f64 = 1e-10;
}

/// ROI 上传文件名后缀.
pub const ROI_SUFFIX: &str = "_roi.tif";

/// 肿瘤预测上传文件名中模型名之前的片段.
pub const PREDICTION_INFIX: &str = "_pred_nnunet_";
