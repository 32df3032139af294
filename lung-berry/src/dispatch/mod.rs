//! 批量分发.
//!
//! 遍历核对得到的工作队列: 下载源图像, 调用外部预测器, 上传结果,
//! 打上类别标签并从源图像复制其余标签.
//!
//! # 注意
//!
//! 1. 单个条目的失败 (预测, 下载, 上传, 写标签) 只会跳过该条目, 不会中断整批.
//! 2. 每次上传前都会强制重连, 以应对会话空闲超时.
//! 3. 分发器不会修改核对结果. 需要重新核对才能看到新上传的图像.

mod plan;

pub use plan::{BatchOutcome, BatchPlan, BatchReport, ItemFailure, Stage, Uploaded};

use crate::config::DispatchConfig;
use crate::consts::{PREDICTION_INFIX, ROI_SUFFIX};
use crate::error::{PredictionError, RemoteError};
use crate::reconcile::{ProjectState, WorkKind, WorkQueue};
use crate::record::{ImageId, ImageRecord, TagId};
use crate::remote::{Confirmation, Payload, RemoteStore, RoiPredictor, TumorPredictor};
use log::{error, info, warn};
use ndarray::{Array3, ArrayView3};

/// 去掉文件名的最后一个扩展名.
pub fn name_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

/// ROI 的上传文件名: `{stem}_roi.tif`.
pub fn roi_name(image_name: &str) -> String {
    format!("{}{ROI_SUFFIX}", name_stem(image_name))
}

/// 肿瘤预测的上传文件名: `{stem}_pred_nnunet_{model}.tif`.
pub fn prediction_name(image_name: &str, model: &str) -> String {
    format!("{}{PREDICTION_INFIX}{model}.tif", name_stem(image_name))
}

/// 预测器产出的待上传体数据.
enum Product {
    Scan(Array3<f32>),
    Mask(Array3<u8>),
}

impl Product {
    fn payload(&self) -> Payload<'_> {
        match self {
            Product::Scan(a) => Payload::Scan(a.view()),
            Product::Mask(a) => Payload::Mask(a.view()),
        }
    }
}

/// 单个条目的失败, 尚未附上图像 ID.
type StepError = (Stage, String);

/// 批量分发器. 持有仓库会话与显式配置.
pub struct Dispatcher<'a, S: RemoteStore + ?Sized> {
    store: &'a mut S,
    config: &'a DispatchConfig,
}

impl<'a, S: RemoteStore + ?Sized> Dispatcher<'a, S> {
    /// 构造分发器.
    pub fn new(store: &'a mut S, config: &'a DispatchConfig) -> Self {
        Self { store, config }
    }

    /// 为缺失 ROI 队列中的每张原始扫描计算并上传 ROI.
    ///
    /// ROI 打上 `config.roi_tag`, 并从源图像复制除 `config.roi_exclude` 之外的标签.
    ///
    /// # 返回值
    ///
    /// 只有开始时的连接失败会返回 `Err`. 其余失败记录在 [`BatchReport`] 中.
    pub fn batch_roi<P, C>(
        &mut self,
        state: &ProjectState,
        predictor: &mut P,
        confirmation: &mut C,
    ) -> Result<BatchOutcome, RemoteError>
    where
        P: RoiPredictor + ?Sized,
        C: Confirmation + ?Sized,
    {
        let tag = self.config.roi_tag;
        let exclude = self.config.roi_exclude.clone();
        self.run_batch(
            state.project().name.as_str(),
            queue_of(state, WorkKind::Roi),
            confirmation,
            tag,
            &exclude,
            |r| roi_name(&r.image_name),
            |image| {
                // 肺部掩膜只在完整流程中使用, 这里丢弃.
                let (roi, _lungs) = predictor.compute_roi(image)?;
                Ok(Product::Scan(roi))
            },
        )
    }

    /// 为缺失预测队列中的每个 ROI 计算并上传肿瘤预测.
    ///
    /// 预测打上 `config.prediction_tag`, 并从源 ROI 复制除
    /// `config.prediction_exclude` 之外的标签.
    ///
    /// # 返回值
    ///
    /// 同 [`Dispatcher::batch_roi`].
    pub fn batch_predictions<P, C>(
        &mut self,
        state: &ProjectState,
        predictor: &mut P,
        confirmation: &mut C,
    ) -> Result<BatchOutcome, RemoteError>
    where
        P: TumorPredictor + ?Sized,
        C: Confirmation + ?Sized,
    {
        let tag = self.config.prediction_tag;
        let exclude = self.config.prediction_exclude.clone();
        let model = predictor.model_name().to_string();
        self.run_batch(
            state.project().name.as_str(),
            queue_of(state, WorkKind::Prediction),
            confirmation,
            tag,
            &exclude,
            |r| prediction_name(&r.image_name, &model),
            |image| predictor.predict(image).map(Product::Mask),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run_batch<C, N, F>(
        &mut self,
        project_name: &str,
        queue: &WorkQueue,
        confirmation: &mut C,
        tag: TagId,
        exclude: &[String],
        mut name_of: N,
        mut produce: F,
    ) -> Result<BatchOutcome, RemoteError>
    where
        C: Confirmation + ?Sized,
        N: FnMut(&ImageRecord) -> String,
        F: FnMut(ArrayView3<'_, f32>) -> Result<Product, PredictionError>,
    {
        let kind = queue.kind();
        self.store.connect()?;
        if queue.is_empty() {
            info!("No {kind} to compute.");
            return Ok(BatchOutcome::NothingToDo);
        }

        let plan = BatchPlan {
            kind,
            project_name: project_name.to_string(),
            image_ids: queue.image_ids(),
        };
        if !confirmation.confirm(&plan) {
            info!("Batch of {} {kind} cancelled.", plan.len());
            return Ok(BatchOutcome::Declined(plan));
        }

        let n = queue.len();
        let mut report = BatchReport::new(kind);
        for (k, r) in queue.iter().enumerate() {
            info!("Computing {} / {n} {kind}. Image ID = {}", k + 1, r.image_id);
            let name = name_of(r);
            match self.process(r, &name, tag, exclude, &mut produce) {
                Ok(posted) => report.uploaded.push(Uploaded {
                    source: r.image_id,
                    posted,
                    name,
                }),
                Err((stage, reason)) => {
                    match stage {
                        Stage::Predict => warn!(
                            "An error occurred while computing {kind} for image ID={}: {reason}. Skipping...",
                            r.image_id
                        ),
                        _ => error!(
                            "Image ID={}: {stage} failed: {reason}. Skipping...",
                            r.image_id
                        ),
                    }
                    report.failures.push(ItemFailure {
                        image_id: r.image_id,
                        stage,
                        reason,
                    });
                }
            }
        }
        info!(
            "{kind}: {} uploaded, {} failed.",
            report.uploaded.len(),
            report.failures.len()
        );
        Ok(BatchOutcome::Completed(report))
    }

    /// 处理单个条目, 返回新图像 ID.
    fn process<F>(
        &mut self,
        r: &ImageRecord,
        name: &str,
        tag: TagId,
        exclude: &[String],
        produce: &mut F,
    ) -> Result<ImageId, StepError>
    where
        F: FnMut(ArrayView3<'_, f32>) -> Result<Product, PredictionError>,
    {
        let image = self
            .store
            .download(r.image_id)
            .map_err(|e| (Stage::Download, e.to_string()))?;
        let product = produce(image.view()).map_err(|e| (Stage::Predict, e.to_string()))?;

        self.store
            .connect()
            .map_err(|e| (Stage::Connect, e.to_string()))?;
        let posted = self
            .store
            .upload(product.payload(), r.dataset_id, name)
            .map_err(|e| (Stage::Upload, e.to_string()))?;
        self.store
            .tag(posted, tag)
            .and_then(|_| self.store.copy_tags(r.image_id, posted, exclude))
            .map_err(|e| (Stage::Tag, format!("{e} (posted image ID={posted})")))?;
        Ok(posted)
    }
}

/// 把 [`WorkKind`] 与 [`ProjectState`] 中对应的队列联系起来.
pub fn queue_of(state: &ProjectState, kind: WorkKind) -> &WorkQueue {
    match kind {
        WorkKind::Roi => state.roi_missing(),
        WorkKind::Prediction => state.prediction_missing(),
    }
}
