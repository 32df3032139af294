//! 单个体完整流程.
//!
//! 对一个个体的全部扫描时间点依次执行: 下载, ROI 检测, 拼接, 肿瘤预测, 拼接,
//! 肺部配准, 外部追踪, 落盘. 与批量分发不同, 任一步失败都会终止流程.
//!
//! 输出目录中的文件:
//!
//! - `SCAN{k:02}.npy`: 第 `k` 个时间点的原始扫描;
//! - `rois_timeseries.npy`, `lungs_timeseries.npy`, `tumor_timeseries.npy`: 拼接后的序列;
//! - `*_registered.npy`: 配准后的序列 (仅当追踪参数要求配准时);
//! - `tumor_timeseries_corrected.npy`: 追踪后重新编号的肿瘤序列;
//! - `{specimen}_results.csv`: 追踪关联表.

use crate::config::TrackingParams;
use crate::error::PipelineError;
use crate::reconcile::ProjectState;
use crate::register::{register_timeseries, AffineTransform, RegistrationParams};
use crate::remote::{LinkageTable, RemoteStore, RoiPredictor, Tracker, TumorPredictor};
use crate::timeseries::combine_images;
use log::info;
use ndarray::{Array3, Array4};
use ndarray_npy::{write_npy, WritableElement};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// 流程产出.
#[derive(Clone, Debug)]
pub struct CaseOutputs {
    /// 个体名称.
    pub specimen: String,

    /// 时间点个数.
    pub n_scans: usize,

    /// 每个时间点到第一个时间点的变换. 未配准时为空.
    pub transforms: Vec<AffineTransform>,

    /// 追踪关联表.
    pub linkage: LinkageTable,

    /// 写出的全部文件, 按写出顺序.
    pub files: Vec<PathBuf>,
}

/// 单个体完整流程. 持有仓库会话, 输出目录与参数.
pub struct CasePipeline<'a, S: RemoteStore + ?Sized> {
    store: &'a mut S,
    tracking: TrackingParams,
    registration: RegistrationParams,
    out_dir: PathBuf,
}

impl<'a, S: RemoteStore + ?Sized> CasePipeline<'a, S> {
    /// 构造流程. 配准参数使用默认值.
    pub fn new<P: Into<PathBuf>>(store: &'a mut S, tracking: TrackingParams, out_dir: P) -> Self {
        Self {
            store,
            tracking,
            registration: RegistrationParams::default(),
            out_dir: out_dir.into(),
        }
    }

    /// 替换配准参数.
    pub fn with_registration(mut self, registration: RegistrationParams) -> Self {
        self.registration = registration;
        self
    }

    /// 输出目录.
    #[inline]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// 对个体 `specimen` 执行完整流程.
    ///
    /// # 注意
    ///
    /// 1. 肿瘤预测作用于每个时间点的 ROI, 这样肿瘤序列与 ROI 序列处于同一坐标系.
    /// 2. 需要配准时由本流程完成配准, 交给追踪算法的参数中 `with_registration`
    ///   会被置为 `false`, 避免重复配准.
    pub fn run<R, T, K>(
        &mut self,
        state: &ProjectState,
        specimen: &str,
        roi_predictor: &mut R,
        tumor_predictor: &mut T,
        tracker: &mut K,
    ) -> Result<CaseOutputs, PipelineError>
    where
        R: RoiPredictor + ?Sized,
        T: TumorPredictor + ?Sized,
        K: Tracker + ?Sized,
    {
        let ids = state.image_timeseries_ids(specimen);
        if ids.is_empty() {
            return Err(PipelineError::UnknownSpecimen(specimen.to_string()));
        }
        fs::create_dir_all(&self.out_dir)?;
        let mut files = vec![];
        let n = ids.len();

        self.store.connect()?;
        let mut rois = Vec::with_capacity(n);
        let mut lungs = Vec::with_capacity(n);
        for (k, &image_id) in ids.iter().enumerate() {
            info!("{specimen}: downloading scan {} / {n} (image ID = {image_id})", k + 1);
            let image = self.store.download(image_id)?;
            files.push(self.save(&format!("SCAN{k:02}.npy"), &image)?);

            let (roi, lung) = roi_predictor
                .compute_roi(image.view())
                .map_err(|source| PipelineError::Prediction { image_id, source })?;
            rois.push(roi);
            lungs.push(lung);
        }

        let rois_ts = composite(specimen, &rois)?;
        let lungs_ts = composite(specimen, &lungs)?;
        files.push(self.save("rois_timeseries.npy", &rois_ts)?);
        files.push(self.save("lungs_timeseries.npy", &lungs_ts)?);

        let mut tumors = Vec::with_capacity(n);
        for (k, (roi, &image_id)) in rois.iter().zip(ids.iter()).enumerate() {
            info!("{specimen}: detecting tumors {} / {n}", k + 1);
            let mask = tumor_predictor
                .predict(roi.view())
                .map_err(|source| PipelineError::Prediction { image_id, source })?;
            tumors.push(mask);
        }
        let tumors_ts = composite(specimen, &tumors)?;
        files.push(self.save("tumor_timeseries.npy", &tumors_ts)?);

        let mut params = self.tracking.clone();
        let mut transforms = vec![];
        let (rois_ts, lungs_ts, tumors_ts) = if params.with_registration {
            info!("{specimen}: registering {n} timepoints on the lungs");
            let reg = register_timeseries(rois_ts.view(), lungs_ts.view(), &self.registration);
            let tumors_reg = reg.warp_labels(tumors_ts.view());
            files.push(self.save("rois_timeseries_registered.npy", &reg.images)?);
            files.push(self.save("lungs_timeseries_registered.npy", &reg.lungs)?);
            files.push(self.save("tumor_timeseries_registered.npy", &tumors_reg)?);
            params.with_registration = false;
            transforms = reg.transforms;
            (reg.images, reg.lungs, tumors_reg)
        } else {
            (rois_ts, lungs_ts, tumors_ts)
        };

        info!("{specimen}: tracking with `{}`", params.method);
        let tracked = tracker.run_tracking(
            tumors_ts.view(),
            rois_ts.view(),
            lungs_ts.view(),
            &params,
        )?;
        files.push(self.save("tumor_timeseries_corrected.npy", &tracked.corrected)?);

        let csv = self.out_dir.join(format!("{specimen}_results.csv"));
        tracked.linkage.write_csv(BufWriter::new(File::create(&csv)?))?;
        files.push(csv);
        info!("{specimen}: {} files written to {}", files.len(), self.out_dir.display());

        Ok(CaseOutputs {
            specimen: specimen.to_string(),
            n_scans: n,
            transforms,
            linkage: tracked.linkage,
            files,
        })
    }

    fn save<A, D>(&self, name: &str, array: &ndarray::Array<A, D>) -> Result<PathBuf, PipelineError>
    where
        A: WritableElement,
        D: ndarray::Dimension,
    {
        let path = self.out_dir.join(name);
        write_npy(&path, array)?;
        Ok(path)
    }
}

fn composite<A: Clone + num::Zero>(
    specimen: &str,
    volumes: &[Array3<A>],
) -> Result<Array4<A>, PipelineError> {
    combine_images(volumes).ok_or_else(|| PipelineError::UnknownSpecimen(specimen.to_string()))
}
