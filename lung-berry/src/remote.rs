//! 外部协作者的接口.
//!
//! 网络客户端, 检测/分割模型以及追踪算法都不在本 crate 中实现,
//! 这里只定义它们需要提供的能力.

use crate::config::TrackingParams;
use crate::dispatch::BatchPlan;
use crate::error::{PredictionError, RemoteError, TrackingError};
use crate::record::{DatasetId, ImageId, RawRecord, TagId};
use crate::Idx3d;
use ndarray::{Array3, Array4, ArrayView3, ArrayView4};
use std::io::{self, Write};

/// 仓库中的一个项目.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectInfo {
    /// 项目 ID.
    pub id: u64,

    /// 项目名称.
    pub name: String,
}

impl ProjectInfo {
    /// 构造项目描述.
    pub fn new<S: Into<String>>(id: u64, name: S) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// 记录摄取适配器.
pub trait RecordSource {
    /// 项目中的数据集个数, 仅用于进度报告.
    fn dataset_count(&mut self, project_id: u64) -> usize;

    /// 惰性地产出项目中每张图像的记录. 顺序任意.
    fn stream_records(&mut self, project_id: u64) -> Box<dyn Iterator<Item = RawRecord> + '_>;
}

/// 待上传的体数据.
#[derive(Clone, Copy, Debug)]
pub enum Payload<'a> {
    /// 灰度体数据, 例如 ROI 裁剪.
    Scan(ArrayView3<'a, f32>),

    /// 标签体数据, 例如肿瘤掩膜.
    Mask(ArrayView3<'a, u8>),
}

impl Payload<'_> {
    /// 体数据形状.
    pub fn dim(&self) -> Idx3d {
        match self {
            Payload::Scan(v) => v.dim(),
            Payload::Mask(v) => v.dim(),
        }
    }
}

/// 远程影像仓库. 所有操作都是阻塞的.
pub trait RemoteStore {
    /// (重新) 建立会话. 在每次上传前都会被强制调用, 以应对空闲超时.
    fn connect(&mut self) -> Result<(), RemoteError>;

    /// 下载图像.
    fn download(&mut self, image_id: ImageId) -> Result<Array3<f32>, RemoteError>;

    /// 上传体数据到数据集 `dataset_id`, 文件名为 `name`. 返回新图像 ID.
    fn upload(
        &mut self,
        payload: Payload<'_>,
        dataset_id: DatasetId,
        name: &str,
    ) -> Result<ImageId, RemoteError>;

    /// 给图像打标签.
    fn tag(&mut self, image_id: ImageId, tag_id: TagId) -> Result<(), RemoteError>;

    /// 把 `src` 的标签复制到 `dst`, 名称在 `exclude` 中的标签除外.
    fn copy_tags(&mut self, src: ImageId, dst: ImageId, exclude: &[String])
        -> Result<(), RemoteError>;
}

/// 肺部 ROI 检测器.
pub trait RoiPredictor {
    /// 计算 ROI 裁剪, 同时返回裁剪范围内的肺部掩膜.
    fn compute_roi(
        &mut self,
        image: ArrayView3<'_, f32>,
    ) -> Result<(Array3<f32>, Array3<u8>), PredictionError>;
}

/// 肿瘤分割模型.
pub trait TumorPredictor {
    /// 模型名称, 会出现在上传文件名中.
    fn model_name(&self) -> &str;

    /// 预测肿瘤掩膜.
    fn predict(&mut self, image: ArrayView3<'_, f32>) -> Result<Array3<u8>, PredictionError>;
}

/// 追踪算法的关联结果表. 内容由外部算法决定, 这里只负责保存.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkageTable {
    /// 列名.
    pub columns: Vec<String>,

    /// 行. 每行长度应与 `columns` 一致.
    pub rows: Vec<Vec<String>>,
}

impl LinkageTable {
    /// 以 CSV 格式写入 `w`.
    pub fn write_csv<W: Write>(&self, mut w: W) -> io::Result<()> {
        write_csv_line(&mut w, &self.columns)?;
        for row in self.rows.iter() {
            write_csv_line(&mut w, row)?;
        }
        Ok(())
    }
}

fn write_csv_line<W: Write, S: AsRef<str>>(w: &mut W, fields: &[S]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        let field = field.as_ref();
        if field.contains([',', '"', '\n']) {
            write!(w, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            w.write_all(field.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// 追踪结果.
#[derive(Clone, Debug)]
pub struct Tracked {
    /// 关联表.
    pub linkage: LinkageTable,

    /// 按关联结果重新编号后的肿瘤掩膜时间序列.
    pub corrected: Array4<u8>,
}

/// 外部肿瘤追踪/关联算法.
pub trait Tracker {
    /// 对已拼接的时间序列运行追踪.
    fn run_tracking(
        &mut self,
        tumors: ArrayView4<'_, u8>,
        rois: ArrayView4<'_, f32>,
        lungs: ArrayView4<'_, u8>,
        params: &TrackingParams,
    ) -> Result<Tracked, TrackingError>;
}

/// 不可逆上传之前的用户确认.
pub trait Confirmation {
    /// 返回 `false` 时整批取消, 不会执行任何上传.
    fn confirm(&mut self, plan: &BatchPlan) -> bool;
}

impl<F: FnMut(&BatchPlan) -> bool> Confirmation for F {
    #[inline]
    fn confirm(&mut self, plan: &BatchPlan) -> bool {
        self(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::LinkageTable;

    #[test]
    fn test_linkage_csv() {
        let t = LinkageTable {
            columns: vec!["tumor".into(), "t0".into(), "t1".into()],
            rows: vec![
                vec!["1".into(), "12.5".into(), "".into()],
                vec!["2".into(), "a,b".into(), "say \"hi\"".into()],
            ],
        };
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "tumor,t0,t1\n1,12.5,\n2,\"a,b\",\"say \"\"hi\"\"\"\n"
        );
    }
}
