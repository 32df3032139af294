//! 项目报告.

use super::{AnomalyKind, ProjectState};
use crate::record::{ImageClass, ImageId, StudyKey};
use std::fmt;

/// 项目核对结果的摘要.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectSummary {
    /// 项目名称.
    pub project_name: String,

    /// 项目 ID.
    pub project_id: u64,

    /// 工作集中的个体数.
    pub n_cases: usize,

    /// 工作集中出现的扫描时间, 升序.
    pub times: Vec<f64>,

    /// 缺少人工修正的原始预测图像 ID.
    pub correction_missing: Vec<ImageId>,

    /// `other` 类记录数.
    pub n_other: usize,

    /// 含多张原始扫描而被剔除的组合, 以及其中的原始扫描图像 ID.
    pub multiple_images: Vec<(StudyKey, Vec<ImageId>)>,

    /// 没有原始扫描而被剔除的组合.
    pub missing_image: Vec<StudyKey>,
}

impl ProjectSummary {
    pub(super) fn new(state: &ProjectState) -> Self {
        let anomalies = state.anomalies();
        let multiple_images = anomalies
            .keys(AnomalyKind::MultipleImages)
            .into_iter()
            .map(|key| {
                let ids = anomalies
                    .records(AnomalyKind::MultipleImages)
                    .iter()
                    .filter(|r| r.class == ImageClass::Image && r.belongs_to(&key))
                    .map(|r| r.image_id)
                    .collect();
                (key, ids)
            })
            .collect();

        Self {
            project_name: state.project().name.clone(),
            project_id: state.project().id,
            n_cases: state.cases().len(),
            times: state.times(),
            correction_missing: state.correction_gaps().iter().map(|r| r.image_id).collect(),
            n_other: state.other().len(),
            multiple_images,
            missing_image: anomalies
                .keys(AnomalyKind::MissingImage)
                .into_iter()
                .collect(),
        }
    }

    /// 是否没有任何警告.
    pub fn is_clean(&self) -> bool {
        self.correction_missing.is_empty()
            && self.n_other == 0
            && self.multiple_images.is_empty()
            && self.missing_image.is_empty()
    }
}

impl fmt::Display for ProjectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### Project summary - {} (ID={}) ###",
            self.project_name, self.project_id
        )?;
        writeln!(f, "Number of cases: {}", self.n_cases)?;
        writeln!(f, "Scan times: {} ({:?})", self.times.len(), self.times)?;
        writeln!(f, "Warnings:")?;
        if !self.correction_missing.is_empty() {
            writeln!(
                f,
                "- Corrected masks missing ({}) for these image IDs: {:?}",
                self.correction_missing.len(),
                self.correction_missing
            )?;
        }
        if self.n_other > 0 {
            writeln!(
                f,
                "- {} files could not be reliably tagged in {:?} and were added to the `Other files` list.",
                self.n_other,
                ImageClass::TRACKED.map(ImageClass::name)
            )?;
        }
        if !self.multiple_images.is_empty() {
            writeln!(
                f,
                "- {} specimen-time combinations have multiple associated `image` files and were skipped:",
                self.multiple_images.len()
            )?;
            for (key, ids) in self.multiple_images.iter() {
                writeln!(f, "    {key}: {ids:?}")?;
            }
        }
        if !self.missing_image.is_empty() {
            writeln!(
                f,
                "- {} specimen-time combinations have no associated `image` file and were skipped:",
                self.missing_image.len()
            )?;
            for key in self.missing_image.iter() {
                writeln!(f, "    {key}")?;
            }
        }
        Ok(())
    }
}
