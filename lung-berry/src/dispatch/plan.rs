//! 批量计划与执行报告.

use crate::reconcile::WorkKind;
use crate::record::ImageId;
use std::fmt;

/// 确认之前展示给用户的批量计划.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    /// 工作类别.
    pub kind: WorkKind,

    /// 结果将上传到的项目名称.
    pub project_name: String,

    /// 源图像 ID, 按处理顺序排列.
    pub image_ids: Vec<ImageId>,
}

impl BatchPlan {
    /// 条目个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.image_ids.len()
    }

    /// 是否为空. 分发器不会为空队列生成计划.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image_ids.is_empty()
    }
}

impl fmt::Display for BatchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Going to compute {} for these image IDs: {:?}",
            self.kind, self.image_ids
        )?;
        write!(
            f,
            "These {} will be uploaded to project `{}`.",
            self.kind, self.project_name
        )
    }
}

/// 单个条目失败的步骤.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    /// 下载源图像.
    Download,

    /// 调用预测器.
    Predict,

    /// 上传前重连.
    Connect,

    /// 上传结果.
    Upload,

    /// 打标签或复制标签. 此时图像已经上传.
    Tag,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Download => "download",
            Stage::Predict => "prediction",
            Stage::Connect => "reconnect",
            Stage::Upload => "upload",
            Stage::Tag => "tagging",
        })
    }
}

/// 成功上传的条目.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uploaded {
    /// 源图像 ID.
    pub source: ImageId,

    /// 新图像 ID.
    pub posted: ImageId,

    /// 新图像文件名.
    pub name: String,
}

/// 失败并被跳过的条目.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    /// 源图像 ID.
    pub image_id: ImageId,

    /// 失败的步骤.
    pub stage: Stage,

    /// 失败原因.
    pub reason: String,
}

/// 一批执行完毕后的报告.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// 工作类别.
    pub kind: WorkKind,

    /// 成功上传的条目, 按处理顺序.
    pub uploaded: Vec<Uploaded>,

    /// 被跳过的条目, 按处理顺序.
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub(super) fn new(kind: WorkKind) -> Self {
        Self {
            kind,
            uploaded: vec![],
            failures: vec![],
        }
    }

    /// 处理过的条目总数.
    #[inline]
    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failures.len()
    }
}

/// 一次批量分发的结果.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// 队列为空.
    NothingToDo,

    /// 用户拒绝, 没有执行任何上传.
    Declined(BatchPlan),

    /// 已执行.
    Completed(BatchReport),
}

impl BatchOutcome {
    /// 已执行时的报告.
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            BatchOutcome::Completed(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_display() {
        let plan = BatchPlan {
            kind: WorkKind::Prediction,
            project_name: "lungs".into(),
            image_ids: vec![4, 9],
        };
        assert_eq!(
            plan.to_string(),
            "Going to compute tumor predictions for these image IDs: [4, 9]\n\
             These tumor predictions will be uploaded to project `lungs`."
        );
        assert_eq!(plan.len(), 2);
    }
}
