//! 🫁欢迎光临🐭
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point3};

pub use crate::config::{DispatchConfig, TrackingParams};
pub use crate::error::{PipelineError, PredictionError, ReconcileError, RemoteError, TrackingError};
pub use crate::record::{DatasetId, ImageClass, ImageId, ImageRecord, RawRecord, StudyKey, TagId};

pub use crate::reconcile::{reconcile, AnomalyKind, ProjectState, ProjectSummary, WorkKind};
pub use crate::remote::{
    Confirmation, LinkageTable, Payload, ProjectInfo, RecordSource, RemoteStore, RoiPredictor,
    Tracked, Tracker, TumorPredictor,
};

pub use crate::dispatch::{queue_of, BatchOutcome, BatchPlan, BatchReport, Dispatcher};
pub use crate::pipeline::{CaseOutputs, CasePipeline};

pub use crate::register::{
    apply_transform, fit_affine_from_lung_masks, register_timeseries, AffineTransform,
    Interpolation, LandmarkMode, RegistrationParams,
};
pub use crate::timeseries::combine_images;
