//! 从 JSON-lines 导出文件读取仓库记录.
//!
//! 每行一个对象:
//!
//! ```json
//! {"dataset_id": 1, "dataset_name": "A", "image_id": 10, "image_name": "M1_0_image.tif",
//!  "specimen": "M1", "time": 0, "time_tag": "T00", "class": "image"}
//! ```
//!
//! `time` 可以是数值或字符串, 原样交给核对引擎解析. 未知的 `class` 视为 `other`.
//! 空行被忽略.

use lung_berry::{DatasetId, ImageClass, ImageId, RawRecord, RecordSource};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 读取导出文件的错误.
#[derive(Debug, Error)]
pub enum SourceError {
    /// 文件读取失败.
    #[error("cannot read `{path}`: {source}")]
    Io {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        source: io::Error,
    },

    /// 某一行不是合法记录.
    #[error("line {line}: {source}")]
    Json {
        /// 行号, 从 1 开始.
        line: usize,

        /// 底层错误.
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Line {
    dataset_id: DatasetId,
    #[serde(default)]
    dataset_name: String,
    image_id: ImageId,
    #[serde(default)]
    image_name: String,
    specimen: String,
    time: Value,
    #[serde(default)]
    time_tag: String,
    class: String,
}

impl From<Line> for RawRecord {
    fn from(l: Line) -> Self {
        let time = match l.time {
            Value::String(s) => s,
            other => other.to_string(),
        };
        RawRecord {
            dataset_id: l.dataset_id,
            dataset_name: l.dataset_name,
            image_id: l.image_id,
            image_name: l.image_name,
            specimen: l.specimen,
            time,
            time_tag: l.time_tag,
            class: ImageClass::from_name(&l.class),
        }
    }
}

/// 已载入内存的单项目导出文件.
#[derive(Clone, Debug, Default)]
pub struct JsonlRecordSource {
    records: Vec<RawRecord>,
}

impl JsonlRecordSource {
    /// 解析任意 reader 中的全部记录.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, SourceError> {
        let mut records = vec![];
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| SourceError::Io {
                path: PathBuf::new(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: Line = serde_json::from_str(&line)
                .map_err(|source| SourceError::Json { line: i + 1, source })?;
            records.push(parsed.into());
        }
        Ok(Self { records })
    }

    /// 读取导出文件.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let io_err = |source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            SourceError::Io { source, .. } => io_err(source),
            e => e,
        })
    }

    /// 记录条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否没有任何记录.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for JsonlRecordSource {
    fn dataset_count(&mut self, _project_id: u64) -> usize {
        let mut ids: Vec<_> = self.records.iter().map(|r| r.dataset_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    fn stream_records(&mut self, _project_id: u64) -> Box<dyn Iterator<Item = RawRecord> + '_> {
        Box::new(self.records.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lung_berry::{reconcile, ProjectInfo};

    const EXPORT: &str = r#"
{"dataset_id": 1, "dataset_name": "A", "image_id": 10, "image_name": "M1_0.tif", "specimen": "M1", "time": 0, "time_tag": "T00", "class": "image"}
{"dataset_id": 1, "dataset_name": "A", "image_id": 11, "image_name": "M1_0_roi.tif", "specimen": "M1", "time": "0", "time_tag": "T00", "class": "roi"}
{"dataset_id": 2, "dataset_name": "B", "image_id": 12, "image_name": "M1_1.5.tif", "specimen": "M1", "time": 1.5, "time_tag": "T01", "class": "image"}

{"dataset_id": 2, "dataset_name": "B", "image_id": 13, "image_name": "notes.txt", "specimen": "M1", "time": 1.5, "class": "thumbnail"}
"#;

    #[test]
    fn test_parse_export() {
        let mut src = JsonlRecordSource::from_reader(EXPORT.as_bytes()).unwrap();
        assert_eq!(src.len(), 4);
        assert_eq!(src.dataset_count(1), 2);

        let records: Vec<_> = src.stream_records(1).collect();
        assert_eq!(records[0].time, "0");
        assert_eq!(records[2].time, "1.5");
        assert_eq!(records[1].class, ImageClass::Roi);
        assert_eq!(records[3].class, ImageClass::Other);
        assert_eq!(records[3].time_tag, "");
    }

    #[test]
    fn test_reconcile_export() {
        let mut src = JsonlRecordSource::from_reader(EXPORT.as_bytes()).unwrap();
        let state = reconcile(&mut src, &ProjectInfo::new(1, "lungs")).unwrap();
        assert_eq!(state.cases(), ["M1"]);
        assert_eq!(state.times(), [0.0, 1.5]);
        assert_eq!(state.roi_missing().image_ids(), [12]);
        assert_eq!(state.other().len(), 1);
    }

    #[test]
    fn test_bad_line() {
        let text = "{\"dataset_id\": 1}\n";
        let err = JsonlRecordSource::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(err, SourceError::Json { line: 1, .. }));
        assert!(matches!(
            JsonlRecordSource::open("/nonexistent/export.jsonl"),
            Err(SourceError::Io { .. })
        ));
    }
}
