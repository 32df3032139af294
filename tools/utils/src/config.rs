//! 工具配置文件 (TOML).
//!
//! ```toml
//! [project]
//! id = 3
//! name = "lungs"
//!
//! [dispatch]
//! roi_tag = 21
//! prediction_tag = 22
//!
//! [tracking]
//! max_dist = 30.0
//!
//! [registration]
//! mode = "similarity"
//! ```
//!
//! 除 `[project]` 外各节均可省略, 省略的字段取默认值.

use lung_berry::register::RegistrationParams;
use lung_berry::{DispatchConfig, ProjectInfo, TrackingParams};
use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置文件路径的环境变量.
pub const CONFIG_ENV: &str = "LUNG_BERRY_CONFIG";

/// 读取配置文件的错误.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 文件读取失败.
    #[error("cannot read config file `{path}`: {source}")]
    Io {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        source: io::Error,
    },

    /// TOML 解析失败.
    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// `[project]` 节.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ProjectSection {
    /// 项目 ID.
    pub id: u64,

    /// 项目名称.
    pub name: String,
}

impl From<ProjectSection> for ProjectInfo {
    fn from(p: ProjectSection) -> Self {
        ProjectInfo::new(p.id, p.name)
    }
}

/// 工具配置.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// 项目.
    pub project: ProjectSection,

    /// 批量分发配置. 只做核对时可以省略.
    pub dispatch: Option<DispatchConfig>,

    /// 追踪参数.
    #[serde(default)]
    pub tracking: TrackingParams,

    /// 配准参数.
    #[serde(default)]
    pub registration: RegistrationParams,
}

impl ToolConfig {
    /// 解析 TOML 文本.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// 读取并解析配置文件.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

/// 获取配置文件路径.
///
/// 1. 若环境变量 `$LUNG_BERRY_CONFIG` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/.config/lung-berry/config.toml`.
///
/// # 返回值
///
/// 两者都无法确定时返回 `None`.
pub fn config_path_from_env_or_home() -> Option<PathBuf> {
    match env::var(CONFIG_ENV) {
        Ok(p) if !p.is_empty() => Some(PathBuf::from(p)),
        _ => dirs::home_dir().map(|h| h.join(".config").join("lung-berry").join("config.toml")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lung_berry::register::LandmarkMode;

    #[test]
    fn test_minimal_config() {
        let c = ToolConfig::from_toml("[project]\nid = 3\nname = \"lungs\"\n").unwrap();
        assert_eq!(ProjectInfo::from(c.project), ProjectInfo::new(3, "lungs"));
        assert!(c.dispatch.is_none());
        assert_eq!(c.tracking, TrackingParams::default());
        assert_eq!(c.registration, RegistrationParams::default());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            [project]
            id = 7
            name = "mice"

            [dispatch]
            roi_tag = 21
            prediction_tag = 22

            [tracking]
            max_dist = 12.5
            with_registration = false

            [registration]
            mode = "affine"
            max_iterations = 10
        "#;
        let c = ToolConfig::from_toml(text).unwrap();
        let d = c.dispatch.unwrap();
        assert_eq!(d, DispatchConfig::new(21, 22));
        assert_eq!(c.tracking.max_dist, 12.5);
        assert!(!c.tracking.with_registration);
        assert_eq!(c.tracking.method, "laptrack");
        assert_eq!(c.registration.mode, LandmarkMode::Affine);
        assert_eq!(c.registration.max_iterations, 10);
        assert_eq!(c.registration.sigma, 1.0);
    }

    #[test]
    fn test_bad_config() {
        assert!(matches!(
            ToolConfig::from_toml("[project]\nid = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ToolConfig::load("/nonexistent/lung-berry.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
