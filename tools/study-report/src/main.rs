//! 读取仓库记录导出文件, 核对后打印项目摘要与工作队列.

use clap::Parser;
use log::info;
use lung_berry::prelude::*;
use std::error::Error;
use std::path::PathBuf;
use utils::config::{config_path_from_env_or_home, ToolConfig};
use utils::source::JsonlRecordSource;

/// 纵向肺部 CT 研究的记录核对报告.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON-lines 格式的记录导出文件.
    records: PathBuf,

    /// 项目 ID. 缺省时取配置文件中的值.
    #[arg(long)]
    project_id: Option<u64>,

    /// 项目名称. 缺省时取配置文件中的值.
    #[arg(long)]
    project_name: Option<String>,

    /// 配置文件. 缺省时依次查找 `$LUNG_BERRY_CONFIG`, `$HOME/.config/lung-berry/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// 同时打印工作队列.
    #[arg(long)]
    queues: bool,
}

impl Cli {
    /// 命令行参数优先, 其次是配置文件.
    fn project(&self) -> Result<ProjectInfo, Box<dyn Error>> {
        if let (Some(id), Some(name)) = (self.project_id, self.project_name.as_ref()) {
            return Ok(ProjectInfo::new(id, name.as_str()));
        }
        let path = match self.config.clone() {
            Some(p) => p,
            None => config_path_from_env_or_home().ok_or("cannot locate the config file")?,
        };
        info!("Loading config from {}", path.display());
        let mut project: ProjectInfo = ToolConfig::load(&path)?.project.into();
        if let Some(id) = self.project_id {
            project.id = id;
        }
        if let Some(name) = self.project_name.as_ref() {
            project.name = name.clone();
        }
        Ok(project)
    }
}

fn print_queue(queue: &lung_berry::reconcile::WorkQueue) {
    println!("{} missing: {}", queue.kind(), queue.len());
    for r in queue {
        println!("    {} (ID={}) [{}, {}]", r.image_name, r.image_id, r.specimen, r.time);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    utils::init_logger()?;
    let cli = Cli::parse();
    let project = cli.project()?;

    let mut source = JsonlRecordSource::open(&cli.records)?;
    info!("{} records loaded from {}", source.len(), cli.records.display());
    let state = reconcile(&mut source, &project)?;

    utils::sep();
    println!("{}", state.summary());
    if cli.queues {
        utils::sep();
        for kind in [WorkKind::Roi, WorkKind::Prediction] {
            print_queue(queue_of(&state, kind));
        }
        let gaps = state.correction_gaps();
        println!("corrected predictions missing: {}", gaps.len());
        for r in gaps {
            println!("    {} (ID={}) [{}, {}]", r.image_name, r.image_id, r.specimen, r.time);
        }
    }
    utils::sep();
    Ok(())
}
