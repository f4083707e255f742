//! StoryCensus - 故事语料行为分析汇总工具
//!
//! 两个阶段：
//! - 汇总：扫描每个故事的行为报告，合并为一份数据集
//! - 报表：从数据集生成各类统计表和过滤列表
//!
//! 每个阶段只在成功时整体替换输出文件。

pub mod core;
pub mod storage;

use crate::core::aggregator::{Aggregator, MetadataIndex};
use crate::core::models::{AppConfig, Dataset};
use crate::core::report::ReportBuilder;
use crate::storage::config::ConfigManager;
use crate::storage::output::{write_bundle, write_json};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "storycensus")]
#[command(version, about = "故事语料行为分析汇总与报表生成")]
struct Cli {
    /// 配置文件路径（默认使用系统配置目录）
    #[arg(short, long, global = true, env = "STORYCENSUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 汇总行为报告为数据集
    Aggregate(AggregateArgs),
    /// 从数据集生成报表
    Report(ReportArgs),
    /// 依次执行汇总和报表
    Run {
        #[command(flatten)]
        aggregate: AggregateArgs,
        /// 报表输出目录
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// 配置文件管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct AggregateArgs {
    /// 行为报告根目录
    #[arg(long)]
    reports: Option<PathBuf>,
    /// 元数据索引文件
    #[arg(long)]
    metadata: Option<PathBuf>,
    /// 数据集输出文件
    #[arg(long)]
    output: Option<PathBuf>,
}

impl AggregateArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(reports) = self.reports {
            config.reports_dir = reports;
        }
        if let Some(metadata) = self.metadata {
            config.metadata_file = metadata;
        }
        if let Some(output) = self.output {
            config.analysis_file = output;
        }
    }
}

#[derive(Args)]
struct ReportArgs {
    /// 数据集文件
    #[arg(long)]
    analysis: Option<PathBuf>,
    /// 报表输出目录
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 写入默认配置
    Init {
        /// 覆盖已有配置
        #[arg(long)]
        force: bool,
    },
    /// 打印当前生效的配置
    Show,
}

/// 汇总阶段
fn aggregate(config: &AppConfig) -> Result<Dataset> {
    let index = MetadataIndex::load(&config.metadata_file);
    let aggregator = Aggregator::new(config);
    let dataset = aggregator.aggregate(&index)?;

    write_json(&config.analysis_file, &dataset)?;
    tracing::info!(
        "数据集已写入 {}（{} 个故事）",
        config.analysis_file.display(),
        dataset.metadata.total_stories
    );
    Ok(dataset)
}

/// 读取已有数据集
fn load_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取数据集: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("数据集格式错误: {}", path.display()))
}

/// 报表阶段
fn report(config: &AppConfig, dataset: &Dataset) -> Result<()> {
    let bundle = ReportBuilder::new(config).build(dataset);
    let written = write_bundle(&config.csv_dir, &bundle)?;
    tracing::info!(
        "已写入 {} 个报表文件到 {}",
        written.len(),
        config.csv_dir.display()
    );
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let manager = ConfigManager::new(cli.config.unwrap_or_else(ConfigManager::default_path));

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init { force } => {
                if manager.path().exists() && !force {
                    anyhow::bail!(
                        "配置文件已存在: {}（使用 --force 覆盖）",
                        manager.path().display()
                    );
                }
                manager.reset()?;
                tracing::info!("已写入默认配置: {}", manager.path().display());
            }
            ConfigAction::Show => {
                let config = manager.load()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Command::Aggregate(args) => {
            let mut config = manager.load()?;
            args.apply(&mut config);
            aggregate(&config)?;
        }
        Command::Report(args) => {
            let mut config = manager.load()?;
            if let Some(analysis) = args.analysis {
                config.analysis_file = analysis;
            }
            if let Some(out_dir) = args.out_dir {
                config.csv_dir = out_dir;
            }
            let dataset = load_dataset(&config.analysis_file)?;
            report(&config, &dataset)?;
        }
        Command::Run {
            aggregate: args,
            out_dir,
        } => {
            let mut config = manager.load()?;
            args.apply(&mut config);
            if let Some(out_dir) = out_dir {
                config.csv_dir = out_dir;
            }
            let dataset = aggregate(&config)?;
            report(&config, &dataset)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
