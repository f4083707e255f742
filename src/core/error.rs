//! 流水线致命错误
//!
//! 单个报告的问题只记录日志并跳过，只有这里列出的情况会中止运行。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// 报告根目录不存在或不是目录
    #[error("报告目录不存在或不可访问: {0}")]
    ReportRootMissing(PathBuf),

    /// 报告根目录存在但无法列出内容
    #[error("无法读取报告目录 {path}: {source}")]
    ReportRootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
