//! 报告扫描模块
//!
//! 负责递归扫描报告根目录，按路径字典序返回行为报告文件，
//! 并查找同目录下的附加报告。此模块只做IO操作，不做任何解析。

use crate::core::models::ArtifactPattern;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 一个待处理的行为报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    /// 完整路径
    pub path: PathBuf,
    /// 去掉后缀后的文件名主干
    pub stem: String,
    /// 直接父目录名
    pub directory: String,
}

impl ReportFile {
    /// 规范键 "<目录>/<主干>.md"
    pub fn canonical_key(&self) -> String {
        format!("{}/{}.md", self.directory, self.stem)
    }
}

/// 报告扫描器
pub struct ReportScanner {
    /// 扫描根路径
    root_path: PathBuf,
    /// 文件名后缀（不含扩展名）
    suffix: String,
    /// 允许的扩展名
    extensions: Vec<String>,
    /// 是否包含隐藏文件
    include_hidden: bool,
}

impl ReportScanner {
    /// 创建新的扫描器
    pub fn new(root_path: PathBuf, suffix: impl Into<String>) -> Self {
        Self {
            root_path,
            suffix: suffix.into(),
            extensions: vec!["json".to_string()],
            include_hidden: false,
        }
    }

    /// 设置允许的扩展名
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// 设置是否包含隐藏文件
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// 执行扫描，结果按完整路径排序
    pub fn scan(&self) -> Vec<ReportFile> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root_path).sort_by_file_name();
        for entry in walker.into_iter().filter_entry(|e| self.should_include(e)) {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if let Some(report) = self.create_report_file(entry.path()) {
                        files.push(report);
                    }
                }
                Err(e) => {
                    tracing::warn!("扫描报告时出错: {}", e);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("扫描完成，共发现 {} 个行为报告", files.len());
        files
    }

    /// 判断是否应该包含此条目
    fn should_include(&self, entry: &walkdir::DirEntry) -> bool {
        // 根目录必须允许遍历，否则 filter_entry 会直接阻止深入扫描
        if entry.path() == self.root_path {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        self.include_hidden || !name.starts_with('.')
    }

    /// 文件名形如 "<stem><suffix>.<ext>" 时生成报告描述
    fn create_report_file(&self, path: &Path) -> Option<ReportFile> {
        let extension = path.extension()?.to_string_lossy();
        if !self
            .extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&extension))
        {
            return None;
        }

        let file_stem = path.file_stem()?.to_string_lossy();
        let stem = file_stem.strip_suffix(self.suffix.as_str())?;
        if stem.is_empty() {
            return None;
        }

        let directory = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Some(ReportFile {
            path: path.to_path_buf(),
            stem: stem.to_string(),
            directory,
        })
    }
}

/// 读取报告旁边存在的附加报告，缺失的直接跳过
pub fn find_artifacts(report: &ReportFile, patterns: &[ArtifactPattern]) -> BTreeMap<String, String> {
    let mut artifacts = BTreeMap::new();
    let Some(dir) = report.path.parent() else {
        return artifacts;
    };

    for pattern in patterns {
        let path = dir.join(format!("{}{}", report.stem, pattern.suffix));
        if !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                artifacts.insert(pattern.key.clone(), content);
            }
            Err(e) => {
                tracing::warn!("读取附加报告失败 {}: {}", path.display(), e);
            }
        }
    }

    artifacts
}
