//! 聚合模块
//!
//! 遍历报告目录，把每份行为报告提取、归一化为 [`Record`]，
//! 按文件路径字典序组装成 [`Dataset`]，同时累计全语料统计。
//! 单个报告失败只跳过并记录日志，不影响整体运行。

use crate::core::categorizer::Categorizer;
use crate::core::error::PipelineError;
use crate::core::extractor::Extractor;
use crate::core::models::{
    AggregateStats, AppConfig, ArtifactPattern, Dataset, MetadataEntry, Record, RunMetadata,
    StoryReport, SummaryReport, Taxonomy, Tally,
};
use crate::core::scanner::{find_artifacts, ReportFile, ReportScanner};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::path::Path;

/// 自报汇总中正面描写的失调行为计数键
const BACKFIRE_KEY: &str = "positive_portrayal_of_misaligned";

/// 自报汇总中的行为总数键
const TOTAL_BEHAVIORS_KEY: &str = "total_behaviors";

/// 元数据索引（规范键 -> 元数据）
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    entries: BTreeMap<String, MetadataEntry>,
}

impl MetadataIndex {
    pub fn from_entries(entries: Vec<MetadataEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.file.clone(), e)).collect(),
        }
    }

    /// 加载索引；文件缺失或格式错误时退化为空索引
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("未找到元数据索引 {}，类型回退为 Unknown", path.display());
            return Self::default();
        }

        match read_entries(path) {
            Ok(entries) => {
                let index = Self::from_entries(entries);
                tracing::info!("已加载 {} 条故事元数据", index.len());
                index
            }
            Err(e) => {
                tracing::warn!("元数据索引 {} 无法解析，忽略: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 非对象条目直接丢弃
fn read_entries(path: &Path) -> anyhow::Result<Vec<MetadataEntry>> {
    let content = std::fs::read_to_string(path)?;
    let items: Vec<serde_json::Value> = serde_json::from_str(&content)?;
    Ok(items
        .into_iter()
        .filter(serde_json::Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn lowered(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_lowercase()).collect()
}

/// 全语料统计累加器
struct StatsAccumulator<'a> {
    taxonomy: &'a Taxonomy,
    stats: AggregateStats,
}

impl<'a> StatsAccumulator<'a> {
    fn new(categorizer: &'a Categorizer) -> Self {
        let taxonomy = categorizer.taxonomy();

        Self {
            taxonomy,
            stats: AggregateStats {
                by_category: categorizer.nine_grid().zeroed(),
                by_portrayal: Tally::zeroed(lowered(&taxonomy.portrayal.terms())),
                backfire_risk: 0,
                by_assessment: Tally::zeroed(lowered(&taxonomy.outcomes.terms())),
            },
        }
    }

    fn merge(&mut self, record: &Record) {
        // 9 类统计信任自报汇总
        for (key, count) in record.summary.categories.iter() {
            self.stats.by_category.add(key, count);
        }

        // 描写统计从行为重新计算（大小写折叠）
        for behavior in &record.behaviors {
            if let Some(key) = self.taxonomy.portrayal.fold(&behavior.portrayal) {
                self.stats.by_portrayal.increment(&key);
            }
        }

        self.stats.backfire_risk += record.summary.positive_portrayal_of_misaligned;

        if let Some(level) = &record.project_assessment.success_level {
            self.stats.by_assessment.increment(&level.to_lowercase());
        }
    }

    fn finish(self) -> AggregateStats {
        self.stats
    }
}

/// 报告聚合器
pub struct Aggregator {
    scanner: ReportScanner,
    extractor: Extractor,
    categorizer: Categorizer,
    artifacts: Vec<ArtifactPattern>,
    corpus_source: String,
    date_format: String,
}

impl Aggregator {
    /// 根据配置创建聚合器
    pub fn new(config: &AppConfig) -> Self {
        let scanner = ReportScanner::new(config.reports_dir.clone(), config.report_suffix.clone())
            .extensions(config.report_extensions.clone())
            .include_hidden(config.include_hidden);

        Self {
            scanner,
            extractor: Extractor::new(),
            categorizer: Categorizer::new(config.taxonomy.clone()),
            artifacts: config.artifacts.clone(),
            corpus_source: config.corpus_source.clone(),
            date_format: config.date_format.clone(),
        }
    }

    /// 聚合全部报告，生成日期取当前本地时间
    pub fn aggregate(&self, index: &MetadataIndex) -> Result<Dataset, PipelineError> {
        self.aggregate_at(index, Local::now())
    }

    /// 聚合全部报告
    pub fn aggregate_at(
        &self,
        index: &MetadataIndex,
        now: DateTime<Local>,
    ) -> Result<Dataset, PipelineError> {
        let root = self.scanner.root_path();
        if !root.is_dir() {
            return Err(PipelineError::ReportRootMissing(root.to_path_buf()));
        }
        // 根目录必须能列出内容，否则整次运行中止
        std::fs::read_dir(root).map_err(|source| PipelineError::ReportRootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let files = self.scanner.scan();
        let mut stories = Vec::with_capacity(files.len());
        let mut accumulator = StatsAccumulator::new(&self.categorizer);
        let mut skipped = 0usize;

        for file in &files {
            tracing::debug!("处理 {}", file.path.display());

            let Some(report) = self.load_report(file) else {
                skipped += 1;
                continue;
            };

            let record = self.build_record(file, report, index);
            accumulator.merge(&record);
            stories.push(record);
        }

        let aggregate_stats = accumulator.finish();
        let metadata = RunMetadata {
            total_stories: stories.len(),
            total_behaviors: aggregate_stats.by_category.total(),
            generated_date: self.format_date(now),
            corpus_source: self.corpus_source.clone(),
        };

        tracing::info!(
            "聚合完成: {} 个故事, {} 个行为, 跳过 {} 个报告, 背火风险行为 {}",
            metadata.total_stories,
            metadata.total_behaviors,
            skipped,
            aggregate_stats.backfire_risk
        );

        Ok(Dataset::new(metadata, aggregate_stats, stories))
    }

    /// 读取并提取单个报告，失败时记录日志并返回 None
    fn load_report(&self, file: &ReportFile) -> Option<StoryReport> {
        let content = match std::fs::read_to_string(&file.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("读取 {} 失败，跳过: {}", file.path.display(), e);
                return None;
            }
        };

        let Some(extracted) = self.extractor.extract(&content) else {
            tracing::warn!("无法从 {} 提取JSON，跳过", file.path.display());
            return None;
        };

        if extracted.value.as_object().map_or(true, |m| m.is_empty()) {
            tracing::warn!("{} 提取结果为空对象，跳过", file.path.display());
            return None;
        }

        tracing::debug!("{} 通过{}策略提取", file.path.display(), extracted.stage);

        match serde_json::from_value::<StoryReport>(extracted.value) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("{} 结构不符合预期，跳过: {}", file.path.display(), e);
                None
            }
        }
    }

    /// 归一化为数据集记录
    fn build_record(&self, file: &ReportFile, report: StoryReport, index: &MetadataIndex) -> Record {
        let key = file.canonical_key();
        let entry = index.get(&key);

        // 类型优先取报告自身，其次元数据索引，最后 "Unknown"
        let genre = report
            .genre
            .clone()
            .or_else(|| entry.and_then(|e| e.genre.clone()))
            .unwrap_or_else(|| "Unknown".to_string());

        let title = report
            .story_title
            .clone()
            .or_else(|| entry.and_then(|e| e.title.clone()))
            .unwrap_or_else(|| file.stem.clone());

        let mut categories = self.categorizer.nine_grid().zeroed();
        for cell in self.categorizer.nine_grid().cells() {
            categories.add(cell, report.summary_count(cell));
        }

        let positive_portrayal_of_misaligned = report.summary_count(BACKFIRE_KEY);

        Record {
            title,
            author: entry.and_then(|e| e.author.clone()),
            genre: Some(genre),
            genre_description: report.genre_description,
            ai_characters: report.ai_characters,
            behaviors: report.behaviors,
            summary: SummaryReport {
                categories,
                positive_portrayal_of_misaligned,
                total_behaviors: report
                    .summary
                    .get(TOTAL_BEHAVIORS_KEY)
                    .and_then(serde_json::Value::as_u64),
            },
            project_assessment: report.project_assessment,
            batch: report.batch.or_else(|| entry.and_then(|e| e.batch)),
            reports: find_artifacts(file, &self.artifacts),
            key,
        }
    }

    /// 格式无效时回退到 %Y-%m-%d
    fn format_date(&self, now: DateTime<Local>) -> String {
        use std::fmt::Write;

        let mut formatted = String::new();
        if write!(formatted, "{}", now.format(&self.date_format)).is_err() {
            tracing::warn!("日期格式 {:?} 无效，使用默认格式", self.date_format);
            return now.format("%Y-%m-%d").to_string();
        }
        formatted
    }
}
