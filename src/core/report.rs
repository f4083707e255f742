//! 报表生成模块
//!
//! 把数据集渲染为内存中的报表集合：宽表、各过滤桶列表、汇总表、
//! 按类型/批次分组的统计表、可读的分组说明文档以及索引文档。
//! 本模块不做任何IO，落盘由 storage::output 负责。

use crate::core::categorizer::Categorizer;
use crate::core::filter::{
    FilterEngine, FilterStats, LEVEL1_FAILURE, LEVEL1_SUCCESS, LEVEL2_MALEVOLENT_POSITIVE,
    LEVEL2_MISALIGNED_POSITIVE, LEVEL2_PASS, LEVEL3_MALEVOLENT, LEVEL3_MISALIGNED, LEVEL3_PASS,
    LEVEL4_ALIGNMENT_ISSUES, LEVEL4_BENEVOLENCE_ISSUES, LEVEL4_PASS,
};
use crate::core::models::{AppConfig, Dataset, Record};
use std::collections::BTreeSet;

/// 没有批次信息的记录归入的分组
pub const UNKNOWN_BATCH: i64 = -1;

/// 带表头的表格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }
}

/// 输出文件内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportContent {
    Table(Table),
    Text(String),
}

/// 一个输出文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub content: ReportContent,
}

/// 全部输出文件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportBundle {
    pub files: Vec<OutputFile>,
}

impl ReportBundle {
    fn push_table(&mut self, name: impl Into<String>, table: Table) {
        self.files.push(OutputFile {
            name: name.into(),
            content: ReportContent::Table(table),
        });
    }

    fn push_text(&mut self, name: impl Into<String>, text: String) {
        self.files.push(OutputFile {
            name: name.into(),
            content: ReportContent::Text(text),
        });
    }

    pub fn get(&self, name: &str) -> Option<&ReportContent> {
        self.files.iter().find(|f| f.name == name).map(|f| &f.content)
    }
}

/// 分组维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    All,
    Genre,
    Batch,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::All => "all",
            GroupKind::Genre => "genre",
            GroupKind::Batch => "batch",
        }
    }
}

/// 一个分组的层级统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    pub kind: GroupKind,
    pub value: String,
    pub stats: FilterStats,
}

/// 百分比，保留一位小数；空组为 "0.0%"
pub fn percentage(count: u64, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", count as f64 / total as f64 * 100.0)
}

/// 千分位分隔
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// 各过滤桶的文件说明
fn bucket_description(bucket: &str) -> &'static str {
    match bucket {
        LEVEL1_SUCCESS => "Stories marked as \"Success\"",
        LEVEL1_FAILURE => "Stories marked as Partial, Failure, or Backfire",
        LEVEL2_MISALIGNED_POSITIVE => {
            "Stories with at least one misaligned behavior portrayed positively"
        }
        LEVEL2_MALEVOLENT_POSITIVE => {
            "Stories with at least one malevolent behavior portrayed positively"
        }
        LEVEL2_PASS => "Stories without positively portrayed misaligned or malevolent behaviors",
        LEVEL3_MISALIGNED => "Stories with at least one misaligned behavior (any portrayal)",
        LEVEL3_MALEVOLENT => "Stories with at least one malevolent behavior (any portrayal)",
        LEVEL3_PASS => "Stories without any misaligned or malevolent behaviors",
        LEVEL4_ALIGNMENT_ISSUES => {
            "Stories with at least one misaligned or ambiguously-aligned behavior"
        }
        LEVEL4_BENEVOLENCE_ISSUES => {
            "Stories with at least one malevolent or ambiguously-benevolent behavior"
        }
        LEVEL4_PASS => "Stories with only benevolent and aligned behaviors",
        _ => "",
    }
}

/// 各层级的标题、简介和定义
fn level_text(number: u8) -> (&'static str, &'static str, &'static str) {
    match number {
        1 => (
            "Project Assessment",
            "Stories filtered by their project assessment outcome (Success vs all other outcomes).",
            "Project assessment outcome (Success vs Partial/Failure/Backfire)",
        ),
        2 => (
            "Positive Portrayal of Problematic Behaviors",
            "Stories filtered by whether they contain misaligned or malevolent behaviors that are portrayed positively (the \"backfire\" risk).",
            "Stories with misaligned or malevolent behaviors portrayed *positively* (\"backfire risk\")",
        ),
        3 => (
            "Any Misaligned or Malevolent Behaviors",
            "Stories filtered by whether they contain any misaligned or malevolent behaviors, regardless of portrayal.",
            "Stories with any misaligned or malevolent behaviors (any portrayal)",
        ),
        _ => (
            "Including Ambiguous Behaviors",
            "Stories filtered by whether they contain any misaligned/ambiguously-aligned or malevolent/ambiguously-benevolent behaviors.",
            "Stories with any misaligned, ambiguous alignment, malevolent, or ambiguous benevolence behaviors",
        ),
    }
}

/// 报表生成器
pub struct ReportBuilder {
    categorizer: Categorizer,
    filter: FilterEngine,
    known_genres: Vec<String>,
    known_batches: Vec<i64>,
}

impl ReportBuilder {
    /// 根据配置创建生成器
    pub fn new(config: &AppConfig) -> Self {
        Self {
            categorizer: Categorizer::new(config.taxonomy.clone()),
            filter: FilterEngine::new(&config.taxonomy),
            known_genres: config.known_genres.clone(),
            known_batches: config.known_batches.clone(),
        }
    }

    /// 生成全部报表
    pub fn build(&self, dataset: &Dataset) -> ReportBundle {
        let records = dataset.records();
        let mut bundle = ReportBundle::default();

        bundle.push_table("stories_27_categories.csv", self.category_table(records));
        bundle.push_table("stories_9_categories.csv", self.nine_category_table(records));
        bundle.push_table("stories_simple.csv", self.simple_table(records));

        for list in self.filter.partition(records) {
            let mut table = Table::new(["file"]);
            table.rows = list.keys.iter().map(|k| vec![k.to_string()]).collect();
            bundle.push_table(format!("{}.csv", list.name), table);
        }

        let overall = self.filter.stats(records);
        bundle.push_table("summary.csv", self.summary_table(&overall));

        let groups = self.group_breakdown(records);
        bundle.push_table("summary_by_group.csv", self.breakdown_table(&groups));
        bundle.push_text("summary_by_group.md", self.breakdown_markdown(&groups));
        bundle.push_text("README.md", self.readme(&overall));

        tracing::info!("已生成 {} 个报表文件", bundle.files.len());
        bundle
    }

    /// 27 格宽表
    pub fn category_table(&self, records: &[Record]) -> Table {
        let grid = self.categorizer.twenty_seven_grid();
        let mut table = Table::new(
            ["directory", "filename", "genre", "status"]
                .into_iter()
                .map(str::to_string)
                .chain(grid.cells().iter().cloned()),
        );

        for record in records {
            let (directory, filename) = record.split_key();
            let counts = self.categorizer.count_in_grid(record, grid);
            let mut row = vec![
                directory.to_string(),
                filename.to_string(),
                record.genre_label().to_string(),
                record.status().to_string(),
            ];
            row.extend(counts.iter().map(|(_, v)| v.to_string()));
            table.rows.push(row);
        }

        table
    }

    /// 9 格宽表
    pub fn nine_category_table(&self, records: &[Record]) -> Table {
        let grid = self.categorizer.nine_grid();
        let mut table = Table::new(
            ["directory", "filename", "status"]
                .into_iter()
                .map(str::to_string)
                .chain(grid.cells().iter().cloned()),
        );

        for record in records {
            let (directory, filename) = record.split_key();
            let counts = self.categorizer.count_in_grid(record, grid);
            let mut row = vec![
                directory.to_string(),
                filename.to_string(),
                record.status().to_string(),
            ];
            row.extend(counts.iter().map(|(_, v)| v.to_string()));
            table.rows.push(row);
        }

        table
    }

    /// 目录/文件名/结论
    pub fn simple_table(&self, records: &[Record]) -> Table {
        let mut table = Table::new(["directory", "filename", "status"]);
        for record in records {
            let (directory, filename) = record.split_key();
            table.rows.push(vec![
                directory.to_string(),
                filename.to_string(),
                record.status().to_string(),
            ]);
        }
        table
    }

    /// 各桶数量及占全部故事的比例
    pub fn summary_table(&self, overall: &FilterStats) -> Table {
        let mut table = Table::new(["category", "count", "percentage"]);
        for (bucket, count) in overall.counts.iter() {
            table.rows.push(vec![
                bucket.to_string(),
                count.to_string(),
                percentage(count, overall.total),
            ]);
        }
        table
    }

    /// 整体、按类型、按批次的分组统计
    pub fn group_breakdown(&self, records: &[Record]) -> Vec<GroupStats> {
        let mut groups = vec![GroupStats {
            kind: GroupKind::All,
            value: "all".to_string(),
            stats: self.filter.stats(records),
        }];

        let genres: BTreeSet<String> = records
            .iter()
            .map(|r| r.genre_label().to_string())
            .chain(self.known_genres.iter().cloned())
            .collect();
        for genre in genres {
            let stats = self
                .filter
                .stats(records.iter().filter(|r| r.genre_label() == genre));
            groups.push(GroupStats {
                kind: GroupKind::Genre,
                value: genre,
                stats,
            });
        }

        let batches: BTreeSet<i64> = records
            .iter()
            .map(|r| r.batch.unwrap_or(UNKNOWN_BATCH))
            .chain(self.known_batches.iter().copied())
            .collect();
        for batch in batches {
            let stats = self
                .filter
                .stats(records.iter().filter(|r| r.batch.unwrap_or(UNKNOWN_BATCH) == batch));
            groups.push(GroupStats {
                kind: GroupKind::Batch,
                value: batch.to_string(),
                stats,
            });
        }

        groups
    }

    /// 分组统计表：数量列之后是各自的百分比列
    pub fn breakdown_table(&self, groups: &[GroupStats]) -> Table {
        let buckets = self.filter.bucket_names();
        let headers = ["group_type", "group_value", "total"]
            .into_iter()
            .map(str::to_string)
            .chain(buckets.iter().map(|b| b.to_string()))
            .chain(buckets.iter().map(|b| format!("{}_pct", b)));
        let mut table = Table::new(headers);

        for group in groups {
            let stats = &group.stats;
            let mut row = vec![
                group.kind.as_str().to_string(),
                group.value.clone(),
                stats.total.to_string(),
            ];
            row.extend(buckets.iter().map(|b| stats.count(b).to_string()));
            row.extend(
                buckets
                    .iter()
                    .map(|b| percentage(stats.count(b), stats.total)),
            );
            table.rows.push(row);
        }

        table
    }

    /// 可读的分组统计文档
    pub fn breakdown_markdown(&self, groups: &[GroupStats]) -> String {
        let Some(overall) = groups.iter().find(|g| g.kind == GroupKind::All) else {
            return String::new();
        };
        let o = &overall.stats;
        let total = o.total as u64;

        let mut content = String::new();
        content.push_str("# Corpus Statistics by Group\n\n");
        content.push_str(&format!("Generated from {} stories.\n\n", thousands(total)));
        content.push_str("## Overall Summary\n\n");
        content.push_str("| Metric | Count | Percentage |\n");
        content.push_str("|--------|-------|------------|\n");
        content.push_str(&format!("| Total Stories | {} | 100% |\n", thousands(total)));
        for (label, bucket) in [
            ("Level 1 Success", LEVEL1_SUCCESS),
            ("Level 1 Failure", LEVEL1_FAILURE),
            ("Level 2 Pass", LEVEL2_PASS),
            ("Level 3 Pass", LEVEL3_PASS),
            ("Level 4 Pass", LEVEL4_PASS),
        ] {
            content.push_str(&format!(
                "| {} | {} | {} |\n",
                label,
                thousands(o.count(bucket)),
                percentage(o.count(bucket), o.total)
            ));
        }

        let genres: Vec<_> = groups.iter().filter(|g| g.kind == GroupKind::Genre).collect();
        content.push_str("\n## By Genre\n");
        push_group_sections(&mut content, "Genre", &genres, |g| g.value.clone());

        let batches: Vec<_> = groups.iter().filter(|g| g.kind == GroupKind::Batch).collect();
        content.push_str("\n## By Batch\n");
        push_group_sections(&mut content, "Batch", &batches, |g| format!("Batch {}", g.value));

        content.push_str("\n## Filtering Level Definitions\n\n");
        for level in self.filter.levels() {
            let (_, _, definition) = level_text(level.number);
            content.push_str(&format!("- **Level {}**: {}\n", level.number, definition));
        }
        content.push_str(
            "\nHigher pass rates indicate \"cleaner\" stories with fewer problematic AI behaviors.\n",
        );

        content
    }

    /// 输出目录索引
    pub fn readme(&self, overall: &FilterStats) -> String {
        let mut content = String::new();
        content.push_str("# CSV Reports\n\n");
        content.push_str(
            "This directory contains CSV reports generated from the corpus behavior analysis.\n\n",
        );
        content.push_str(&format!("**Total stories analyzed:** {}\n\n", overall.total));

        content.push_str("## Data Files\n\n### Full Behavior Analysis\n\n");
        content.push_str("| File | Description |\n|------|-------------|\n");
        content.push_str("| [stories_27_categories.csv](stories_27_categories.csv) | All stories with behavior counts across 27 categories (benevolence × alignment × portrayal) |\n");
        content.push_str("| [stories_9_categories.csv](stories_9_categories.csv) | All stories with behavior counts across 9 categories (benevolence × alignment) |\n");
        content.push_str("| [stories_simple.csv](stories_simple.csv) | All stories with just directory, filename, and success status |\n");

        for level in self.filter.levels() {
            let (title, intro, _) = level_text(level.number);
            content.push_str(&format!(
                "\n### Level {} Filtering: {}\n\n{}\n\n",
                level.number, title, intro
            ));
            content.push_str("| File | Description | Count |\n|------|-------------|-------|\n");
            for bucket in level.bucket_names() {
                content.push_str(&format!(
                    "| [{0}.csv]({0}.csv) | {1} | {2} |\n",
                    bucket,
                    bucket_description(bucket),
                    overall.count(bucket)
                ));
            }
        }

        content.push_str("\n### Summary\n\n| File | Description |\n|------|-------------|\n");
        content.push_str("| [summary.csv](summary.csv) | Total counts and percentages for each filtering category |\n");
        content.push_str("| [summary_by_group.csv](summary_by_group.csv) | Filtering stats broken down by genre and batch |\n");
        content.push_str("| [summary_by_group.md](summary_by_group.md) | Readable version of the breakdown statistics |\n");

        content.push_str(COLUMN_DESCRIPTIONS);
        content
    }
}

/// 按类型或批次的三张子表
fn push_group_sections<F>(content: &mut String, label: &str, groups: &[&GroupStats], name: F)
where
    F: Fn(&GroupStats) -> String,
{
    content.push_str("\n### Success Rates\n\n");
    content.push_str(&format!(
        "| {} | Stories | Success | Failure | Success Rate |\n",
        label
    ));
    content.push_str(&format!(
        "|{}|---------|---------|---------|--------------|\n",
        "-".repeat(label.len() + 2)
    ));
    for &group in groups {
        let s = &group.stats;
        content.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            name(group),
            thousands(s.total as u64),
            thousands(s.count(LEVEL1_SUCCESS)),
            thousands(s.count(LEVEL1_FAILURE)),
            percentage(s.count(LEVEL1_SUCCESS), s.total)
        ));
    }

    content.push_str("\n### Filtering Levels (Pass Rates)\n\n");
    content.push_str(&format!(
        "| {} | Stories | Level 2 Pass | Level 3 Pass | Level 4 Pass |\n",
        label
    ));
    content.push_str(&format!(
        "|{}|---------|--------------|--------------|--------------|\n",
        "-".repeat(label.len() + 2)
    ));
    for &group in groups {
        let s = &group.stats;
        content.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            name(group),
            thousands(s.total as u64),
            percentage(s.count(LEVEL2_PASS), s.total),
            percentage(s.count(LEVEL3_PASS), s.total),
            percentage(s.count(LEVEL4_PASS), s.total)
        ));
    }

    content.push_str("\n### Detailed Counts\n\n");
    content.push_str(&format!(
        "| {} | L2 Misaligned+ | L2 Malevolent+ | L3 Misaligned | L3 Malevolent | L4 Alignment | L4 Benevolence |\n",
        label
    ));
    content.push_str(&format!(
        "|{}|----------------|----------------|---------------|---------------|--------------|----------------|\n",
        "-".repeat(label.len() + 2)
    ));
    for &group in groups {
        let s = &group.stats;
        content.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            name(group),
            s.count(LEVEL2_MISALIGNED_POSITIVE),
            s.count(LEVEL2_MALEVOLENT_POSITIVE),
            s.count(LEVEL3_MISALIGNED),
            s.count(LEVEL3_MALEVOLENT),
            s.count(LEVEL4_ALIGNMENT_ISSUES),
            s.count(LEVEL4_BENEVOLENCE_ISSUES)
        ));
    }
}

const COLUMN_DESCRIPTIONS: &str = r#"
## Column Descriptions

### stories_27_categories.csv

- `directory`: The corpus directory containing the story
- `filename`: The story filename (with .md extension)
- `genre`: The story's genre classification
- `status`: Project assessment outcome (Success, Partial, Failure, Backfire)
- `benevolent_aligned_positive`, `benevolent_aligned_neutral`, etc.: Count of behaviors in each category

### stories_9_categories.csv

- `directory`: The corpus directory containing the story
- `filename`: The story filename (with .md extension)
- `status`: Project assessment outcome
- `benevolent_aligned`, `benevolent_ambiguous`, etc.: Count of behaviors in each category

### stories_simple.csv

- `directory`: The corpus directory containing the story
- `filename`: The story filename (with .md extension)
- `status`: Project assessment outcome

### Filtering Lists (level*.csv)

- `file`: Relative path to the story file (directory/filename.md)

### summary.csv

- `category`: Filtering bucket name
- `count`: Stories in the bucket
- `percentage`: Share of all stories

### summary_by_group.csv

- `group_type`: Type of grouping ("all", "genre", or "batch")
- `group_value`: The specific group ("all", genre name, or batch number; -1 when unknown)
- `total`: Total stories in this group
- `level1_success`, `level1_failure`: Level 1 filtering counts
- `level2_*`: Level 2 filtering counts (positively portrayed misaligned/malevolent)
- `level3_*`: Level 3 filtering counts (any misaligned/malevolent)
- `level4_*`: Level 4 filtering counts (including ambiguous)
- `*_pct`: Each count as a percentage of the group's own total

## Filtering Logic

- **Level 1**: Based solely on project assessment outcome
- **Level 2**: "Backfire risk" - problematic behaviors shown in a positive light
- **Level 3**: Any problematic behaviors regardless of how they're portrayed
- **Level 4**: Most inclusive filter - includes ambiguous behaviors as potential concerns

Note: Stories can appear in multiple lists within a level (e.g., a story with both misaligned and malevolent behaviors will appear in both lists), but the "pass" list only includes stories that don't appear in either of the other two lists for that level.
"#;
