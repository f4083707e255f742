//! 核心数据模型定义
//!
//! 报告文本经提取后先落到 [`StoryReport`]（分析工具的原始输出），
//! 聚合阶段再归一化为 [`Record`]。所有可选字段及其默认值只在这里声明一次，
//! 下游模块不再自行兜底。

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 宽松反序列化：分析工具输出的字段类型并不可靠
pub(crate) mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// 任意标量转为字符串，null 转为空串
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        })
    }

    /// 非空字符串，其余情况为 None
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// 整数或可解析为整数的字符串
    pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// 对象数组：非对象元素和无法解析的元素被丢弃，非数组视为空
    ///
    /// 结构体的派生反序列化也接受按位置填充的数组，这里只放行 JSON 对象。
    pub fn vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// 只接受 JSON 对象，其他类型或解析失败时回退到默认值
    pub fn object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(match Value::deserialize(deserializer)? {
            value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            _ => T::default(),
        })
    }
}

/// 有序计数表
///
/// 键的顺序即声明顺序，序列化为 JSON 对象时保持不变，
/// 以便宽表导出和汇总文件的列顺序固定。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    entries: Vec<(String, u64)>,
}

impl Tally {
    /// 以给定键创建全零计数表
    pub fn zeroed<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: keys.into_iter().map(|k| (k.into(), 0)).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    /// 累加到已存在的键；键不存在时返回 false 且不做任何修改
    pub fn add(&mut self, key: &str, amount: u64) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => {
                *v += amount;
                true
            }
            None => false,
        }
    }

    pub fn increment(&mut self, key: &str) -> bool {
        self.add(key, 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }
}

impl Serialize for Tally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Tally {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TallyVisitor;

        impl<'de> Visitor<'de> for TallyVisitor {
            type Value = Tally;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of counts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Tally, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    entries.push((key, value.as_u64().unwrap_or(0)));
                }
                Ok(Tally { entries })
            }
        }

        deserializer.deserialize_map(TallyVisitor)
    }
}

/// 一个分类轴上的三个取值（按从好到坏排列）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisTerms {
    pub favorable: String,
    pub neutral: String,
    pub adverse: String,
}

impl AxisTerms {
    pub fn new(favorable: &str, neutral: &str, adverse: &str) -> Self {
        Self {
            favorable: favorable.to_string(),
            neutral: neutral.to_string(),
            adverse: adverse.to_string(),
        }
    }

    pub fn terms(&self) -> [&str; 3] {
        [&self.favorable, &self.neutral, &self.adverse]
    }

    /// 大小写折叠后匹配取值，返回小写形式的规范键
    pub fn fold(&self, value: &str) -> Option<String> {
        let folded = value.to_lowercase();
        self.terms()
            .iter()
            .map(|t| t.to_lowercase())
            .find(|t| *t == folded)
    }
}

/// 项目评估结论的四个取值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTerms {
    pub success: String,
    pub partial: String,
    pub failure: String,
    pub backfire: String,
}

impl OutcomeTerms {
    pub fn terms(&self) -> [&str; 4] {
        [&self.success, &self.partial, &self.failure, &self.backfire]
    }
}

/// 分类词表
///
/// 统计（大小写折叠）和过滤（精确匹配）都从这里取词，
/// 由配置传入各组件，不使用模块级常量。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub benevolence: AxisTerms,
    pub alignment: AxisTerms,
    pub portrayal: AxisTerms,
    pub outcomes: OutcomeTerms,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            benevolence: AxisTerms::new("Benevolent", "Ambiguous", "Malevolent"),
            alignment: AxisTerms::new("Aligned", "Ambiguous", "Misaligned"),
            portrayal: AxisTerms::new("Positive", "Neutral", "Negative"),
            outcomes: OutcomeTerms {
                success: "Success".to_string(),
                partial: "Partial".to_string(),
                failure: "Failure".to_string(),
                backfire: "Backfire".to_string(),
            },
        }
    }
}

/// AI角色的单个行为
///
/// 三个分类字段原样保留，词表之外的取值不参与任何统计。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default, deserialize_with = "lenient::string")]
    pub character: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub benevolence: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub alignment: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub portrayal: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub quote: String,
}

/// AI角色描述
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiCharacter {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub character_type: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub overall_benevolence: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub overall_alignment: String,
}

/// 项目评估
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAssessment {
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub success_level: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub explanation: String,
}

/// 分析工具自报的汇总（9 类计数 + 正面描写的失调行为数 + 行为总数）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    #[serde(flatten)]
    pub categories: Tally,
    #[serde(default)]
    pub positive_portrayal_of_misaligned: u64,
    /// 自报的行为总数，原样保留，不参与统计
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_behaviors: Option<u64>,
}

/// 分析工具对单个故事的原始输出
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryReport {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub story_title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub genre_description: String,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub ai_characters: Vec<AiCharacter>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub behaviors: Vec<Behavior>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub summary: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub project_assessment: ProjectAssessment,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub batch: Option<i64>,
}

impl StoryReport {
    /// 自报汇总中的计数，缺失或非整数时为 0
    pub fn summary_count(&self, key: &str) -> u64 {
        self.summary.get(key).and_then(Value::as_u64).unwrap_or(0)
    }
}

/// 数据集中的一条故事记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 规范键 "<目录>/<文件名>.md"
    #[serde(rename = "file")]
    pub key: String,
    #[serde(rename = "story_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub genre_description: String,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub ai_characters: Vec<AiCharacter>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub behaviors: Vec<Behavior>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub summary: SummaryReport,
    #[serde(default, deserialize_with = "lenient::object")]
    pub project_assessment: ProjectAssessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<i64>,
    /// 附加报告（报告类型 -> 原文）
    #[serde(default)]
    pub reports: BTreeMap<String, String>,
}

impl Record {
    /// 评估结论，缺失时为 "Unknown"
    pub fn status(&self) -> &str {
        self.project_assessment
            .success_level
            .as_deref()
            .unwrap_or("Unknown")
    }

    /// 在第一个 '/' 处拆分规范键为 (目录, 文件名)
    pub fn split_key(&self) -> (&str, &str) {
        match self.key.split_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", self.key.as_str()),
        }
    }

    pub fn genre_label(&self) -> &str {
        self.genre.as_deref().unwrap_or("Unknown")
    }
}

/// 元数据索引中的一项
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub file: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub batch: Option<i64>,
}

/// 全语料统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub by_category: Tally,
    pub by_portrayal: Tally,
    pub backfire_risk: u64,
    pub by_assessment: Tally,
}

/// 运行元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub total_stories: usize,
    pub total_behaviors: u64,
    pub generated_date: String,
    pub corpus_source: String,
}

/// 完整数据集
///
/// 记录放入后只通过只读切片暴露。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub metadata: RunMetadata,
    pub aggregate_stats: AggregateStats,
    stories: Vec<Record>,
}

impl Dataset {
    pub fn new(metadata: RunMetadata, aggregate_stats: AggregateStats, stories: Vec<Record>) -> Self {
        Self {
            metadata,
            aggregate_stats,
            stories,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.stories
    }
}

/// 附加报告的命名规则：与行为报告同目录下的 "<stem><suffix>"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPattern {
    pub key: String,
    pub suffix: String,
}

impl ArtifactPattern {
    fn new(key: &str, suffix: &str) -> Self {
        Self {
            key: key.to_string(),
            suffix: suffix.to_string(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("misalignment_v1", "-prompt1-misalignment.md"),
            Self::new("misalignment_v2", "-prompt1-misalignment-v2.md"),
            Self::new("categorization_v1", "-prompt2-categorization.md"),
            Self::new("categorization_v2", "-prompt2-categorization-v2.md"),
            Self::new("benevolent_v1", "-prompt3-benevolent.md"),
            Self::new("benevolent_v2", "-prompt3-benevolent-v2.md"),
            Self::new("harmful_v1", "-prompt4-harmful.md"),
            Self::new("harmful_v2", "-prompt4-harmful-v2.md"),
        ]
    }
}

/// 应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 行为报告根目录
    pub reports_dir: PathBuf,
    /// 元数据索引（可选）
    pub metadata_file: PathBuf,
    /// 数据集输出文件
    pub analysis_file: PathBuf,
    /// 表格输出目录
    pub csv_dir: PathBuf,
    /// 行为报告文件名后缀（不含扩展名）
    pub report_suffix: String,
    /// 行为报告扩展名
    pub report_extensions: Vec<String>,
    /// 是否扫描隐藏文件和目录（以 '.' 开头）
    ///
    /// 默认跳过，整个隐藏目录连同其中的报告都不会进入数据集；
    /// 需要与递归匹配全部文件的行为一致时设为 true。
    pub include_hidden: bool,
    /// 语料来源标记
    pub corpus_source: String,
    /// 生成日期格式
    pub date_format: String,
    pub taxonomy: Taxonomy,
    pub artifacts: Vec<ArtifactPattern>,
    /// 始终列出的类型分组（即使没有记录）
    pub known_genres: Vec<String>,
    /// 始终列出的批次分组（即使没有记录）
    pub known_batches: Vec<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("reports"),
            metadata_file: PathBuf::from("metadata.json"),
            analysis_file: PathBuf::from("analysis.json"),
            csv_dir: PathBuf::from("csv"),
            report_suffix: "-behaviors".to_string(),
            report_extensions: vec!["json".to_string()],
            include_hidden: false,
            corpus_source: "hyperstition".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            taxonomy: Taxonomy::default(),
            artifacts: ArtifactPattern::defaults(),
            known_genres: Vec::new(),
            known_batches: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_keeps_declaration_order() {
        let mut tally = Tally::zeroed(["positive", "neutral", "negative"]);
        assert!(tally.increment("negative"));
        assert!(!tally.increment("sideways"));

        let json = serde_json::to_string(&tally).unwrap();
        assert_eq!(json, r#"{"positive":0,"neutral":0,"negative":1}"#);

        let back: Tally = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tally);
    }

    #[test]
    fn test_story_report_tolerates_odd_types() {
        let value = serde_json::json!({
            "story_title": 42,
            "genre": "",
            "behaviors": [
                {"character": "Unit 7", "benevolence": "Benevolent", "alignment": null, "portrayal": 3},
                "not a behavior"
            ],
            "summary": "broken",
            "project_assessment": ["also broken"],
            "batch": "2"
        });

        let report: StoryReport = serde_json::from_value(value).unwrap();
        assert_eq!(report.story_title.as_deref(), Some("42"));
        assert_eq!(report.genre, None);
        assert_eq!(report.behaviors.len(), 1);
        assert_eq!(report.behaviors[0].alignment, "");
        assert_eq!(report.behaviors[0].portrayal, "3");
        assert!(report.summary.is_empty());
        assert_eq!(report.project_assessment, ProjectAssessment::default());
        assert_eq!(report.batch, Some(2));
    }

    #[test]
    fn test_positional_arrays_are_not_structs() {
        let value = serde_json::json!({
            "story_title": "Echo",
            "behaviors": [
                ["ARIA", "desc", "Malevolent", "Misaligned", "Positive", "q"],
                {"character": "ARIA", "benevolence": "Benevolent", "alignment": "Aligned", "portrayal": "Neutral"}
            ],
            "summary": [1, 2, 3],
            "project_assessment": ["Success", "n/a"]
        });

        let report: StoryReport = serde_json::from_value(value).unwrap();
        assert_eq!(report.behaviors.len(), 1);
        assert_eq!(report.behaviors[0].benevolence, "Benevolent");
        assert!(report.summary.is_empty());
        assert_eq!(report.project_assessment.success_level, None);

        let record: Record = serde_json::from_value(serde_json::json!({
            "file": "d/x.md",
            "story_title": "X",
            "project_assessment": ["Success", "n/a"],
            "behaviors": [["ARIA", "desc", "Malevolent", "Misaligned", "Positive", "q"]]
        }))
        .unwrap();
        assert_eq!(record.status(), "Unknown");
        assert!(record.behaviors.is_empty());
    }

    #[test]
    fn test_record_status_and_key_split() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "file": "0 Claude 500/the-lighthouse.md",
            "story_title": "The Lighthouse",
            "genre": null
        }))
        .unwrap();

        assert_eq!(record.status(), "Unknown");
        assert_eq!(record.split_key(), ("0 Claude 500", "the-lighthouse.md"));
        assert_eq!(record.genre_label(), "Unknown");
    }

    #[test]
    fn test_axis_fold_is_case_insensitive() {
        let axis = Taxonomy::default().alignment;
        assert_eq!(axis.fold("MISALIGNED").as_deref(), Some("misaligned"));
        assert_eq!(axis.fold("mostly aligned"), None);
    }
}
