//! 报告文本提取模块
//!
//! 分析工具的输出常常夹杂说明文字或 Markdown 代码块。
//! 这里按固定顺序尝试若干个提取策略，第一个得到 JSON 对象的策略胜出。
//! 每个策略都是全函数（只返回 Option，不报错），只负责缩小候选子串，不做修复。

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// 代码块：可选 json 标记，正文以花括号包围（非贪婪）
static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced block pattern is valid")
});

/// 提取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    /// 整段文本就是 JSON
    WholeText,
    /// 第一个花括号代码块
    FencedBlock,
    /// 第一个 '{' 到最后一个 '}'
    BraceSpan,
}

impl std::fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStage::WholeText => write!(f, "全文"),
            ExtractionStage::FencedBlock => write!(f, "代码块"),
            ExtractionStage::BraceSpan => write!(f, "花括号区间"),
        }
    }
}

/// 提取结果
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub stage: ExtractionStage,
}

/// 报告提取器
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor;

impl Extractor {
    /// 创建提取器
    pub fn new() -> Self {
        Self
    }

    /// 依次尝试各策略
    pub fn extract(&self, text: &str) -> Option<Extracted> {
        parse_whole(text)
            .map(|value| (ExtractionStage::WholeText, value))
            .or_else(|| {
                self.parse_fenced(text)
                    .map(|value| (ExtractionStage::FencedBlock, value))
            })
            .or_else(|| parse_brace_span(text).map(|value| (ExtractionStage::BraceSpan, value)))
            .map(|(stage, value)| Extracted { value, stage })
    }

    /// 第一个花括号代码块
    pub fn parse_fenced(&self, text: &str) -> Option<Value> {
        let captures = FENCED_BLOCK_RE.captures(text)?;
        parse_object(captures.get(1)?.as_str())
    }
}

/// 整段文本
pub fn parse_whole(text: &str) -> Option<Value> {
    parse_object(text)
}

/// 第一个 '{' 到最后一个 '}'（贪婪，取最外层候选）
pub fn parse_brace_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    parse_object(&text[start..=end])
}

/// 只接受 JSON 对象
fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> Extractor {
        Extractor::new()
    }

    #[test]
    fn test_whole_text() {
        let result = extractor().extract(r#"  {"story_title": "Echo"}  "#).unwrap();
        assert_eq!(result.stage, ExtractionStage::WholeText);
        assert_eq!(result.value, json!({"story_title": "Echo"}));
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here is the result:\n```json\n{\"a\":1}\n```\nThanks";
        let result = extractor().extract(text).unwrap();
        assert_eq!(result.stage, ExtractionStage::FencedBlock);
        assert_eq!(result.value, json!({"a": 1}));
    }

    #[test]
    fn test_untagged_fence() {
        let text = "```\n{\"a\": [1, 2]}\n```";
        let result = extractor().extract(text).unwrap();
        assert_eq!(result.stage, ExtractionStage::FencedBlock);
        assert_eq!(result.value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_brace_span() {
        let result = extractor()
            .extract(r#"noise {"a": {"b": 1}} trailing"#)
            .unwrap();
        assert_eq!(result.stage, ExtractionStage::BraceSpan);
        assert_eq!(result.value, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_brace_span_takes_widest_candidate() {
        // 两个独立对象时取最外层区间，解析失败即放弃
        assert!(extractor().extract(r#"first {"a": 1} then {"b": 2}"#).is_none());
    }

    #[test]
    fn test_no_braces_is_failure() {
        assert!(extractor().extract("the model refused to answer").is_none());
        assert!(extractor().extract("").is_none());
        assert!(extractor().extract("} backwards {").is_none());
    }

    #[test]
    fn test_non_object_json_falls_through() {
        assert!(parse_whole("[1, 2, 3]").is_none());
        let result = extractor().extract(r#"["x", {"a": 1}]"#).unwrap();
        assert_eq!(result.stage, ExtractionStage::BraceSpan);
        assert_eq!(result.value, json!({"a": 1}));
    }

    #[test]
    fn test_malformed_is_not_repaired() {
        let text = "```json\n{\"a\": 1,}\n```";
        assert!(extractor().extract(text).is_none());
    }
}
