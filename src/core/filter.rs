//! 过滤引擎
//!
//! 四个互相独立的过滤层级，每层把记录划入若干“问题”桶和一个“通过”桶。
//! 同一层的两个问题桶可以重叠，但都与该层的通过桶互斥。
//!
//! 注意：这里的行为匹配是精确字符串匹配（区分大小写），
//! 与分类统计的大小写折叠不同，两条路径需要保持各自的行为。

use crate::core::models::{Behavior, Record, Taxonomy, Tally};

pub const LEVEL1_SUCCESS: &str = "level1_success";
pub const LEVEL1_FAILURE: &str = "level1_failure";
pub const LEVEL2_MISALIGNED_POSITIVE: &str = "level2_misaligned_positive";
pub const LEVEL2_MALEVOLENT_POSITIVE: &str = "level2_malevolent_positive";
pub const LEVEL2_PASS: &str = "level2_pass";
pub const LEVEL3_MISALIGNED: &str = "level3_misaligned";
pub const LEVEL3_MALEVOLENT: &str = "level3_malevolent";
pub const LEVEL3_PASS: &str = "level3_pass";
pub const LEVEL4_ALIGNMENT_ISSUES: &str = "level4_alignment_issues";
pub const LEVEL4_BENEVOLENCE_ISSUES: &str = "level4_benevolence_issues";
pub const LEVEL4_PASS: &str = "level4_pass";

/// 行为匹配条件，None 表示不约束该字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorCondition {
    pub benevolence: Option<Vec<String>>,
    pub alignment: Option<Vec<String>>,
    pub portrayal: Option<Vec<String>>,
}

impl BehaviorCondition {
    /// 行为是否满足全部给定约束（精确匹配）
    pub fn matches(&self, behavior: &Behavior) -> bool {
        fn allowed(constraint: &Option<Vec<String>>, value: &str) -> bool {
            constraint
                .as_ref()
                .map_or(true, |terms| terms.iter().any(|t| t == value))
        }

        allowed(&self.benevolence, &behavior.benevolence)
            && allowed(&self.alignment, &behavior.alignment)
            && allowed(&self.portrayal, &behavior.portrayal)
    }
}

/// 记录中是否至少有一个行为满足条件
pub fn has_behavior_matching(record: &Record, condition: &BehaviorCondition) -> bool {
    record.behaviors.iter().any(|b| condition.matches(b))
}

/// 问题桶规则
#[derive(Debug, Clone)]
pub struct BucketRule {
    pub name: &'static str,
    pub condition: BehaviorCondition,
}

/// 层级规则
#[derive(Debug, Clone)]
pub enum LevelRule {
    /// 按评估结论二分（大小写不敏感）
    Outcome {
        success_term: String,
        success_bucket: &'static str,
        failure_bucket: &'static str,
    },
    /// 两个行为问题桶 + 通过桶
    Behavioral {
        first: BucketRule,
        second: BucketRule,
        pass_bucket: &'static str,
    },
}

/// 一个过滤层级
#[derive(Debug, Clone)]
pub struct FilterLevel {
    pub number: u8,
    pub rule: LevelRule,
}

impl FilterLevel {
    /// 本层全部桶名，按输出顺序
    pub fn bucket_names(&self) -> Vec<&'static str> {
        match &self.rule {
            LevelRule::Outcome {
                success_bucket,
                failure_bucket,
                ..
            } => vec![*success_bucket, *failure_bucket],
            LevelRule::Behavioral {
                first,
                second,
                pass_bucket,
            } => vec![first.name, second.name, *pass_bucket],
        }
    }

    /// 记录在本层所属的桶
    pub fn classify(&self, record: &Record) -> Vec<&'static str> {
        match &self.rule {
            LevelRule::Outcome {
                success_term,
                success_bucket,
                failure_bucket,
            } => {
                let status = record.status().to_lowercase();
                if status == success_term.to_lowercase() {
                    vec![*success_bucket]
                } else {
                    vec![*failure_bucket]
                }
            }
            LevelRule::Behavioral {
                first,
                second,
                pass_bucket,
            } => {
                let mut buckets = Vec::with_capacity(2);
                if has_behavior_matching(record, &first.condition) {
                    buckets.push(first.name);
                }
                if has_behavior_matching(record, &second.condition) {
                    buckets.push(second.name);
                }
                if buckets.is_empty() {
                    buckets.push(*pass_bucket);
                }
                buckets
            }
        }
    }
}

fn terms(values: &[&String]) -> Option<Vec<String>> {
    Some(values.iter().map(|v| v.to_string()).collect())
}

/// 一个桶及其中的记录键（保持数据集顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketList<'r> {
    pub name: &'static str,
    pub keys: Vec<&'r str>,
}

/// 一组记录的层级统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStats {
    pub total: usize,
    /// 11 个桶的记录数
    pub counts: Tally,
}

impl FilterStats {
    pub fn count(&self, bucket: &str) -> u64 {
        self.counts.get(bucket).unwrap_or(0)
    }
}

/// 过滤引擎
pub struct FilterEngine {
    levels: Vec<FilterLevel>,
}

impl FilterEngine {
    /// 按词表构建四个层级
    pub fn new(taxonomy: &Taxonomy) -> Self {
        let benevolence = &taxonomy.benevolence;
        let alignment = &taxonomy.alignment;
        let positive = &taxonomy.portrayal.favorable;

        let levels = vec![
            FilterLevel {
                number: 1,
                rule: LevelRule::Outcome {
                    success_term: taxonomy.outcomes.success.clone(),
                    success_bucket: LEVEL1_SUCCESS,
                    failure_bucket: LEVEL1_FAILURE,
                },
            },
            FilterLevel {
                number: 2,
                rule: LevelRule::Behavioral {
                    first: BucketRule {
                        name: LEVEL2_MISALIGNED_POSITIVE,
                        condition: BehaviorCondition {
                            alignment: terms(&[&alignment.adverse]),
                            portrayal: terms(&[positive]),
                            ..Default::default()
                        },
                    },
                    second: BucketRule {
                        name: LEVEL2_MALEVOLENT_POSITIVE,
                        condition: BehaviorCondition {
                            benevolence: terms(&[&benevolence.adverse]),
                            portrayal: terms(&[positive]),
                            ..Default::default()
                        },
                    },
                    pass_bucket: LEVEL2_PASS,
                },
            },
            FilterLevel {
                number: 3,
                rule: LevelRule::Behavioral {
                    first: BucketRule {
                        name: LEVEL3_MISALIGNED,
                        condition: BehaviorCondition {
                            alignment: terms(&[&alignment.adverse]),
                            ..Default::default()
                        },
                    },
                    second: BucketRule {
                        name: LEVEL3_MALEVOLENT,
                        condition: BehaviorCondition {
                            benevolence: terms(&[&benevolence.adverse]),
                            ..Default::default()
                        },
                    },
                    pass_bucket: LEVEL3_PASS,
                },
            },
            FilterLevel {
                number: 4,
                rule: LevelRule::Behavioral {
                    first: BucketRule {
                        name: LEVEL4_ALIGNMENT_ISSUES,
                        condition: BehaviorCondition {
                            alignment: terms(&[&alignment.adverse, &alignment.neutral]),
                            ..Default::default()
                        },
                    },
                    second: BucketRule {
                        name: LEVEL4_BENEVOLENCE_ISSUES,
                        condition: BehaviorCondition {
                            benevolence: terms(&[&benevolence.adverse, &benevolence.neutral]),
                            ..Default::default()
                        },
                    },
                    pass_bucket: LEVEL4_PASS,
                },
            },
        ];

        Self { levels }
    }

    pub fn levels(&self) -> &[FilterLevel] {
        &self.levels
    }

    /// 全部 11 个桶名，按层级顺序
    pub fn bucket_names(&self) -> Vec<&'static str> {
        self.levels.iter().flat_map(|l| l.bucket_names()).collect()
    }

    /// 记录在各层所属的桶
    pub fn classify(&self, record: &Record) -> Vec<&'static str> {
        self.levels.iter().flat_map(|l| l.classify(record)).collect()
    }

    /// 把记录划入各桶
    pub fn partition<'r>(&self, records: &'r [Record]) -> Vec<BucketList<'r>> {
        let mut lists: Vec<BucketList<'r>> = self
            .bucket_names()
            .into_iter()
            .map(|name| BucketList {
                name,
                keys: Vec::new(),
            })
            .collect();

        for record in records {
            for bucket in self.classify(record) {
                if let Some(list) = lists.iter_mut().find(|l| l.name == bucket) {
                    list.keys.push(&record.key);
                }
            }
        }

        lists
    }

    /// 统计一组记录（空组全部为 0）
    pub fn stats<'r, I>(&self, records: I) -> FilterStats
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let mut counts = Tally::zeroed(self.bucket_names());
        let mut total = 0;
        for record in records {
            total += 1;
            for bucket in self.classify(record) {
                counts.increment(bucket);
            }
        }
        FilterStats { total, counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ProjectAssessment;

    fn behavior(benevolence: &str, alignment: &str, portrayal: &str) -> Behavior {
        Behavior {
            benevolence: benevolence.to_string(),
            alignment: alignment.to_string(),
            portrayal: portrayal.to_string(),
            ..Default::default()
        }
    }

    fn record(key: &str, success_level: Option<&str>, behaviors: Vec<Behavior>) -> Record {
        Record {
            key: key.to_string(),
            title: key.to_string(),
            author: None,
            genre: None,
            genre_description: String::new(),
            ai_characters: Vec::new(),
            behaviors,
            summary: Default::default(),
            project_assessment: ProjectAssessment {
                success_level: success_level.map(str::to_string),
                explanation: String::new(),
            },
            batch: None,
            reports: Default::default(),
        }
    }

    fn engine() -> FilterEngine {
        FilterEngine::new(&Taxonomy::default())
    }

    #[test]
    fn test_bucket_names() {
        assert_eq!(
            engine().bucket_names(),
            vec![
                LEVEL1_SUCCESS,
                LEVEL1_FAILURE,
                LEVEL2_MISALIGNED_POSITIVE,
                LEVEL2_MALEVOLENT_POSITIVE,
                LEVEL2_PASS,
                LEVEL3_MISALIGNED,
                LEVEL3_MALEVOLENT,
                LEVEL3_PASS,
                LEVEL4_ALIGNMENT_ISSUES,
                LEVEL4_BENEVOLENCE_ISSUES,
                LEVEL4_PASS,
            ]
        );
    }

    #[test]
    fn test_level1_is_case_insensitive() {
        let engine = engine();
        assert!(engine
            .classify(&record("a/x.md", Some("SUCCESS"), vec![]))
            .contains(&LEVEL1_SUCCESS));
        assert!(engine
            .classify(&record("a/y.md", Some("Partial"), vec![]))
            .contains(&LEVEL1_FAILURE));
        assert!(engine
            .classify(&record("a/z.md", None, vec![]))
            .contains(&LEVEL1_FAILURE));
    }

    #[test]
    fn test_level2_pass_does_not_imply_level3_pass() {
        let rec = record(
            "a/x.md",
            Some("Success"),
            vec![behavior("Benevolent", "Misaligned", "Negative")],
        );
        let buckets = engine().classify(&rec);

        assert!(buckets.contains(&LEVEL2_PASS));
        assert!(buckets.contains(&LEVEL3_MISALIGNED));
        assert!(!buckets.contains(&LEVEL3_PASS));
    }

    #[test]
    fn test_problem_buckets_overlap() {
        let rec = record(
            "a/x.md",
            Some("Failure"),
            vec![behavior("Malevolent", "Misaligned", "Positive")],
        );
        let records = vec![rec];
        let lists = engine().partition(&records);

        let keys_of = |name: &str| {
            lists
                .iter()
                .find(|l| l.name == name)
                .map(|l| l.keys.clone())
                .unwrap()
        };

        assert_eq!(lists.len(), 11);
        assert_eq!(keys_of(LEVEL2_MISALIGNED_POSITIVE), vec!["a/x.md"]);
        assert_eq!(keys_of(LEVEL2_MALEVOLENT_POSITIVE), vec!["a/x.md"]);
        assert!(keys_of(LEVEL2_PASS).is_empty());
        assert_eq!(keys_of(LEVEL3_MISALIGNED), vec!["a/x.md"]);
        assert_eq!(keys_of(LEVEL3_MALEVOLENT), vec!["a/x.md"]);
        assert!(keys_of(LEVEL3_PASS).is_empty());
    }

    #[test]
    fn test_matching_is_exact_case() {
        // 统计会把 "misaligned" 计入失调，但过滤不会
        let rec = record("a/x.md", None, vec![behavior("malevolent", "misaligned", "positive")]);
        let buckets = engine().classify(&rec);

        assert!(buckets.contains(&LEVEL2_PASS));
        assert!(buckets.contains(&LEVEL3_PASS));
        assert!(buckets.contains(&LEVEL4_PASS));
    }

    #[test]
    fn test_level4_counts_ambiguous() {
        let rec = record("a/x.md", None, vec![behavior("Benevolent", "Ambiguous", "Neutral")]);
        let buckets = engine().classify(&rec);

        assert!(buckets.contains(&LEVEL3_PASS));
        assert!(buckets.contains(&LEVEL4_ALIGNMENT_ISSUES));
        assert!(!buckets.contains(&LEVEL4_BENEVOLENCE_ISSUES));
        assert!(!buckets.contains(&LEVEL4_PASS));
    }

    #[test]
    fn test_condition_requires_all_fields_on_one_behavior() {
        // 失调和正面描写分散在两个行为上，不构成第二层问题
        let rec = record(
            "a/x.md",
            None,
            vec![
                behavior("Benevolent", "Misaligned", "Negative"),
                behavior("Benevolent", "Aligned", "Positive"),
            ],
        );
        assert!(engine().classify(&rec).contains(&LEVEL2_PASS));
    }

    #[test]
    fn test_stats_for_empty_group() {
        let stats = engine().stats(std::iter::empty::<&Record>());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.counts.len(), 11);
        assert_eq!(stats.counts.total(), 0);
    }

    #[test]
    fn test_stats_counts() {
        let records = vec![
            record("a/1.md", Some("Success"), vec![behavior("Benevolent", "Aligned", "Positive")]),
            record("a/2.md", Some("Backfire"), vec![behavior("Malevolent", "Aligned", "Positive")]),
        ];
        let stats = engine().stats(&records);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.count(LEVEL1_SUCCESS), 1);
        assert_eq!(stats.count(LEVEL1_FAILURE), 1);
        assert_eq!(stats.count(LEVEL2_MALEVOLENT_POSITIVE), 1);
        assert_eq!(stats.count(LEVEL2_PASS), 1);
        assert_eq!(stats.count(LEVEL4_BENEVOLENCE_ISSUES), 1);
        assert_eq!(stats.count(LEVEL4_PASS), 1);
    }
}
