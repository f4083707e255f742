//! 行为分类统计模块
//!
//! 定义两张固定网格：善意 × 对齐（9 格）与善意 × 对齐 × 描写（27 格），
//! 并把记录中的行为计入网格。统计时三个字段都做大小写折叠，
//! 任一相关轴上的取值不在词表中的行为不计入任何格子。

use crate::core::models::{AxisTerms, Behavior, Record, Taxonomy, Tally};

/// 网格的一个轴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAxis {
    Benevolence,
    Alignment,
    Portrayal,
}

impl GridAxis {
    fn terms(self, taxonomy: &Taxonomy) -> &AxisTerms {
        match self {
            GridAxis::Benevolence => &taxonomy.benevolence,
            GridAxis::Alignment => &taxonomy.alignment,
            GridAxis::Portrayal => &taxonomy.portrayal,
        }
    }

    fn value(self, behavior: &Behavior) -> &str {
        match self {
            GridAxis::Benevolence => &behavior.benevolence,
            GridAxis::Alignment => &behavior.alignment,
            GridAxis::Portrayal => &behavior.portrayal,
        }
    }
}

/// 分类网格：若干轴的笛卡尔积
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    axes: Vec<GridAxis>,
    /// 格子键，按轴顺序展开，如 "benevolent_aligned_positive"
    cells: Vec<String>,
}

impl Grid {
    pub fn new(axes: Vec<GridAxis>, taxonomy: &Taxonomy) -> Self {
        let mut cells = vec![String::new()];
        for axis in &axes {
            let terms = axis.terms(taxonomy).terms();
            cells = cells
                .iter()
                .flat_map(|prefix| {
                    terms.iter().map(move |term| {
                        let term = term.to_lowercase();
                        if prefix.is_empty() {
                            term
                        } else {
                            format!("{}_{}", prefix, term)
                        }
                    })
                })
                .collect();
        }
        Self { axes, cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 全零计数表
    pub fn zeroed(&self) -> Tally {
        Tally::zeroed(self.cells.iter().cloned())
    }
}

/// 行为分类器
pub struct Categorizer {
    taxonomy: Taxonomy,
    nine: Grid,
    twenty_seven: Grid,
}

impl Categorizer {
    /// 创建分类器
    pub fn new(taxonomy: Taxonomy) -> Self {
        let nine = Grid::new(vec![GridAxis::Benevolence, GridAxis::Alignment], &taxonomy);
        let twenty_seven = Grid::new(
            vec![GridAxis::Benevolence, GridAxis::Alignment, GridAxis::Portrayal],
            &taxonomy,
        );
        Self {
            taxonomy,
            nine,
            twenty_seven,
        }
    }

    /// 善意 × 对齐
    pub fn nine_grid(&self) -> &Grid {
        &self.nine
    }

    /// 善意 × 对齐 × 描写
    pub fn twenty_seven_grid(&self) -> &Grid {
        &self.twenty_seven
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// 行为落入的格子键（大小写折叠）
    pub fn cell_of(&self, behavior: &Behavior, grid: &Grid) -> Option<String> {
        let parts = grid
            .axes
            .iter()
            .map(|axis| axis.terms(&self.taxonomy).fold(axis.value(behavior)))
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("_"))
    }

    /// 统计记录在网格中的分布，结果总是包含网格的全部格子
    pub fn count_in_grid(&self, record: &Record, grid: &Grid) -> Tally {
        let mut counts = grid.zeroed();
        for behavior in &record.behaviors {
            if let Some(cell) = self.cell_of(behavior, grid) {
                counts.increment(&cell);
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn behavior(benevolence: &str, alignment: &str, portrayal: &str) -> Behavior {
        Behavior {
            character: "ARIA".to_string(),
            benevolence: benevolence.to_string(),
            alignment: alignment.to_string(),
            portrayal: portrayal.to_string(),
            ..Default::default()
        }
    }

    fn record(behaviors: Vec<Behavior>) -> Record {
        Record {
            key: "batch/story.md".to_string(),
            title: "Story".to_string(),
            author: None,
            genre: None,
            genre_description: String::new(),
            ai_characters: Vec::new(),
            behaviors,
            summary: Default::default(),
            project_assessment: Default::default(),
            batch: None,
            reports: Default::default(),
        }
    }

    #[test]
    fn test_grid_shapes() {
        let categorizer = Categorizer::new(Taxonomy::default());
        assert_eq!(categorizer.nine_grid().len(), 9);
        assert_eq!(categorizer.twenty_seven_grid().len(), 27);
        assert_eq!(categorizer.nine_grid().cells()[0], "benevolent_aligned");
        assert_eq!(categorizer.nine_grid().cells()[8], "malevolent_misaligned");
        assert_eq!(
            categorizer.twenty_seven_grid().cells()[1],
            "benevolent_aligned_neutral"
        );
        assert_eq!(
            categorizer.twenty_seven_grid().cells()[26],
            "malevolent_misaligned_negative"
        );
    }

    #[test]
    fn test_nine_grid_counts() {
        let categorizer = Categorizer::new(Taxonomy::default());
        let rec = record(vec![
            behavior("Benevolent", "Aligned", "Positive"),
            behavior("Benevolent", "Aligned", "Neutral"),
            behavior("Malevolent", "Misaligned", "Negative"),
            behavior("Ambiguous", "Ambiguous", "Neutral"),
        ]);

        let counts = categorizer.count_in_grid(&rec, categorizer.nine_grid());
        assert_eq!(counts.len(), 9);
        assert_eq!(counts.iter().filter(|(_, v)| *v > 0).count(), 3);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.get("benevolent_aligned"), Some(2));
        assert_eq!(counts.get("malevolent_misaligned"), Some(1));
        assert_eq!(counts.get("ambiguous_ambiguous"), Some(1));
    }

    #[test]
    fn test_case_folding_and_unknown_values() {
        let categorizer = Categorizer::new(Taxonomy::default());
        let rec = record(vec![
            behavior("MALEVOLENT", "misaligned", "Positive"),
            behavior("Kind", "Aligned", "Positive"),
            behavior("Benevolent", "Aligned", "Glowing"),
        ]);

        let nine = categorizer.count_in_grid(&rec, categorizer.nine_grid());
        assert_eq!(nine.get("malevolent_misaligned"), Some(1));
        // 描写不在词表中不影响 9 格统计
        assert_eq!(nine.get("benevolent_aligned"), Some(1));
        assert_eq!(nine.total(), 2);

        let full = categorizer.count_in_grid(&rec, categorizer.twenty_seven_grid());
        assert_eq!(full.len(), 27);
        assert_eq!(full.get("malevolent_misaligned_positive"), Some(1));
        assert_eq!(full.total(), 1);
    }

    #[test]
    fn test_empty_record_has_full_zero_grid() {
        let categorizer = Categorizer::new(Taxonomy::default());
        let counts = categorizer.count_in_grid(&record(Vec::new()), categorizer.twenty_seven_grid());
        assert_eq!(counts.len(), 27);
        assert_eq!(counts.total(), 0);
    }
}
