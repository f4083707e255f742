//! 输出写入模块
//!
//! 所有文件先写入同目录下的临时文件，再原子替换目标文件，
//! 中途失败不会留下写了一半的输出。

use crate::core::report::{ReportBundle, ReportContent, Table};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 原子写入字节内容
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("无法创建目录: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("无法创建临时文件: {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("无法写入: {}", path.display()))?;
    Ok(())
}

/// 写入 JSON（带缩进）
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_atomic(path, content.as_bytes())
}

/// 表格编码为 CSV
pub fn encode_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV 编码失败: {}", e.error()))
}

/// 写入报表集合，返回写入的文件路径
pub fn write_bundle(out_dir: &Path, bundle: &ReportBundle) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(bundle.files.len());
    for file in &bundle.files {
        let path = out_dir.join(&file.name);
        match &file.content {
            ReportContent::Table(table) => write_atomic(&path, &encode_csv(table)?)?,
            ReportContent::Text(text) => write_atomic(&path, text.as_bytes())?,
        }
        tracing::debug!("已写入 {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::OutputFile;
    use tempfile::tempdir;

    fn table() -> Table {
        Table {
            headers: vec!["directory".to_string(), "filename".to_string()],
            rows: vec![vec!["0 Claude, 500".to_string(), "a \"b\".md".to_string()]],
        }
    }

    #[test]
    fn test_encode_csv_quotes_fields() {
        let bytes = encode_csv(&table()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "directory,filename\n\"0 Claude, 500\",\"a \"\"b\"\".md\"\n");
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        // 没有残留的临时文件
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_write_bundle() {
        let dir = tempdir().unwrap();
        let bundle = ReportBundle {
            files: vec![
                OutputFile {
                    name: "t.csv".to_string(),
                    content: ReportContent::Table(table()),
                },
                OutputFile {
                    name: "README.md".to_string(),
                    content: ReportContent::Text("# hi\n".to_string()),
                },
            ],
        };

        let written = write_bundle(dir.path(), &bundle).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "# hi\n"
        );
        assert!(dir.path().join("t.csv").exists());
    }
}
