//! 讀取醫學 VQA 資料集。
//!
//! 支援 `.json`（陣列）、`.jsonl`、`.csv`；傳入目錄時讀取其中的 `dataset.json`。
//! 每筆需有影像路徑、問題與答案，相對影像路徑以資料集檔案所在目錄為基準。

use crate::domain::model::Sample;
use crate::utils::error::{Result, SmrError};
use crate::utils::text::json_value_text;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

pub const DATASET_EXTENSIONS: [&str; 3] = ["json", "jsonl", "csv"];
const DEFAULT_DATASET_FILE: &str = "dataset.json";

#[derive(Debug, Deserialize)]
struct RawSample {
    #[serde(alias = "image_path", alias = "img_path", alias = "image_name")]
    image: String,
    question: String,
    #[serde(default, alias = "gt_answer", deserialize_with = "any_to_string")]
    answer: String,
}

fn any_to_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        other => json_value_text(&other),
    })
}

pub fn resolve_dataset_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_DATASET_FILE)
    } else {
        path.to_path_buf()
    }
}

pub fn load_dataset(path: &Path) -> Result<Vec<Sample>> {
    let file = resolve_dataset_file(path);
    let base_dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let raw_samples: Vec<RawSample> = match extension.as_deref() {
        Some("json") => {
            let content = read_dataset_file(&file)?;
            serde_json::from_str(&content)?
        }
        Some("jsonl") => {
            let content = read_dataset_file(&file)?;
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(line_no, line)| {
                    serde_json::from_str(line).map_err(|e| SmrError::DatasetError {
                        message: format!("{} line {}: {}", file.display(), line_no + 1, e),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        }
        Some("csv") => {
            let mut reader = csv::Reader::from_path(&file)?;
            reader
                .deserialize()
                .collect::<std::result::Result<Vec<RawSample>, csv::Error>>()?
        }
        _ => {
            return Err(SmrError::DatasetError {
                message: format!(
                    "Unsupported dataset format: {} (expected one of {})",
                    file.display(),
                    DATASET_EXTENSIONS.join(", ")
                ),
            })
        }
    };

    raw_samples
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            if raw.question.trim().is_empty() {
                return Err(SmrError::ValidationError {
                    message: format!("Sample {} has an empty question", index),
                });
            }
            let image_path = PathBuf::from(&raw.image);
            let image_path = if image_path.is_absolute() {
                image_path
            } else {
                base_dir.join(image_path)
            };
            Ok(Sample {
                index,
                image_path,
                question: raw.question,
                answer: raw.answer,
            })
        })
        .collect()
}

fn read_dataset_file(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).map_err(|e| SmrError::DatasetError {
        message: format!("Cannot read dataset {}: {}", file.display(), e),
    })
}
