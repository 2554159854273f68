//! 將 RadGraph 與 TCGA-Reports 轉成知識三元組，並建立實體索引。
//!
//! 輸出目錄包含三個檔案：
//! - `medical_triplets.json`：所有三元組
//! - `entity_index.json`：實體 -> 相關三元組（主詞與受詞雙向索引）
//! - `metadata.json`：統計資訊

use crate::domain::model::{KnowledgeMetadata, Triplet};
use crate::utils::error::{Result, SmrError};
use crate::utils::text::json_value_text;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const TRIPLETS_FILE: &str = "medical_triplets.json";
pub const ENTITY_INDEX_FILE: &str = "entity_index.json";
pub const METADATA_FILE: &str = "metadata.json";

pub type EntityIndex = BTreeMap<String, Vec<Triplet>>;

pub struct KnowledgeBasePreprocessor {
    radgraph_path: PathBuf,
    tcga_reports_path: PathBuf,
    output_dir: PathBuf,
}

impl KnowledgeBasePreprocessor {
    pub fn new(
        radgraph_path: impl Into<PathBuf>,
        tcga_reports_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            radgraph_path: radgraph_path.into(),
            tcga_reports_path: tcga_reports_path.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn process_radgraph(&self) -> Result<Vec<Triplet>> {
        tracing::info!("📚 Processing RadGraph dataset: {}", self.radgraph_path.display());
        let content = std::fs::read_to_string(&self.radgraph_path)?;
        let data: Value = serde_json::from_str(&content)?;
        radgraph_triplets(&data)
    }

    pub fn process_tcga_reports(&self) -> Result<Vec<Triplet>> {
        tracing::info!(
            "📚 Processing TCGA-Reports dataset: {}",
            self.tcga_reports_path.display()
        );
        let reports = load_tcga_reports(&self.tcga_reports_path)?;
        Ok(tcga_triplets(&reports))
    }

    pub fn save_processed_data(
        &self,
        radgraph_triplets: Vec<Triplet>,
        tcga_triplets: Vec<Triplet>,
    ) -> Result<KnowledgeMetadata> {
        std::fs::create_dir_all(&self.output_dir)?;

        let radgraph_count = radgraph_triplets.len();
        let tcga_count = tcga_triplets.len();
        let mut all_triplets = radgraph_triplets;
        all_triplets.extend(tcga_triplets);

        let entity_index = create_entity_index(&all_triplets);

        let metadata = KnowledgeMetadata {
            total_triplets: all_triplets.len(),
            radgraph_triplets: radgraph_count,
            tcga_triplets: tcga_count,
            unique_entities: entity_index.len(),
            created_at: Some(chrono::Utc::now()),
        };

        write_json(&self.output_dir.join(TRIPLETS_FILE), &all_triplets)?;
        write_json(&self.output_dir.join(ENTITY_INDEX_FILE), &entity_index)?;
        write_json(&self.output_dir.join(METADATA_FILE), &metadata)?;

        tracing::info!(
            "💾 Saved {} triplets and entity index to {}",
            metadata.total_triplets,
            self.output_dir.display()
        );
        tracing::debug!("Knowledge base metadata: {:?}", metadata);

        Ok(metadata)
    }

    pub fn preprocess(&self) -> Result<KnowledgeMetadata> {
        let radgraph = self.process_radgraph()?;
        tracing::info!("Extracted {} triplets from RadGraph", radgraph.len());

        let tcga = self.process_tcga_reports()?;
        tracing::info!("Extracted {} triplets from TCGA-Reports", tcga.len());

        self.save_processed_data(radgraph, tcga)
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// JSON 值轉字串：字串取原文，其餘使用 JSON 表示
fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// RadGraph：每份報告需同時有 `entities` 與 `relations`
pub fn radgraph_triplets(data: &Value) -> Result<Vec<Triplet>> {
    let reports = data.as_object().ok_or_else(|| SmrError::KnowledgeBaseError {
        message: "RadGraph data must be a JSON object keyed by report id".to_string(),
    })?;

    let mut triplets = Vec::new();

    for report in reports.values() {
        let (Some(entities), Some(relations)) = (report.get("entities"), report.get("relations"))
        else {
            continue;
        };

        // entity id -> "label:label_type"
        let mut entity_labels: BTreeMap<&str, String> = BTreeMap::new();
        if let Some(entities) = entities.as_object() {
            for (entity_id, info) in entities {
                entity_labels.insert(
                    entity_id.as_str(),
                    format!("{}:{}", str_field(info, "label"), str_field(info, "label_type")),
                );
            }
        }

        if let Some(relations) = relations.as_array() {
            for relation in relations.iter().filter(|r| r.is_object()) {
                let subject = entity_labels.get(str_field(relation, "subject"));
                let object = entity_labels.get(str_field(relation, "object"));
                if let (Some(subject), Some(object)) = (subject, object) {
                    triplets.push(Triplet::new(
                        subject.clone(),
                        str_field(relation, "type"),
                        object.clone(),
                    ));
                }
            }
        }

        if let Some(entities) = entities.as_object() {
            for (entity_id, info) in entities {
                let Some(attributes) = info.get("attributes").and_then(Value::as_object) else {
                    continue;
                };
                let label = &entity_labels[entity_id.as_str()];
                for (key, value) in attributes {
                    triplets.push(Triplet::new(
                        label.clone(),
                        format!("has_{}", key),
                        json_value_text(value),
                    ));
                }
            }
        }
    }

    Ok(triplets)
}

/// 讀取 TCGA 報告：`.json`（陣列或以 id 為鍵的物件）或 `.csv`
pub fn load_tcga_reports(path: &Path) -> Result<Vec<Value>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<Value>(&content)? {
                Value::Array(reports) => Ok(reports),
                Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
                _ => Err(SmrError::KnowledgeBaseError {
                    message: "TCGA-Reports JSON must be an array or an object of reports"
                        .to_string(),
                }),
            }
        }
        Some("csv") => {
            let mut reader = csv::Reader::from_path(path)?;
            let headers = reader.headers()?.clone();
            let mut reports = Vec::new();
            for row in reader.records() {
                let row = row?;
                let mut report = serde_json::Map::new();
                for (header, cell) in headers.iter().zip(row.iter()) {
                    // findings 欄位存放 JSON 字串
                    let value = if header == "findings" {
                        serde_json::from_str(cell).unwrap_or_else(|_| Value::String(cell.to_string()))
                    } else {
                        Value::String(cell.to_string())
                    };
                    report.insert(header.to_string(), value);
                }
                reports.push(Value::Object(report));
            }
            Ok(reports)
        }
        _ => Err(SmrError::KnowledgeBaseError {
            message: format!(
                "Unsupported file format for TCGA-Reports: {}",
                path.display()
            ),
        }),
    }
}

/// TCGA findings：organ -> [{entity, attributes}]
pub fn tcga_triplets(reports: &[Value]) -> Vec<Triplet> {
    let mut triplets = Vec::new();

    for report in reports {
        let Some(findings) = report.get("findings").and_then(Value::as_object) else {
            continue;
        };

        for (organ, finding_list) in findings {
            let Some(finding_list) = finding_list.as_array() else {
                continue;
            };
            for finding in finding_list.iter().filter(|f| f.is_object()) {
                let entity = str_field(finding, "entity");
                if entity.is_empty() {
                    continue;
                }
                if !organ.is_empty() {
                    triplets.push(Triplet::new(entity, "located_in", organ.as_str()));
                }
                if let Some(attributes) = finding.get("attributes").and_then(Value::as_object) {
                    for (key, value) in attributes {
                        triplets.push(Triplet::new(
                            entity,
                            format!("has_{}", key),
                            json_value_text(value),
                        ));
                    }
                }
            }
        }
    }

    triplets
}

/// 主詞與受詞都指向所屬三元組
pub fn create_entity_index(triplets: &[Triplet]) -> EntityIndex {
    let mut index: EntityIndex = BTreeMap::new();
    for triplet in triplets {
        index
            .entry(triplet.subject().to_string())
            .or_default()
            .push(triplet.clone());
        index
            .entry(triplet.object().to_string())
            .or_default()
            .push(triplet.clone());
    }
    index
}

/// 實體依第一次出現在三元組中的順序排列；索引中多出的實體接在最後
pub fn entity_order(triplets: &[Triplet], index: &EntityIndex) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut order = Vec::with_capacity(index.len());
    for triplet in triplets {
        for entity in [triplet.subject(), triplet.object()] {
            if index.contains_key(entity) && seen.insert(entity) {
                order.push(entity.to_string());
            }
        }
    }
    for entity in index.keys() {
        if seen.insert(entity.as_str()) {
            order.push(entity.clone());
        }
    }
    order
}
