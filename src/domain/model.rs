use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 資料集中的一筆 VQA 題目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub index: usize,
    pub image_path: PathBuf,
    pub question: String,
    pub answer: String,
}

/// 醫學場景圖：由視覺模型依題目產生的 JSON 結構
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneGraph {
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub relationships: Vec<SceneRelationship>,
    #[serde(default)]
    pub conditions: Vec<SceneCondition>,
    #[serde(default)]
    pub question_focus: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneRelationship {
    #[serde(default, deserialize_with = "string_or_number")]
    pub subject: String,
    #[serde(default)]
    pub predicate: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub object: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneCondition {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

impl SceneGraph {
    pub fn object_by_id(&self, id: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }
}

/// 模型有時輸出數字 id，一律轉成字串
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// 知識三元組 (subject, predicate, object)，序列化為三元素陣列
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triplet(pub String, pub String, pub String);

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self(subject.into(), predicate.into(), object.into())
    }

    pub fn subject(&self) -> &str {
        &self.0
    }

    pub fn predicate(&self) -> &str {
        &self.1
    }

    pub fn object(&self) -> &str {
        &self.2
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.0, self.1, self.2)
    }
}

/// 結果檔中的一筆作答紀錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub index: usize,
    pub question: String,
    pub ground_truth: String,
    pub prediction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMetadata {
    pub total_triplets: usize,
    pub radgraph_triplets: usize,
    pub tcga_triplets: usize,
    pub unique_entities: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// 一次完整執行的摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub output_path: String,
    pub rounds: usize,
    pub answered: usize,
    pub failed: usize,
    pub remaining: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_graph_tolerates_missing_fields_and_numeric_ids() {
        let raw = r#"{
            "objects": [{"id": 1, "type": "lung", "attributes": {"opacity": "increased"}}],
            "relationships": [{"subject": 1, "predicate": "adjacent_to", "object": "o2"}]
        }"#;
        let graph: SceneGraph = serde_json::from_str(raw).unwrap();

        assert_eq!(graph.objects[0].id, "1");
        assert_eq!(graph.objects[0].kind, "lung");
        assert_eq!(graph.relationships[0].subject, "1");
        assert!(graph.conditions.is_empty());
        assert!(graph.question_focus.is_empty());
        assert!(graph.object_by_id("1").is_some());
    }

    #[test]
    fn test_triplet_serializes_as_array() {
        let triplet = Triplet::new("effusion:OBS-DP", "located_at", "pleural:ANAT-DP");
        let json = serde_json::to_string(&triplet).unwrap();
        assert_eq!(json, r#"["effusion:OBS-DP","located_at","pleural:ANAT-DP"]"#);
        assert_eq!(triplet.to_string(), "effusion:OBS-DP located_at pleural:ANAT-DP");
    }
}
