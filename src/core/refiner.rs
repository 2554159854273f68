//! 以醫學知識庫修正視覺模型產生的場景圖。

use crate::core::prompts::scene_graph_refinement_prompt;
use crate::domain::model::{SceneGraph, ValidationReport};
use crate::domain::ports::LanguageModel;
use crate::knowledge::KnowledgeBaseRetriever;
use crate::utils::error::Result;
use crate::utils::text::{extract_json_object, json_value_text, preview};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_MAX_KNOWLEDGE_PER_ENTITY: usize = 5;

pub struct SceneGraphRefiner {
    retriever: KnowledgeBaseRetriever,
    language_model: Arc<dyn LanguageModel>,
    max_knowledge_per_entity: usize,
}

impl SceneGraphRefiner {
    pub fn new(retriever: KnowledgeBaseRetriever, language_model: Arc<dyn LanguageModel>) -> Self {
        Self {
            retriever,
            language_model,
            max_knowledge_per_entity: DEFAULT_MAX_KNOWLEDGE_PER_ENTITY,
        }
    }

    pub fn with_max_knowledge_per_entity(mut self, max: usize) -> Self {
        self.max_knowledge_per_entity = max;
        self
    }

    pub fn retriever(&self) -> &KnowledgeBaseRetriever {
        &self.retriever
    }

    /// 回傳修正後的場景圖文字；無法解析或檢索不到知識時原樣回傳
    pub async fn refine_scene_graph(&self, initial_scene_graph: &str, trace: bool) -> Result<String> {
        let Some(scene_graph) = parse_scene_graph(initial_scene_graph) else {
            tracing::warn!("⚠️ 場景圖無法解析為 JSON，略過知識庫修正");
            return Ok(initial_scene_graph.to_string());
        };

        let knowledge = self
            .retriever
            .retrieve_knowledge_for_scene_graph(&scene_graph, self.max_knowledge_per_entity);

        if knowledge.is_empty() {
            tracing::debug!("知識庫中沒有相關知識，沿用原始場景圖");
            return Ok(initial_scene_graph.to_string());
        }

        tracing::debug!("📚 檢索到 {} 組相關知識", knowledge.len());
        if trace {
            tracing::info!(
                "Retrieved knowledge: {}",
                preview(&knowledge.format(), 500)
            );
        }

        let prompt = scene_graph_refinement_prompt(initial_scene_graph, &knowledge.format());
        self.language_model.get_response(&prompt).await
    }

    pub fn validate_scene_graph(&self, scene_graph_text: &str) -> ValidationReport {
        validate_scene_graph(scene_graph_text)
    }
}

pub fn parse_scene_graph(text: &str) -> Option<SceneGraph> {
    let json = extract_json_object(text)?;
    serde_json::from_str(json).ok()
}

/// 結構檢查：錯誤代表場景圖不可用，警告僅供參考
pub fn validate_scene_graph(scene_graph_text: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    let raw: Value = match extract_json_object(scene_graph_text).map(serde_json::from_str::<Value>) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            report.errors.push(format!("Invalid JSON: {}", e));
            return report;
        }
        None => {
            report
                .errors
                .push("No JSON object found in scene graph".to_string());
            return report;
        }
    };

    if raw.get("objects").is_none() {
        report.errors.push("Missing 'objects' field".to_string());
        return report;
    }

    let scene_graph: SceneGraph = match serde_json::from_value(raw.clone()) {
        Ok(graph) => graph,
        Err(e) => {
            report
                .errors
                .push(format!("Scene graph structure is invalid: {}", e));
            return report;
        }
    };

    if scene_graph.objects.is_empty() {
        report.warnings.push("Scene graph has no objects".to_string());
    }

    let mut known_ids = HashSet::new();
    for object in &scene_graph.objects {
        if !known_ids.insert(object.id.as_str()) {
            report
                .warnings
                .push(format!("Duplicate object id '{}'", object.id));
        }
        if object.kind.trim().is_empty() {
            report
                .warnings
                .push(format!("Object '{}' has an empty type", object.id));
        }
    }

    for relation in &scene_graph.relationships {
        for end in [&relation.subject, &relation.object] {
            if !known_ids.contains(end.as_str()) {
                report.errors.push(format!(
                    "Relationship '{}' references unknown object '{}'",
                    relation.predicate, end
                ));
            }
        }
    }

    // 條件 id 也可以是問題焦點
    let focus_targets: HashSet<&str> = known_ids
        .iter()
        .copied()
        .chain(scene_graph.conditions.iter().map(|c| c.id.as_str()))
        .collect();

    if raw.get("question_focus").is_none() {
        report
            .warnings
            .push("Missing 'question_focus' field".to_string());
    } else {
        for focus in &scene_graph.question_focus {
            let focus_id = json_value_text(focus);
            if !focus_targets.contains(focus_id.as_str()) {
                report.warnings.push(format!(
                    "Question focus '{}' does not match any object or condition",
                    focus_id
                ));
            }
        }
    }

    report.is_valid = report.errors.is_empty();
    report
}
