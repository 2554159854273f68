//! 依場景圖從預處理好的知識庫中檢索相關三元組。

use crate::domain::model::{SceneGraph, Triplet};
use crate::knowledge::preprocessor::{
    create_entity_index, entity_order, EntityIndex, ENTITY_INDEX_FILE, TRIPLETS_FILE,
};
use crate::knowledge::tfidf::{cosine_similarity, SparseVector, TfidfConfig, TfidfVectorizer};
use crate::utils::error::{Result, SmrError};
use crate::utils::text::json_value_text;
use std::path::Path;

/// 相似度門檻，低於此值的實體不採用
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

/// 以插入順序保存的檢索結果（key 為實體或 `subject-predicate-object`）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedKnowledge {
    entries: Vec<(String, Vec<Triplet>)>,
}

impl RetrievedKnowledge {
    /// 同 key 覆寫原值並保留原位置
    pub fn insert(&mut self, key: String, triplets: Vec<Triplet>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = triplets,
            None => self.entries.push((key, triplets)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[Triplet]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, triplets)| triplets.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// 轉成放進提示詞的 Markdown 文字
    pub fn format(&self) -> String {
        let mut lines = Vec::new();
        for (key, triplets) in &self.entries {
            lines.push(format!("\n**Knowledge about '{}':**", key));
            for triplet in triplets {
                lines.push(format!("- {}", triplet));
            }
        }
        lines.join("\n")
    }
}

pub struct KnowledgeBaseRetriever {
    triplets: Vec<Triplet>,
    entity_index: EntityIndex,
    entity_list: Vec<String>,
    vectorizer: TfidfVectorizer,
    entity_embeddings: Vec<SparseVector>,
}

fn normalize_entity(entity: &str) -> String {
    entity.to_lowercase().replace([':', '_'], " ")
}

impl KnowledgeBaseRetriever {
    pub fn new(triplets: Vec<Triplet>, entity_index: EntityIndex) -> Self {
        let entity_list = entity_order(&triplets, &entity_index);
        let entity_texts: Vec<String> = entity_list.iter().map(|e| normalize_entity(e)).collect();

        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let entity_embeddings = vectorizer.fit_transform(&entity_texts);

        Self {
            triplets,
            entity_index,
            entity_list,
            vectorizer,
            entity_embeddings,
        }
    }

    /// 從預處理目錄載入；缺少索引檔時由三元組重建
    pub fn load(processed_dir: &Path) -> Result<Self> {
        let triplets_path = processed_dir.join(TRIPLETS_FILE);
        let content = std::fs::read_to_string(&triplets_path).map_err(|e| {
            SmrError::KnowledgeBaseError {
                message: format!("Cannot read {}: {}", triplets_path.display(), e),
            }
        })?;
        let triplets: Vec<Triplet> = serde_json::from_str(&content)?;

        let index_path = processed_dir.join(ENTITY_INDEX_FILE);
        let entity_index: EntityIndex = if index_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&index_path)?)?
        } else {
            tracing::warn!(
                "Entity index not found at {}, rebuilding from triplets",
                index_path.display()
            );
            create_entity_index(&triplets)
        };

        tracing::info!(
            "📚 Loaded {} triplets and {} unique entities",
            triplets.len(),
            entity_index.len()
        );

        Ok(Self::new(triplets, entity_index))
    }

    pub fn triplet_count(&self) -> usize {
        self.triplets.len()
    }

    pub fn entities(&self) -> &[String] {
        &self.entity_list
    }

    pub fn entity_count(&self) -> usize {
        self.entity_list.len()
    }

    /// 場景圖中可用於檢索的實體字串
    pub fn extract_entities_from_scene_graph(scene_graph: &SceneGraph) -> Vec<String> {
        let mut entities = Vec::new();

        for object in &scene_graph.objects {
            if !object.kind.is_empty() {
                entities.push(object.kind.clone());
            }
            let kind = if object.kind.is_empty() {
                "entity"
            } else {
                object.kind.as_str()
            };
            for (key, value) in &object.attributes {
                entities.push(format!("{}:{}:{}", kind, key, json_value_text(value)));
            }
        }

        for condition in &scene_graph.conditions {
            if !condition.kind.is_empty() {
                entities.push(condition.kind.clone());
            }
            if !condition.description.is_empty() {
                entities.push(condition.description.clone());
            }
        }

        entities
    }

    pub fn find_similar_entities(&self, query_entity: &str, top_k: usize) -> Vec<(String, f64)> {
        if self.entity_list.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query = self.vectorizer.transform(&normalize_entity(query_entity));
        let mut scored: Vec<(usize, f64)> = self
            .entity_embeddings
            .iter()
            .enumerate()
            .map(|(index, embedding)| (index, cosine_similarity(&query, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(top_k)
            .filter(|(_, score)| *score > SIMILARITY_THRESHOLD)
            .map(|(index, score)| (self.entity_list[index].clone(), score))
            .collect()
    }

    /// 直接命中取前 `max/2` 筆，其餘名額平均分給相似實體
    pub fn retrieve_entity_knowledge(&self, entity: &str, max_triplets: usize) -> Vec<Triplet> {
        let mut retrieved: Vec<Triplet> = Vec::new();

        if let Some(direct) = self.entity_index.get(entity) {
            retrieved.extend(direct.iter().take(max_triplets / 2).cloned());
        }

        let similar = self.find_similar_entities(entity, 3);
        let similar_count = similar.len();
        for (similar_entity, _) in &similar {
            let Some(related) = self.entity_index.get(similar_entity) else {
                continue;
            };
            let remaining = max_triplets.saturating_sub(retrieved.len());
            if remaining == 0 {
                break;
            }
            let share = remaining / similar_count;
            let fresh: Vec<Triplet> = related
                .iter()
                .filter(|t| !retrieved.contains(t))
                .take(share)
                .cloned()
                .collect();
            retrieved.extend(fresh);
        }

        retrieved.truncate(max_triplets);
        retrieved
    }

    /// 謂詞與任一端點以子字串（雙向、不分大小寫）比對，最多 5 筆
    pub fn retrieve_relationship_knowledge(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Vec<Triplet> {
        let subject = subject.to_lowercase();
        let predicate = predicate.to_lowercase();
        let object = object.to_lowercase();
        let related = |a: &str, b: &str| a.contains(b) || b.contains(a);

        self.triplets
            .iter()
            .filter(|t| {
                related(&predicate, &t.predicate().to_lowercase())
                    && (related(&subject, &t.subject().to_lowercase())
                        || related(&object, &t.object().to_lowercase()))
            })
            .take(5)
            .cloned()
            .collect()
    }

    pub fn retrieve_knowledge_for_scene_graph(
        &self,
        scene_graph: &SceneGraph,
        max_knowledge_per_entity: usize,
    ) -> RetrievedKnowledge {
        let mut knowledge = RetrievedKnowledge::default();

        for entity in Self::extract_entities_from_scene_graph(scene_graph) {
            let triplets = self.retrieve_entity_knowledge(&entity, max_knowledge_per_entity);
            if !triplets.is_empty() {
                knowledge.insert(entity, triplets);
            }
        }

        for relation in &scene_graph.relationships {
            let subject = scene_graph
                .object_by_id(&relation.subject)
                .map(|o| o.kind.as_str())
                .unwrap_or("");
            let object = scene_graph
                .object_by_id(&relation.object)
                .map(|o| o.kind.as_str())
                .unwrap_or("");
            if subject.is_empty() || object.is_empty() {
                continue;
            }

            let triplets = self.retrieve_relationship_knowledge(subject, &relation.predicate, object);
            if !triplets.is_empty() {
                knowledge.insert(
                    format!("{}-{}-{}", subject, relation.predicate, object),
                    triplets,
                );
            }
        }

        knowledge
    }
}
