//! SMRAgents：以場景圖為中心的多專家會診流程。
//!
//! 每題依序執行：
//! 1. 視覺模型產生場景圖，若有知識庫則修正並驗證
//! 2. 全科醫師推薦專科與任務
//! 3. 專科專家提出意見
//! 4. 診斷專家綜合判斷
//! 5. 審查專家回饋，最多反覆 `max_feedback_iterations` 次
//! 6. 整合專家給出最終答案

use crate::adapters::registry::MethodKind;
use crate::core::prompts::{
    description_prompt, diagnostic_reassessment_prompt, expert_consultation_prompt,
    expert_diagnosis_prompt, expert_evaluation_followup_prompt, expert_evaluation_prompt,
    expert_opinions_prompt, integration_summary_prompt, specialists_rethink_prompt,
};
use crate::core::refiner::SceneGraphRefiner;
use crate::core::results::{output_file_name, ResultStore, ERROR_PREFIX};
use crate::domain::model::{AnswerRecord, RunSummary, Sample};
use crate::domain::ports::{ConfigProvider, LanguageModel, Method, Storage, VisionModel};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use crate::utils::text::preview;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const CONSISTENT_MARKER: &str = "all opinions are consistent";
const SPECIALIST_FEEDBACK_MARKER: &str = "Feedback to Specialist Experts:";
const DIAGNOSTIC_FEEDBACK_MARKER: &str = "Feedback to Diagnostic Specialist:";

const SCENE_GRAPH_PREVIEW: usize = 500;
const AGENT_PREVIEW: usize = 300;
const SPECIALIST_PREVIEW: usize = 200;

static CONSULTATION_EXPERT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Expert\s*:").expect("valid regex"));

// 專家意見的標題行，例如 `Expert (Radiology):` 或 `**Expert: Cardiology**`
static OPINION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t*#]*Expert[^\n:]*:").expect("valid regex"));

/// 從全科醫師的會診建議中取出每位專科專家的描述
pub fn extract_specialists(consultation: &str) -> Vec<String> {
    let markers: Vec<_> = CONSULTATION_EXPERT.find_iter(consultation).collect();

    markers
        .iter()
        .enumerate()
        .filter_map(|(i, marker)| {
            let end = markers
                .get(i + 1)
                .map(|next| next.start())
                .unwrap_or(consultation.len());
            let info = consultation[marker.end()..end].trim();
            (!info.is_empty()).then(|| info.to_string())
        })
        .collect()
}

/// 審查意見中給專科專家的回饋段落；診斷回饋標記出現在前面時視為沒有回饋
pub fn specialist_feedback(evaluation: &str) -> Option<&str> {
    let start = evaluation.find(SPECIALIST_FEEDBACK_MARKER)?;
    let end = match evaluation.find(DIAGNOSTIC_FEEDBACK_MARKER) {
        Some(end) if end < start => return None,
        Some(end) => end,
        None => evaluation.len(),
    };
    let feedback = evaluation[start..end].trim();
    (!feedback.is_empty()).then_some(feedback)
}

/// 一位專科專家的意見區塊
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialistOpinion {
    pub name: String,
    /// 含標題的原始文字
    pub text: String,
}

/// 依 `Expert ...:` 標題切分意見；找不到標題時回傳空陣列
pub fn split_specialist_opinions(opinions: &str) -> Vec<SpecialistOpinion> {
    let headers: Vec<_> = OPINION_HEADER.find_iter(opinions).collect();

    headers
        .iter()
        .enumerate()
        .filter_map(|(i, header)| {
            let end = headers
                .get(i + 1)
                .map(|next| next.start())
                .unwrap_or(opinions.len());
            let body = opinions[header.end()..end].trim();
            let name = specialist_name(header.as_str(), body);
            if name.is_empty() && body.is_empty() {
                return None;
            }
            Some(SpecialistOpinion {
                name,
                text: opinions[header.start()..end].trim().to_string(),
            })
        })
        .collect()
}

fn specialist_name(header: &str, body: &str) -> String {
    let label = header
        .trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '#')
        .trim_end_matches(':')
        .trim_start_matches("Expert");
    let label = label
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '*'))
        .to_string();

    if !label.is_empty() {
        return label;
    }

    body.lines()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| c.is_whitespace() || c == '*')
        .to_string()
}

pub struct SmrAgents<S: Storage, C: ConfigProvider> {
    config: C,
    dataset: Vec<Sample>,
    store: ResultStore<S>,
    language_model: Arc<dyn LanguageModel>,
    vision_model: Arc<dyn VisionModel>,
    refiner: Option<SceneGraphRefiner>,
    monitor: SystemMonitor,
}

impl<S: Storage, C: ConfigProvider> SmrAgents<S, C> {
    pub fn new(
        config: C,
        dataset: Vec<Sample>,
        storage: S,
        language_model: Arc<dyn LanguageModel>,
        vision_model: Arc<dyn VisionModel>,
    ) -> Self {
        let file_name = output_file_name(
            config.language_model_name(),
            config.visual_model_name(),
            config.method(),
            config.dataset_name(),
        );

        Self {
            config,
            dataset,
            store: ResultStore::new(storage, file_name),
            language_model,
            vision_model,
            refiner: None,
            monitor: SystemMonitor::default(),
        }
    }

    pub fn with_refiner(mut self, refiner: SceneGraphRefiner) -> Self {
        tracing::info!(
            "📚 場景圖修正器已啟用（{} 筆三元組，{} 個實體）",
            refiner.retriever().triplet_count(),
            refiner.retriever().entity_count()
        );
        self.refiner = Some(refiner);
        self
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn output_file_name(&self) -> &str {
        self.store.file_name()
    }

    pub fn results(&self) -> &ResultStore<S> {
        &self.store
    }

    fn trace(&self) -> bool {
        self.config.trace_agents()
    }

    async fn ask(&self, prompt: String, role: &str) -> Result<String> {
        let response = self.language_model.get_response(&prompt).await?;
        if self.trace() {
            tracing::info!("{}: {}", role, preview(&response, AGENT_PREVIEW));
        }
        Ok(response)
    }

    pub async fn generate_and_refine_scene_graph(&self, sample: &Sample) -> Result<String> {
        let initial = self
            .vision_model
            .get_response(&description_prompt(&sample.question), &sample.image_path)
            .await?;

        if self.trace() {
            tracing::info!(
                "Initial Scene Graph: {}",
                preview(&initial, SCENE_GRAPH_PREVIEW)
            );
        }

        let Some(refiner) = &self.refiner else {
            return Ok(initial);
        };

        let refined = refiner.refine_scene_graph(&initial, self.trace()).await?;
        let report = refiner.validate_scene_graph(&refined);

        if !report.is_valid {
            tracing::warn!(
                "⚠️ 修正後的場景圖驗證失敗，改用原始場景圖: {:?}",
                report.errors
            );
            return Ok(initial);
        }

        if self.trace() {
            tracing::info!(
                "Refined Scene Graph: {}",
                preview(&refined, SCENE_GRAPH_PREVIEW)
            );
            if !report.warnings.is_empty() {
                tracing::info!("Validation warnings: {:?}", report.warnings);
            }
        }

        Ok(refined)
    }

    /// 回傳 (專家意見, 診斷, 是否繼續)
    pub async fn process_feedback_iteration(
        &self,
        question: &str,
        description: &str,
        experts_opinions: String,
        expert_diagnosis: String,
        iteration: usize,
    ) -> Result<(String, String, bool)> {
        let prompt = if iteration == 0 {
            expert_evaluation_prompt(question, description, &expert_diagnosis, &experts_opinions)
        } else {
            expert_evaluation_followup_prompt(
                question,
                description,
                &experts_opinions,
                &expert_diagnosis,
            )
        };
        let evaluation = self
            .ask(
                prompt,
                &format!("Iteration {} - Review Expert's Evaluation", iteration + 1),
            )
            .await?;

        if evaluation.to_lowercase().contains(CONSISTENT_MARKER) {
            tracing::debug!("審查專家認為意見一致，結束回饋（第 {} 輪）", iteration + 1);
            return Ok((experts_opinions, expert_diagnosis, false));
        }

        let mut experts_opinions = experts_opinions;
        let mut expert_diagnosis = expert_diagnosis;

        if let Some(feedback) = specialist_feedback(&evaluation) {
            experts_opinions = self
                .update_specialist_opinions(question, description, &experts_opinions, feedback)
                .await?;
        }

        if evaluation.contains(DIAGNOSTIC_FEEDBACK_MARKER) {
            expert_diagnosis = self
                .ask(
                    diagnostic_reassessment_prompt(question, description, &experts_opinions),
                    "Updated Diagnostic Expert's Diagnosis",
                )
                .await?;
        }

        Ok((experts_opinions, expert_diagnosis, true))
    }

    /// 回饋中點名的專家重新作答，其餘保留原意見
    pub async fn update_specialist_opinions(
        &self,
        question: &str,
        description: &str,
        current_opinions: &str,
        feedback: &str,
    ) -> Result<String> {
        let specialists = split_specialist_opinions(current_opinions);
        if specialists.is_empty() {
            tracing::debug!("專家意見中找不到 Expert 標題，保留原意見");
            return Ok(current_opinions.to_string());
        }

        let feedback_lower = feedback.to_lowercase();
        let mut updated = Vec::with_capacity(specialists.len());

        for specialist in specialists {
            let mentioned = !specialist.name.is_empty()
                && feedback_lower.contains(&specialist.name.to_lowercase());

            if mentioned {
                let opinion = self
                    .language_model
                    .get_response(&specialists_rethink_prompt(question, description, feedback))
                    .await?;
                if self.trace() {
                    tracing::info!(
                        "Updated opinion for {}: {}",
                        specialist.name,
                        preview(&opinion, SPECIALIST_PREVIEW)
                    );
                }
                updated.push(format!("Expert: {}\n{}", specialist.name, opinion));
            } else {
                updated.push(specialist.text);
            }
        }

        Ok(updated.join("\n\n"))
    }

    pub async fn answer_sample(&self, sample: &Sample) -> Result<String> {
        let question = sample.question.as_str();

        let description = self.generate_and_refine_scene_graph(sample).await?;

        let consultation = self
            .ask(
                expert_consultation_prompt(question, &description),
                "Expert Consultation",
            )
            .await?;
        tracing::debug!(
            "推薦 {} 位專科專家",
            extract_specialists(&consultation).len()
        );

        let mut experts_opinions = self
            .ask(
                expert_opinions_prompt(question, &description, &consultation),
                "Specialists' Opinions",
            )
            .await?;

        let mut expert_diagnosis = self
            .ask(
                expert_diagnosis_prompt(question, &description, &experts_opinions),
                "Diagnostic Expert's Diagnosis",
            )
            .await?;

        for iteration in 0..self.config.max_feedback_iterations() {
            let (opinions, diagnosis, should_continue) = self
                .process_feedback_iteration(
                    question,
                    &description,
                    experts_opinions,
                    expert_diagnosis,
                    iteration,
                )
                .await?;
            experts_opinions = opinions;
            expert_diagnosis = diagnosis;
            if !should_continue {
                break;
            }
        }

        let all_opinions = format!("{}\n\n{}", experts_opinions, expert_diagnosis);
        self.ask(
            integration_summary_prompt(question, &description, &all_opinions),
            "Final Answer",
        )
        .await
    }

    async fn pause_between_requests(&self) {
        let delay = self.config.request_delay_ms();
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl<S: Storage, C: ConfigProvider> Method for SmrAgents<S, C> {
    fn name(&self) -> &str {
        MethodKind::SmrAgents.name()
    }

    async fn run(&self) -> Result<RunSummary> {
        let total = self.dataset.len();
        let mut summary = RunSummary {
            output_path: self.store.location(),
            ..RunSummary::default()
        };

        for round in 0..self.config.max_retries() {
            let todo = self.store.unfinished(total).await?;
            if todo.is_empty() {
                tracing::info!("✅ All questions have been answered.");
                break;
            }

            summary.rounds = round + 1;
            tracing::info!(
                "🔄 Start {} round of answering questions ({} pending)",
                round + 1,
                todo.len()
            );
            self.monitor.log_round_stats(round + 1, todo.len());

            for (position, index) in todo.iter().enumerate() {
                let Some(sample) = self.dataset.get(*index) else {
                    continue;
                };
                tracing::debug!("[{}/{}] 第 {} 題", position + 1, todo.len(), index);

                let prediction = match self.answer_sample(sample).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        tracing::warn!("❌ Error processing question {}: {}", index, e);
                        format!("{}{}", ERROR_PREFIX, e)
                    }
                };

                self.store
                    .record(AnswerRecord {
                        index: sample.index,
                        question: sample.question.clone(),
                        ground_truth: sample.answer.clone(),
                        prediction,
                    })
                    .await?;

                self.pause_between_requests().await;
            }
        }

        let recorded = self.store.load().await?.len();
        summary.failed = self.store.failed_count().await?;
        summary.answered = recorded - summary.failed;
        summary.remaining = self.store.unfinished(total).await?.len();

        tracing::info!(
            "📊 作答完成: {} 題成功, {} 題失敗, {} 題未完成",
            summary.answered,
            summary.failed,
            summary.remaining
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::utils::error::SmrError;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 依序回傳預先排好的回應，並記錄收到的提示詞
    struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(|r| Ok(r.to_string())).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::from([Err(SmrError::ProcessingError {
                    message: message.to_string(),
                })])),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("Interpretation: default\nAnswer: yes.".to_string()))
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn get_response(&self, prompt: &str) -> Result<String> {
            self.next(prompt)
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn get_response(&self, prompt: &str, _image_path: &Path) -> Result<String> {
            self.next(prompt)
        }
    }

    struct TestConfig {
        max_retries: usize,
    }

    impl ConfigProvider for TestConfig {
        fn dataset_name(&self) -> &str {
            "vqa_rad"
        }
        fn language_model_name(&self) -> &str {
            "gpt-3.5-turbo"
        }
        fn visual_model_name(&self) -> &str {
            "qwen2-VL-7B"
        }
        fn method(&self) -> &str {
            "SMRAgents"
        }
        fn max_retries(&self) -> usize {
            self.max_retries
        }
        fn trace_agents(&self) -> bool {
            true
        }
    }

    fn sample(index: usize) -> Sample {
        Sample {
            index,
            image_path: PathBuf::from(format!("images/{}.jpg", index)),
            question: format!("Is there an abnormality in image {}?", index),
            answer: "yes".to_string(),
        }
    }

    fn agents(
        dir: &TempDir,
        dataset: Vec<Sample>,
        language: Arc<ScriptedModel>,
        vision: Arc<ScriptedModel>,
    ) -> SmrAgents<LocalStorage, TestConfig> {
        SmrAgents::new(
            TestConfig { max_retries: 2 },
            dataset,
            LocalStorage::new(dir.path()),
            language,
            vision,
        )
    }

    #[test]
    fn test_extract_specialists() {
        let consultation = "Expert: Radiologist - assess the lung fields.\n\
                            Expert : Cardiologist - evaluate heart size.\nExpert:   ";
        assert_eq!(
            extract_specialists(consultation),
            vec![
                "Radiologist - assess the lung fields.".to_string(),
                "Cardiologist - evaluate heart size.".to_string()
            ]
        );
        assert!(extract_specialists("No specialists needed").is_empty());
    }

    #[test]
    fn test_split_specialist_opinions_uses_header_names() {
        let opinions = "Expert (Radiology):\nThe left lung shows opacity.\n\n\
                        **Expert (Cardiology):**\nHeart size is normal.";
        let blocks = split_specialist_opinions(opinions);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "Radiology");
        assert_eq!(blocks[0].text, "Expert (Radiology):\nThe left lung shows opacity.");
        assert_eq!(blocks[1].name, "Cardiology");
    }

    #[test]
    fn test_split_specialist_opinions_falls_back_to_first_line() {
        let blocks = split_specialist_opinions("Expert:\nPulmonology\nNo effusion.");
        assert_eq!(blocks[0].name, "Pulmonology");
        assert!(split_specialist_opinions("Plain text with no headers").is_empty());
    }

    #[tokio::test]
    async fn test_update_rethinks_only_mentioned_specialists() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec!["The opacity is likely pneumonia."]);
        let runner = agents(&dir, vec![], language.clone(), ScriptedModel::new(vec![]));

        let opinions = "Expert (Radiology):\nOpacity in the left lung.\n\n\
                        Expert (Cardiology):\nNormal heart.";
        let feedback = "Feedback to Specialist Experts:\nradiology should reconsider the opacity.";

        let updated = runner
            .update_specialist_opinions("Q", "graph", opinions, feedback)
            .await
            .unwrap();

        assert_eq!(
            updated,
            "Expert: Radiology\nThe opacity is likely pneumonia.\n\n\
             Expert (Cardiology):\nNormal heart."
        );
        let prompts = language.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Review Expert's Feedback:\nFeedback to Specialist Experts:"));
    }

    #[tokio::test]
    async fn test_update_keeps_opinions_without_headers() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec![]);
        let runner = agents(&dir, vec![], language.clone(), ScriptedModel::new(vec![]));

        let updated = runner
            .update_specialist_opinions("Q", "graph", "free text opinion", "Feedback to Specialist Experts: x")
            .await
            .unwrap();
        assert_eq!(updated, "free text opinion");
        assert!(language.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_iteration_stops_when_consistent() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec!["Review Analysis: ok. All Opinions Are Consistent."]);
        let runner = agents(&dir, vec![], language.clone(), ScriptedModel::new(vec![]));

        let (opinions, diagnosis, should_continue) = runner
            .process_feedback_iteration("Q", "graph", "ops".into(), "diag".into(), 0)
            .await
            .unwrap();

        assert!(!should_continue);
        assert_eq!((opinions.as_str(), diagnosis.as_str()), ("ops", "diag"));
        assert!(language.prompts()[0].contains("Your task is to analyze and critique"));
    }

    #[tokio::test]
    async fn test_feedback_iteration_updates_specialists_and_diagnosis() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec![
            "Review Analysis:\nmixed\nFeedback to Specialist Experts:\nRadiology: recheck.\nFeedback to Diagnostic Specialist:\nreconsider.",
            "Updated Reasoning and Answers: consolidation present",
            "Updated Diagnostic Reasoning: pneumonia",
        ]);
        let runner = agents(&dir, vec![], language.clone(), ScriptedModel::new(vec![]));

        let (opinions, diagnosis, should_continue) = runner
            .process_feedback_iteration(
                "Q",
                "graph",
                "Expert (Radiology):\nopacity".into(),
                "diag".into(),
                1,
            )
            .await
            .unwrap();

        assert!(should_continue);
        assert_eq!(
            opinions,
            "Expert: Radiology\nUpdated Reasoning and Answers: consolidation present"
        );
        assert_eq!(diagnosis, "Updated Diagnostic Reasoning: pneumonia");

        let prompts = language.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("Updated Specialist Experts' Opinions:\nExpert (Radiology):"));
        // 只把專科回饋段落交給專家，不含給診斷專家的部分
        assert!(prompts[1].contains("Feedback to Specialist Experts:\nRadiology: recheck."));
        assert!(!prompts[1].contains("reconsider."));
        assert!(prompts[2].contains("Expert: Radiology\nUpdated Reasoning"));
    }

    #[test]
    fn test_specialist_feedback_slice() {
        let evaluation = "Review Analysis: mixed\nFeedback to Specialist Experts: Radiology: recheck.\nFeedback to Diagnostic Specialist: reconsider.";
        assert_eq!(
            specialist_feedback(evaluation),
            Some("Feedback to Specialist Experts: Radiology: recheck.")
        );
        assert_eq!(
            specialist_feedback("Feedback to Specialist Experts: Radiology: recheck."),
            Some("Feedback to Specialist Experts: Radiology: recheck.")
        );
        assert_eq!(specialist_feedback("Review Analysis: fine"), None);
    }

    #[test]
    fn test_specialist_feedback_after_diagnostic_marker_is_ignored() {
        let evaluation = "Feedback to Diagnostic Specialist: reconsider.\nFeedback to Specialist Experts: Radiology: recheck.";
        assert_eq!(specialist_feedback(evaluation), None);
    }

    #[tokio::test]
    async fn test_feedback_iteration_with_reversed_markers_only_reassesses_diagnosis() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec![
            "Feedback to Diagnostic Specialist: reconsider.\nFeedback to Specialist Experts: Radiology: recheck.",
            "Updated Diagnostic Reasoning: pneumonia",
        ]);
        let runner = agents(&dir, vec![], language.clone(), ScriptedModel::new(vec![]));

        let (opinions, diagnosis, should_continue) = runner
            .process_feedback_iteration(
                "Q",
                "graph",
                "Expert (Radiology):\nold".into(),
                "diag".into(),
                0,
            )
            .await
            .unwrap();

        assert!(should_continue);
        assert_eq!(opinions, "Expert (Radiology):\nold");
        assert_eq!(diagnosis, "Updated Diagnostic Reasoning: pneumonia");
        assert_eq!(language.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_answer_sample_runs_full_pipeline() {
        let dir = TempDir::new().unwrap();
        let vision = ScriptedModel::new(vec!["{\"objects\": []}"]);
        let language = ScriptedModel::new(vec![
            "Expert: Radiologist - check lungs",
            "Expert (Radiologist):\nNo abnormality.",
            "Diagnosis: normal",
            "All opinions are consistent.",
            "Interpretation: normal study\nAnswer: no.",
        ]);
        let runner = agents(&dir, vec![sample(0)], language.clone(), vision.clone());

        let answer = runner.answer_sample(&sample(0)).await.unwrap();

        assert_eq!(answer, "Interpretation: normal study\nAnswer: no.");
        assert!(vision.prompts()[0].contains("Is there an abnormality in image 0?"));
        let prompts = language.prompts();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[4].contains(
            "These are the opinions and reasoning of the experts:\nExpert (Radiologist):\nNo abnormality.\n\nDiagnosis: normal\n"
        ));
    }

    #[tokio::test]
    async fn test_feedback_loop_is_capped() {
        let dir = TempDir::new().unwrap();
        let vision = ScriptedModel::new(vec!["graph"]);
        let language = ScriptedModel::new(vec![
            "consultation",
            "opinions",
            "diagnosis",
            "Review Analysis: keep going",
            "Review Analysis: keep going",
            "Review Analysis: keep going",
            "Answer: yes.",
        ]);
        let runner = agents(&dir, vec![sample(0)], language.clone(), vision);

        let answer = runner.answer_sample(&sample(0)).await.unwrap();

        assert_eq!(answer, "Answer: yes.");
        let prompts = language.prompts();
        assert_eq!(prompts.len(), 7);
        assert!(prompts[3].contains("Your task is to analyze and critique"));
        assert!(prompts[4].contains("Based on the updated opinions from the Specialist Experts"));
    }

    #[tokio::test]
    async fn test_run_records_errors_and_retries_them() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec![]);
        let vision = ScriptedModel::failing("vision endpoint unavailable");
        let runner = agents(&dir, vec![sample(0)], language, vision)
            .with_monitor(SystemMonitor::new(true));

        let summary = runner.run().await.unwrap();

        // 第一輪失敗、第二輪預設回應成功
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.answered, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.remaining, 0);
        assert_eq!(
            summary.output_path,
            dir.path()
                .join("vqa_rad_SMRAgents_gpt-3.5-turbo_qwen2-VL-7B_results.json")
                .display()
                .to_string()
        );

        let records = runner.results().load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ground_truth, "yes");
        assert!(!records[0].prediction.starts_with(ERROR_PREFIX));
    }

    #[tokio::test]
    async fn test_run_skips_finished_questions() {
        let dir = TempDir::new().unwrap();
        let language = ScriptedModel::new(vec![]);
        let vision = ScriptedModel::new(vec![]);
        let runner = agents(&dir, vec![sample(0), sample(1)], language, vision.clone());

        runner
            .results()
            .record(AnswerRecord {
                index: 0,
                question: sample(0).question,
                ground_truth: "yes".to_string(),
                prediction: "Answer: yes.".to_string(),
            })
            .await
            .unwrap();

        let summary = runner.run().await.unwrap();

        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.answered, 2);
        assert_eq!(vision.prompts().len(), 1);
        assert!(vision.prompts()[0].contains("image 1"));
    }

    #[tokio::test]
    async fn test_run_reports_persistent_failures() {
        let dir = TempDir::new().unwrap();
        let runner = SmrAgents::new(
            TestConfig { max_retries: 1 },
            vec![sample(0)],
            LocalStorage::new(dir.path()),
            ScriptedModel::new(vec![]),
            ScriptedModel::failing("boom"),
        );

        let summary = runner.run().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.remaining, 1);
        let records = runner.results().load().await.unwrap();
        assert!(records[0].prediction.starts_with("Error: "));
        assert!(records[0].prediction.contains("boom"));
    }
}
