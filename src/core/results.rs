use crate::domain::model::AnswerRecord;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::collections::HashSet;

/// 作答失敗時寫入的預測前綴；帶此前綴的紀錄在下一輪會重新作答
pub const ERROR_PREFIX: &str = "Error: ";

/// `{dataset}_{method}_{language}_{visual}_results.json`
pub fn output_file_name(
    language_model: &str,
    visual_model: &str,
    method: &str,
    dataset: &str,
) -> String {
    let raw = format!(
        "{}_{}_{}_{}_results.json",
        dataset, method, language_model, visual_model
    );
    // 模型名稱可能含有 '/'（例如 Qwen/Qwen2-VL-7B-Instruct）
    raw.replace(['/', '\\'], "-")
}

/// 以 index 為鍵的結果檔，寫入時依 index 排序
pub struct ResultStore<S: Storage> {
    storage: S,
    file_name: String,
}

impl<S: Storage> ResultStore<S> {
    pub fn new(storage: S, file_name: impl Into<String>) -> Self {
        Self {
            storage,
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn location(&self) -> String {
        self.storage.location(&self.file_name)
    }

    pub async fn load(&self) -> Result<Vec<AnswerRecord>> {
        if !self.storage.exists(&self.file_name).await {
            return Ok(Vec::new());
        }
        let data = self.storage.read_file(&self.file_name).await?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// 同 index 覆寫，否則新增
    pub async fn record(&self, record: AnswerRecord) -> Result<()> {
        let mut records = self.load().await?;

        match records.iter_mut().find(|r| r.index == record.index) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        records.sort_by_key(|r| r.index);

        let json = serde_json::to_string_pretty(&records)?;
        self.storage
            .write_file(&self.file_name, json.as_bytes())
            .await?;
        Ok(())
    }

    /// 尚未完成（不存在或上次失敗）的題目 index
    pub async fn unfinished(&self, total: usize) -> Result<Vec<usize>> {
        let finished: HashSet<usize> = self
            .load()
            .await?
            .into_iter()
            .filter(|r| !r.prediction.starts_with(ERROR_PREFIX))
            .map(|r| r.index)
            .collect();

        Ok((0..total).filter(|i| !finished.contains(i)).collect())
    }

    pub async fn failed_count(&self) -> Result<usize> {
        Ok(self
            .load()
            .await?
            .iter()
            .filter(|r| r.prediction.starts_with(ERROR_PREFIX))
            .count())
    }
}
