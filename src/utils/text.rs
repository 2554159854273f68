//! 模型輸出的文字處理工具。

/// 取前 `max_chars` 個字元作為日誌預覽（以字元計，避免切斷 UTF-8）
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// 字串值直接取出，其餘值用 JSON 表示
pub fn json_value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 從模型回應中取出 JSON 物件文字。
///
/// 模型常把 JSON 包在 ```json ... ``` 區塊中，或前後夾帶說明文字；
/// 先剝掉 code fence，再取最外層的 `{ ... }`。
pub fn extract_json_object(raw_text: &str) -> Option<&str> {
    let trimmed = raw_text.trim();

    let body = if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_lang = after_fence
            .strip_prefix("json")
            .or_else(|| after_fence.strip_prefix("JSON"))
            .unwrap_or(after_fence);
        match after_lang.find("```") {
            Some(end) => &after_lang[..end],
            None => after_lang,
        }
    } else {
        trimmed
    };

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if start < end {
        Some(&body[start..=end])
    } else {
        None
    }
}
