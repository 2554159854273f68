//! 字元 n-gram TF-IDF 向量化，用於實體名稱的模糊比對。
//!
//! 行為對齊常見的 `char_wb` 分析器：先轉小寫、以空白切詞，每個詞前後補一個空白，
//! 只在詞內部取 n-gram；idf 採平滑公式 `ln((1 + n) / (1 + df)) + 1`，
//! 每列向量做 L2 正規化，因此餘弦相似度即為內積。

use std::collections::HashMap;

/// 稀疏向量：依 term 索引遞增排序的 (index, weight)
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TfidfConfig {
    pub min_n: usize,
    pub max_n: usize,
    pub max_features: Option<usize>,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            min_n: 3,
            max_n: 5,
            max_features: Some(5000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(config: TfidfConfig) -> Self {
        Self {
            config,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// 詞內字元 n-gram（char_wb）
    pub fn char_wb_ngrams(&self, text: &str) -> Vec<String> {
        let mut ngrams = Vec::new();
        let lowered = text.to_lowercase();

        for word in lowered.split_whitespace() {
            let padded: Vec<char> = std::iter::once(' ')
                .chain(word.chars())
                .chain(std::iter::once(' '))
                .collect();
            let w_len = padded.len();

            for n in self.config.min_n..=self.config.max_n {
                let mut offset = 0;
                ngrams.push(padded[offset..(offset + n).min(w_len)].iter().collect());
                while offset + n < w_len {
                    offset += 1;
                    ngrams.push(padded[offset..offset + n].iter().collect());
                }
                // 短詞只計一次
                if offset == 0 {
                    break;
                }
            }
        }

        ngrams
    }

    fn term_counts(&self, text: &str) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for gram in self.char_wb_ngrams(text) {
            *counts.entry(gram).or_insert(0) += 1;
        }
        counts
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Vec<SparseVector> {
        let doc_counts: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|doc| self.term_counts(doc.as_ref()))
            .collect();

        let mut corpus_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for counts in &doc_counts {
            for (term, count) in counts {
                *corpus_freq.entry(term.as_str()).or_insert(0) += count;
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        // 依總頻率取前 max_features 個，同頻以字典序決定
        let mut terms: Vec<(&str, usize)> = corpus_freq.into_iter().collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if let Some(limit) = self.config.max_features {
            terms.truncate(limit);
        }
        let mut kept: Vec<&str> = terms.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n_docs = documents.len() as f64;
        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(index, term)| (term.to_string(), index))
            .collect();
        self.idf = kept
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        doc_counts
            .iter()
            .map(|counts| self.weigh(counts))
            .collect()
    }

    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&self.term_counts(text))
    }

    fn weigh(&self, counts: &HashMap<String, usize>) -> SparseVector {
        let mut vector: SparseVector = counts
            .iter()
            .filter_map(|(term, count)| {
                self.vocabulary
                    .get(term)
                    .map(|&index| (index, *count as f64 * self.idf[index]))
            })
            .collect();
        vector.sort_unstable_by_key(|(index, _)| *index);

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, weight) in vector.iter_mut() {
                *weight /= norm;
            }
        }
        vector
    }
}

/// 兩個已正規化稀疏向量的餘弦相似度
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_wb_ngrams_stay_inside_words() {
        let vectorizer = TfidfVectorizer::new(TfidfConfig {
            min_n: 3,
            max_n: 3,
            max_features: None,
        });
        let grams = vectorizer.char_wb_ngrams("Lung");
        assert_eq!(grams, vec![" lu", "lun", "ung", "ng "]);
    }

    #[test]
    fn test_short_word_counted_once() {
        let vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        // " a " 長度 3：n=3 取一次後因 offset 為 0 而停止
        assert_eq!(vectorizer.char_wb_ngrams("a"), vec![" a "]);
    }

    #[test]
    fn test_identical_text_has_unit_similarity() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let docs = ["pleural effusion", "cardiomegaly", "pneumothorax"];
        let matrix = vectorizer.fit_transform(&docs);

        let query = vectorizer.transform("Pleural Effusion");
        let same = cosine_similarity(&query, &matrix[0]);
        let other = cosine_similarity(&query, &matrix[1]);

        assert!((same - 1.0).abs() < 1e-9);
        assert!(other < 0.1);
    }

    #[test]
    fn test_max_features_limits_vocabulary() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig {
            min_n: 3,
            max_n: 5,
            max_features: Some(10),
        });
        vectorizer.fit_transform(&["consolidation in the left lower lobe", "atelectasis"]);
        assert_eq!(vectorizer.vocabulary_size(), 10);
    }

    #[test]
    fn test_unknown_query_is_zero_vector() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let matrix = vectorizer.fit_transform(&["opacity"]);
        let query = vectorizer.transform("zzz");
        assert!(query.is_empty());
        assert_eq!(cosine_similarity(&query, &matrix[0]), 0.0);
    }
}
