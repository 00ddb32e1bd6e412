use super::{SummarizationClient, SummarizationClientError, SummaryBounds};
use async_trait::async_trait;

/// Deterministic summarizer that keeps leading sentences within the word budget.
///
/// Used when no model runtime is configured, and handy in tests because it never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveSummarizationClient;

impl ExtractiveSummarizationClient {
    /// Create a new extractive client.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SummarizationClient for ExtractiveSummarizationClient {
    async fn summarize(
        &self,
        texts: &[String],
        bounds: SummaryBounds,
    ) -> Result<Vec<String>, SummarizationClientError> {
        Ok(texts
            .iter()
            .map(|text| extractive_summary(text, bounds.max_length))
            .collect())
    }
}

/// Build a summary from whole leading sentences bounded by `max_words`.
///
/// When the very first sentence already exceeds the budget it is cut at `max_words`.
pub fn extractive_summary(text: &str, max_words: usize) -> String {
    let mut picked: Vec<String> = Vec::new();
    let mut used_words = 0usize;

    for sentence in split_sentences(text) {
        let words = count_words(sentence);
        if words == 0 {
            continue;
        }
        if used_words + words > max_words {
            if picked.is_empty() && max_words > 0 {
                picked.push(truncate_words(sentence, max_words));
            }
            break;
        }
        used_words += words;
        picked.push(normalize_spaces(sentence));
        if used_words >= max_words {
            break;
        }
    }

    picked.join(" ")
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars
                .peek()
                .map(|(_, next)| next.is_whitespace())
                .unwrap_or(true);
            if at_boundary {
                let end = index + c.len_utf8();
                sentences.push(text[start..end].trim());
                start = end;
            }
        }
    }
    if start < text.len() {
        sentences.push(text[start..].trim());
    }
    sentences.retain(|sentence| !sentence.is_empty());
    sentences
}

fn normalize_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_whole_sentences_within_budget() {
        let text = "First sentence here. Second one follows! Third is dropped?";
        assert_eq!(
            extractive_summary(text, 6),
            "First sentence here. Second one follows!"
        );
    }

    #[test]
    fn truncates_single_overlong_sentence() {
        let text = "one two three four five six seven";
        assert_eq!(extractive_summary(text, 3), "one two three");
    }

    #[test]
    fn decimal_points_do_not_split_sentences() {
        let sentences = split_sentences("Pi is 3.14 roughly. Done.");
        assert_eq!(sentences, vec!["Pi is 3.14 roughly.", "Done."]);
    }

    #[test]
    fn empty_input_and_zero_budget_yield_empty_summary() {
        assert_eq!(extractive_summary("", 10), "");
        assert_eq!(extractive_summary("Some text.", 0), "");
    }

    #[tokio::test]
    async fn client_returns_one_summary_per_text() {
        let client = ExtractiveSummarizationClient::new();
        let texts = vec!["A. B.".to_string(), String::new(), "C d e.".to_string()];
        let summaries = client
            .summarize(&texts, SummaryBounds::new(2, 1))
            .await
            .expect("summaries");
        assert_eq!(summaries, vec!["A. B.", "", "C d"]);
    }
}
