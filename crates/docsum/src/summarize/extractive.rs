use crate::error::SummarizeError;
use crate::summarize::{truncate_words, Summarizer, SummaryOptions, SummaryStyle};

/// Picks leading sentences of the document until `max_new_tokens` words.
///
/// Used when the crate is built without the "ai" feature, and in tests.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_input_tokens: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_input_tokens: usize) -> Self {
        Self { max_input_tokens }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, text: &str, options: &SummaryOptions) -> Result<String, SummarizeError> {
        options.validate()?;

        let input = truncate_words(text, self.max_input_tokens);
        let summary = leading_sentences(input, options.max_new_tokens, options.style);
        if summary.is_empty() {
            return Err(SummarizeError::EmptyOutput);
        }
        Ok(summary)
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if boundary {
                let end = i + c.len_utf8();
                sentences.push(text[start..end].trim());
                start = end;
            }
        }
    }
    if start < text.len() {
        sentences.push(text[start..].trim());
    }

    sentences.retain(|s| !s.is_empty());
    sentences
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn leading_sentences(text: &str, max_words: usize, style: Option<SummaryStyle>) -> String {
    let mut sentences = split_sentences(text);
    if style == Some(SummaryStyle::Formal) {
        let declarative: Vec<&str> = sentences
            .iter()
            .copied()
            .filter(|s| !s.ends_with('!') && !s.ends_with('?'))
            .collect();
        if !declarative.is_empty() {
            sentences = declarative;
        }
    }

    let mut picked: Vec<&str> = Vec::new();
    let mut words = 0;
    for sentence in sentences {
        let n = word_count(sentence);
        if words + n > max_words {
            if picked.is_empty() {
                // a single overlong sentence is cut rather than dropped
                picked.push(truncate_words(sentence, max_words));
            }
            break;
        }
        words += n;
        picked.push(sentence);
    }

    picked
        .iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Revenue grew by ten percent. Costs were flat! Can margins hold? \
                        The board approved the plan.";

    fn options(max_new_tokens: usize, style: Option<SummaryStyle>) -> SummaryOptions {
        SummaryOptions {
            max_new_tokens,
            style,
        }
    }

    #[test]
    fn test_split_sentences_keeps_decimals() {
        let sentences = split_sentences("Pi is 3.14 roughly. Next one");
        assert_eq!(sentences, vec!["Pi is 3.14 roughly.", "Next one"]);
    }

    #[test]
    fn test_leading_sentences_within_budget() {
        let summary = ExtractiveSummarizer::default()
            .summarize(TEXT, &options(8, None))
            .unwrap();
        assert_eq!(summary, "Revenue grew by ten percent. Costs were flat!");
    }

    #[test]
    fn test_formal_style_skips_exclamations_and_questions() {
        let summary = ExtractiveSummarizer::default()
            .summarize(TEXT, &options(50, Some(SummaryStyle::Formal)))
            .unwrap();
        assert_eq!(
            summary,
            "Revenue grew by ten percent. The board approved the plan."
        );
    }

    #[test]
    fn test_overlong_first_sentence_is_cut() {
        let summary = ExtractiveSummarizer::default()
            .summarize("one two three four five six.", &options(3, None))
            .unwrap();
        assert_eq!(summary, "one two three");
    }

    #[test]
    fn test_input_truncated_to_budget() {
        let summary = ExtractiveSummarizer::new(3)
            .summarize("alpha beta gamma delta epsilon", &options(100, None))
            .unwrap();
        assert_eq!(summary, "alpha beta gamma");
    }

    #[test]
    fn test_empty_text_is_error() {
        assert!(matches!(
            ExtractiveSummarizer::default().summarize("   ", &SummaryOptions::default()),
            Err(SummarizeError::EmptyOutput)
        ));
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(matches!(
            ExtractiveSummarizer::default().summarize(TEXT, &options(0, None)),
            Err(SummarizeError::InvalidOptions(_))
        ));
    }
}
