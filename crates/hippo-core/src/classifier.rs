//! Text classification seam.
//!
//! The engine performs no language understanding itself. Whatever produces
//! working records implements [`Classifier`]; [`KeywordClassifier`] is a
//! lexicon-based stand-in until a model-backed classifier is plugged in.

use serde::{Deserialize, Serialize};

/// Tags a classifier attaches to raw text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub topic: Option<String>,
    pub emotion: Option<String>,
    /// 1-10
    pub importance: u8,
}

pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

/// Lexicon-driven classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordClassifier {
    /// Topic label and the words that signal it, checked in order
    pub topics: Vec<(String, Vec<String>)>,
    /// Emotion label and the words that signal it, checked in order
    pub emotions: Vec<(String, Vec<String>)>,
    /// Words that raise importance by one each
    pub emphasis: Vec<String>,
    pub base_importance: u8,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            topics: vec![
                ("travel".into(), words(&["trip", "flight", "travel", "vacation", "hotel", "airport"])),
                ("work".into(), words(&["work", "meeting", "deadline", "project", "boss", "office"])),
                ("health".into(), words(&["doctor", "sleep", "exercise", "gym", "sick", "health"])),
                ("family".into(), words(&["mom", "dad", "sister", "brother", "family", "kids"])),
                ("food".into(), words(&["dinner", "lunch", "breakfast", "recipe", "restaurant", "cook"])),
            ],
            emotions: vec![
                ("joy".into(), words(&["happy", "glad", "excited", "love", "great", "wonderful"])),
                ("sadness".into(), words(&["sad", "miss", "lonely", "down", "cry"])),
                ("anger".into(), words(&["angry", "furious", "annoyed", "hate", "frustrated"])),
                ("fear".into(), words(&["scared", "afraid", "worried", "anxious", "nervous"])),
            ],
            emphasis: words(&["important", "urgent", "remember", "never", "always", "must"]),
            base_importance: 4,
        }
    }
}

impl KeywordClassifier {
    fn first_match(table: &[(String, Vec<String>)], tokens: &[String]) -> Option<String> {
        table
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| tokens.contains(k)))
            .map(|(label, _)| label.clone())
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let topic = Self::first_match(&self.topics, &tokens);
        let emotion = Self::first_match(&self.emotions, &tokens);

        let emphasis = tokens.iter().filter(|t| self.emphasis.contains(t)).count();
        let exclaimed = text.contains('!') as usize;
        let felt = emotion.is_some() as usize * 2;

        let importance = (self.base_importance as usize + emphasis + exclaimed + felt).clamp(1, 10) as u8;

        Classification { topic, emotion, importance }
    }
}
