use serde::{Deserialize, Serialize};

/// Suffix the document-processing pipeline appends to the correct option.
pub const CORRECT_MARKER: &str = "[correct]";

pub const DEFAULT_QUESTION_KIND: &str = "multiple_options";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub text: String,
    pub is_correct: bool,
}

impl AnswerOption {
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            is_correct,
        }
    }

    /// Parses the stored `"Option text [correct]"` form.
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim_end();
        match trimmed.strip_suffix(CORRECT_MARKER) {
            Some(text) => Self::new(text.trim(), true),
            None => Self::new(trimmed.trim(), false),
        }
    }

    pub fn encode(&self) -> String {
        if self.is_correct {
            format!("{} {}", self.text, CORRECT_MARKER)
        } else {
            self.text.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub body: String,
    pub options: Vec<AnswerOption>,
    pub explanation: Option<String>,
    pub kind: String,
    pub difficulty: Option<String>,
    pub domain_id: Option<String>,
    pub repository_id: Option<String>,
    pub is_sample: bool,
}

impl Question {
    pub fn new(id: impl Into<String>, body: impl Into<String>, options: Vec<AnswerOption>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            options,
            explanation: None,
            kind: DEFAULT_QUESTION_KIND.to_string(),
            difficulty: None,
            domain_id: None,
            repository_id: None,
            is_sample: false,
        }
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// Canonical correct original index: the first option flagged correct.
    pub fn correct_index(&self) -> Option<usize> {
        self.options.iter().position(|option| option.is_correct)
    }
}

/// Storage shape of a question row, options kept in marker-encoded form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default, alias = "resource_repository_id")]
    pub repository_id: Option<String>,
    #[serde(default)]
    pub is_sample: bool,
}

impl From<QuestionDocument> for Question {
    fn from(doc: QuestionDocument) -> Self {
        Self {
            id: doc.id,
            body: doc.body,
            options: doc.options.iter().map(|raw| AnswerOption::decode(raw)).collect(),
            explanation: doc.explanation.filter(|text| !text.trim().is_empty()),
            kind: doc
                .kind
                .unwrap_or_else(|| DEFAULT_QUESTION_KIND.to_string()),
            difficulty: doc.difficulty,
            domain_id: doc.domain_id,
            repository_id: doc.repository_id,
            is_sample: doc.is_sample,
        }
    }
}

impl From<&Question> for QuestionDocument {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            body: question.body.clone(),
            options: question.options.iter().map(AnswerOption::encode).collect(),
            explanation: question.explanation.clone(),
            kind: Some(question.kind.clone()),
            difficulty: question.difficulty.clone(),
            domain_id: question.domain_id.clone(),
            repository_id: question.repository_id.clone(),
            is_sample: question.is_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_marker_suffix() {
        let option = AnswerOption::decode("Paris [correct]");
        assert_eq!(option, AnswerOption::new("Paris", true));

        let option = AnswerOption::decode("Lyon");
        assert_eq!(option, AnswerOption::new("Lyon", false));
    }

    #[test]
    fn decode_tolerates_trailing_whitespace() {
        let option = AnswerOption::decode("Paris [correct]  \n");
        assert!(option.is_correct);
        assert_eq!(option.text, "Paris");
    }

    #[test]
    fn marker_inside_text_is_not_a_flag() {
        let option = AnswerOption::decode("[correct] is a marker, not this");
        assert!(!option.is_correct);
    }

    #[test]
    fn encode_appends_marker_only_to_correct_option() {
        assert_eq!(AnswerOption::new("Paris", true).encode(), "Paris [correct]");
        assert_eq!(AnswerOption::new("Lyon", false).encode(), "Lyon");
    }

    #[test]
    fn document_conversion_parses_options_at_boundary() {
        let doc = QuestionDocument {
            id: "q1".to_string(),
            body: "Capital of France?".to_string(),
            options: vec![
                "Lyon".to_string(),
                "Paris [correct]".to_string(),
                "Nice".to_string(),
            ],
            explanation: Some("   ".to_string()),
            kind: None,
            difficulty: None,
            domain_id: Some("d1".to_string()),
            repository_id: None,
            is_sample: false,
        };

        let question = Question::from(doc);
        assert_eq!(question.correct_index(), Some(1));
        assert_eq!(question.kind, DEFAULT_QUESTION_KIND);
        assert_eq!(question.explanation, None);

        let back = QuestionDocument::from(&question);
        assert_eq!(back.options[1], "Paris [correct]");
    }

    #[test]
    fn question_without_flagged_option_has_no_correct_index() {
        let question = Question::new("q", "?", vec![AnswerOption::new("a", false)]);
        assert_eq!(question.correct_index(), None);
    }
}
