use serde::Deserialize;

/// Body of `/get_answer/`: a raw prompt sent straight to the model.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerRequest {
    pub model: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
}
