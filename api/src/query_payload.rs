use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AskPayload {
    pub question: String,
    pub model: Option<String>,
    pub collection: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestPayload {
    pub document_id: String,
    pub text: String,
    pub collection: Option<String>,
}
