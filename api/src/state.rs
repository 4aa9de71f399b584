use grounded_rag::RagLibrary;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagLibrary>,
}

impl AppState {
    pub fn new(rag: RagLibrary) -> Self {
        Self { rag: Arc::new(rag) }
    }
}
