#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use kb_mcp_server::handlers;
use kb_mcp_server::inference::{CompletionBackend, CompletionRequest, InferenceError};
use kb_mcp_server::registry::Registry;
use kb_mcp_server::store::{HeaderMode, KnowledgeBase};

pub const SAMPLE_KB: &str = "1. GADGETS\n- Portal gun\n\n2. ENEMIES\n- Jerry";

/// Backend that records every request and answers with a fixed reply.
#[derive(Default)]
pub struct RecordingBackend {
    pub reply: String,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingBackend {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.requests.lock().unwrap().last().map(|r| r.prompt.clone())
    }
}

impl CompletionBackend for RecordingBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.reply.clone())
    }
}

/// Backend whose model file is always missing.
pub struct MissingModelBackend;

impl CompletionBackend for MissingModelBackend {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
        Err(InferenceError::ModelNotFound("models/missing.gguf".into()))
    }
}

pub fn write_kb(dir: &Path, content: &str) -> KnowledgeBase {
    let path = dir.join("kb.txt");
    std::fs::write(&path, content).unwrap();
    KnowledgeBase::new(path, HeaderMode::Strict)
}

pub fn kb_registry(kb: KnowledgeBase, backend: Arc<dyn CompletionBackend>) -> Registry {
    handlers::knowledge_base::registry(kb, backend).unwrap()
}
