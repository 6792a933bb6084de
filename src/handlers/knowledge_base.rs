use std::sync::Arc;

use serde_json::Value;

use crate::config::Profile;
use crate::inference::{ChatMessage, CompletionBackend, CompletionRequest};
use crate::registry::{Param, Registry, RegistryError, Resource, Tool, ValueKind};
use crate::store::KnowledgeBase;

/// URI of the whole document.
pub const MAIN_URI: &str = "kb://main";

/// URI template of a single section.
pub const SECTION_URI: &str = "kb://section/{section_number}";

/// System message for `query_kb`, followed by the document text.
const QUERY_INSTRUCTIONS: &str = "You are the knowledge base owner's AI assistant. You have access to their knowledge base.\n\
Use the knowledge base to answer questions accurately, in the owner's own voice and tone.\n\
Knowledge base:\n";

/// Registry for the `knowledge-base` profile: the document and its sections
/// as resources, plus query, add-entry and create-section tools.
pub fn registry(
    kb: KnowledgeBase,
    backend: Arc<dyn CompletionBackend>,
) -> Result<Registry, RegistryError> {
    let kb = Arc::new(kb);
    let mut registry = Registry::new(Profile::KnowledgeBase.server_name());

    let store = Arc::clone(&kb);
    registry.register_resource(Resource::fixed(
        MAIN_URI,
        "knowledge-base",
        "The entire knowledge base",
        move || Ok(store.read()?),
    )?)?;

    let store = Arc::clone(&kb);
    registry.register_resource(Resource::template(
        SECTION_URI,
        "knowledge-base-section",
        "One numbered section of the knowledge base",
        move |section_number| Ok(store.get_section(section_number)?.to_string()),
    )?)?;

    let store = Arc::clone(&kb);
    registry.register_tool(Tool::new(
        "query_kb",
        "Query the knowledge base using the local LLM",
        vec![Param::required("query", ValueKind::String, "Question to answer from the knowledge base")],
        ValueKind::String,
        move |args| {
            let query = args.str("query")?;
            let document = store.read()?;
            let request = CompletionRequest::from_messages(&query_messages(&document, query));
            Ok(Value::String(backend.complete(&request)?))
        },
    )?)?;

    let store = Arc::clone(&kb);
    registry.register_tool(Tool::new(
        "add_to_kb",
        "Add a new entry to a section of the knowledge base",
        vec![
            Param::required("section", ValueKind::Integer, "Section number"),
            Param::required("entry", ValueKind::String, "Entry text, without the leading bullet"),
        ],
        ValueKind::String,
        move |args| {
            let outcome = store.add_entry(args.int("section")?, args.str("entry")?)?;
            Ok(Value::String(outcome.to_string()))
        },
    )?)?;

    let store = Arc::clone(&kb);
    registry.register_tool(Tool::new(
        "create_section",
        "Create a new section in the knowledge base",
        vec![Param::required("title", ValueKind::String, "Section title")],
        ValueKind::String,
        move |args| {
            let created = store.create_section(args.str("title")?)?;
            Ok(Value::String(created.to_string()))
        },
    )?)?;

    Ok(registry)
}

/// Conversation sent to the model for a knowledge-base question.
pub fn query_messages(document: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{QUERY_INSTRUCTIONS}{document}")),
        ChatMessage::user(query),
    ]
}
