use kb_mcp_server::handlers::knowledge_base::query_messages;
use kb_mcp_server::inference::{format_prompt, ChatMessage, CompletionRequest, Role};

#[test]
fn format_prompt_renders_each_turn_then_opens_assistant() {
    let prompt = format_prompt(&[
        ChatMessage::system("Be brief."),
        ChatMessage::user("Hi"),
        ChatMessage::assistant("Hello!"),
        ChatMessage::user("Bye"),
    ]);

    assert_eq!(
        prompt,
        "<|system|>\nBe brief.</s>\n<|user|>\nHi</s>\n<|assistant|>\nHello!</s>\n<|user|>\nBye</s>\n<|assistant|>\n"
    );
}

#[test]
fn format_prompt_of_nothing_is_an_open_assistant_turn() {
    assert_eq!(format_prompt(&[]), "<|assistant|>\n");
}

#[test]
fn completion_request_defaults() {
    let request = CompletionRequest::new("p");

    assert_eq!(request.prompt, "p");
    assert_eq!(request.max_tokens, 512);
    assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(request.stop, vec!["<|user|>", "</s>"]);
}

#[test]
fn query_messages_put_document_in_system_turn() {
    let messages = query_messages("1. A\n- b", "What is A?");

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains("1. A\n- b"));
    assert_eq!(messages[1], ChatMessage::user("What is A?"));
}

#[test]
fn roles_parse_and_display_lowercase() {
    for role in [Role::System, Role::User, Role::Assistant] {
        assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
    }
    assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    assert!("narrator".parse::<Role>().is_err());
}
