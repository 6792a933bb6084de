use crate::config::Profile;
use crate::inference::Role;
use crate::registry::{
    Param, Prompt, PromptArg, Registry, RegistryError, Resource, Tool, ToolError, ValueKind,
};

/// Registry for the `demo` profile: one of each kind of registration.
pub fn registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new(Profile::Demo.server_name());

    registry.register_tool(Tool::new(
        "add",
        "Add two numbers",
        vec![
            Param::required("a", ValueKind::Integer, "First addend"),
            Param::required("b", ValueKind::Integer, "Second addend"),
        ],
        ValueKind::Integer,
        |args| {
            let (a, b) = (args.int("a")?, args.int("b")?);
            let sum = a.checked_add(b).ok_or_else(|| ToolError::Failed {
                tool: "add".into(),
                detail: format!("{a} + {b} overflows"),
            })?;
            Ok(sum.into())
        },
    )?)?;

    registry.register_resource(Resource::fixed(
        "resource://static",
        "static",
        "Static resource data",
        || Ok("Any static data can be returned".to_string()),
    )?)?;

    registry.register_resource(Resource::template(
        "greeting://{name}",
        "greeting",
        "A personalized greeting",
        |name| Ok(format!("Hello, {name}!")),
    )?)?;

    registry.register_prompt(Prompt::new(
        "review_code",
        "Ask for a code review",
        vec![PromptArg::required("code", "Code to review")],
        |args| {
            let code = args.get("code").map(String::as_str).unwrap_or_default();
            vec![(Role::User, format!("Please review this code:\n\n{code}"))]
        },
    ))?;

    registry.register_prompt(Prompt::new(
        "debug_error",
        "Start a debugging conversation about an error",
        vec![PromptArg::required("error", "Error message")],
        |args| {
            let error = args.get("error").cloned().unwrap_or_default();
            vec![
                (Role::User, "I'm seeing this error:".to_string()),
                (Role::User, error),
                (
                    Role::Assistant,
                    "I'll help debug that. What have you tried so far?".to_string(),
                ),
            ]
        },
    ))?;

    Ok(registry)
}
