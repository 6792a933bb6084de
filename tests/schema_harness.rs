use kb_mcp_server::handlers;
use kb_mcp_server::schema::validate_json;

fn input_schema(tool: &str) -> String {
    let registry = handlers::demo::registry().unwrap();
    let listed = registry.list_tools();
    let entry = listed["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == tool)
        .unwrap()
        .clone();
    entry["inputSchema"].to_string()
}

#[test]
fn json_schema_harness_validates_instance() {
    let schema = input_schema("add");

    validate_json(&schema, r#"{ "a": 1, "b": 2 }"#).expect("schema validation failed");
}

#[test]
fn generated_schema_rejects_wrong_types_and_missing_fields() {
    let schema = input_schema("add");

    let wrong_type = validate_json(&schema, r#"{ "a": "1", "b": 2 }"#).unwrap_err();
    assert!(wrong_type.to_string().contains("integer"), "{wrong_type}");

    let missing = validate_json(&schema, r#"{ "a": 1 }"#).unwrap_err();
    assert!(missing.to_string().contains("\"b\""), "{missing}");
}

#[test]
fn malformed_instance_is_a_parse_error() {
    let schema = input_schema("add");

    assert!(validate_json(&schema, "{ nope").is_err());
}
