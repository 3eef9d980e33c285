//! Edit tools offered to the model.
//!
//! The model answers by invoking one or more of these functions; the names
//! here are the dispatch keys used when parsing its tool calls.
use crate::chat::{FunctionDeclaration, ToolDeclaration};
use serde_json::json;

pub const GENERATE_REPLACEMENTS: &str = "generate_replacements";
pub const CREATE_OR_ADD_CODE: &str = "create_or_add_code";
pub const DELETE_CODE: &str = "delete_code";

/// Build the three edit tool declarations for a file in `language`.
pub fn edit_tool_declarations(language: &str) -> Vec<ToolDeclaration> {
    vec![
        function(
            GENERATE_REPLACEMENTS,
            format!(
                "Generate a list of original and updated {language} code snippets based on the \
                 user's instructions. Use this function whenever existing code must change; each \
                 original snippet is replaced literally, at every occurrence, by its updated \
                 snippet, so include enough surrounding code to make it unique."
            ),
            json!({
                "type": "object",
                "properties": {
                    "replacements": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "original": {
                                    "type": "string",
                                    "description": "Existing code to replace"
                                },
                                "updated": {"type": "string", "description": "New code"}
                            },
                            "required": ["original", "updated"]
                        },
                        "description": "Replacement list of original and new code"
                    }
                },
                "required": ["replacements"]
            }),
        ),
        function(
            CREATE_OR_ADD_CODE,
            format!(
                "Generate new {language} code based on the user's instructions, or add code to \
                 the end of the existing file. Output only {language} code; do not output HTML."
            ),
            json!({
                "type": "object",
                "properties": {
                    "new_code": {
                        "type": "string",
                        "description":
                            format!("{language} code produced from the user's instructions")
                    }
                },
                "required": ["new_code"]
            }),
        ),
        function(
            DELETE_CODE,
            "Delete specific parts of the code based on the user's instructions.".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "deletions": {
                        "type": "array",
                        "items": {"type": "string", "description": "Code segment to delete"},
                        "description": "List of code segments to delete"
                    }
                },
                "required": ["deletions"]
            }),
        ),
    ]
}

fn function(
    name: &'static str,
    description: String,
    parameters: serde_json::Value,
) -> ToolDeclaration {
    ToolDeclaration {
        kind: "function",
        function: FunctionDeclaration {
            name,
            description,
            parameters,
        },
    }
}
