// src/cli/handlers/commons.rs

/// Accepts an executor both as `ci` and `@ci`.
pub fn executor_name(arg: Option<String>) -> Option<String> {
    arg.map(|name| name.trim_start_matches('@').to_string())
        .filter(|name| !name.is_empty())
}
