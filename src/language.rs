/// Tag used when no extension matches
pub const PLAIN_TEXT: &str = "plain-text";

/// Best-effort syntax-highlighting tag for a file path, from its extension
pub fn language_for_path(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let extension = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return PLAIN_TEXT,
    };

    match extension.as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "css" => "css",
        "html" | "htm" => "html",
        "json" => "json",
        "md" => "markdown",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "php" => "php",
        "rb" => "ruby",
        "sh" => "bash",
        "xml" => "xml",
        "yaml" | "yml" => "yaml",
        "scss" => "scss",
        "less" => "less",
        _ => PLAIN_TEXT,
    }
}
