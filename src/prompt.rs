use crate::{source::AssistantRequest, tree::render_tree};

const INSTRUCTIONS: &str = "\
You are an expert software engineer helping a user understand a code repository.
Guidelines:
- Analyse the code read-only. Never claim to have created, modified or deleted files, and do not propose to do so on the user's behalf.
- Base your answer on the repository structure and file content provided above. Say so when the context is not enough to answer.
- Be thorough: explain relevant control flow, data structures and design decisions, and point to concrete files and symbols.
- Format the answer as Markdown, using fenced code blocks with a language tag for any code.";

/// Assemble the single text prompt sent to the model
pub fn build_prompt(request: &AssistantRequest<'_>) -> String {
    let mut prompt = String::new();

    if !request.tree.is_empty() {
        prompt.push_str("Repository structure:\n```\n");
        prompt.push_str(&render_tree(request.tree));
        prompt.push_str("```\n\n");
    }

    if let (Some(path), Some(content)) = (request.selected_path, request.selected_content) {
        prompt.push_str(&format!("Currently selected file: {}\n", path));
        prompt.push_str("File content:\n```\n");
        prompt.push_str(content);
        if !content.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n\n");
    }

    prompt.push_str("User question:\n");
    prompt.push_str(request.query);
    prompt.push_str("\n\n");
    prompt.push_str(INSTRUCTIONS);
    prompt.push('\n');
    prompt
}
