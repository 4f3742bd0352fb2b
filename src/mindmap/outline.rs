use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Deepest markdown heading level
pub const MAX_HEADING_DEPTH: usize = 6;

/// Mind-map outline returned by the structuring model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredOutline {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub nodes: Vec<OutlineNode>,
}

/// Outline node; `children` is omitted on leaves
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutlineNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<OutlineNode>>,
}

impl OutlineNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: None,
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<OutlineNode>) -> Self {
        Self {
            name: name.into(),
            children: if children.is_empty() { None } else { Some(children) },
        }
    }

    fn normalize(&mut self) {
        if let Some(children) = self.children.as_mut() {
            children.iter_mut().for_each(OutlineNode::normalize);
        }
        if self.children.as_ref().is_some_and(|c| c.is_empty()) {
            self.children = None;
        }
    }

    fn depth(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map(|c| c.iter().map(OutlineNode::depth).max().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl StructuredOutline {
    /// Placeholder for a transcript with no content
    pub fn empty() -> Self {
        Self {
            title: "Empty Transcription".to_string(),
            summary: "No transcription content available.".to_string(),
            nodes: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.title.trim().is_empty() && !self.nodes.is_empty()
    }

    /// Deepest node level; top-level nodes are depth 1
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(OutlineNode::depth).max().unwrap_or(0)
    }

    /// Drop empty `children` arrays so leaves carry no key
    pub fn normalize(mut self) -> Self {
        self.nodes.iter_mut().for_each(OutlineNode::normalize);
        self
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
    })
}

/// First balanced `{...}` span, ignoring braces inside JSON strings
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse an outline out of raw model output.
///
/// Candidates in order: fenced code blocks, the whole response, the first
/// balanced object. The first candidate that decodes wins.
pub fn parse_outline(response: &str) -> Result<StructuredOutline, String> {
    let mut candidates: Vec<&str> = fence_regex()
        .captures_iter(response)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .collect();
    candidates.push(response.trim());
    if let Some(object) = balanced_object(response) {
        candidates.push(object);
    }

    let mut last_error = None;
    for candidate in candidates {
        if !candidate.starts_with('{') {
            continue;
        }
        match serde_json::from_str::<StructuredOutline>(candidate) {
            Ok(outline) => return Ok(outline.normalize()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(last_error.unwrap_or_else(|| "no JSON object in model response".to_string()))
}

/// Render an outline as markmap markdown without a model.
///
/// Heading depth mirrors outline depth; nodes deeper than six levels stay on
/// `######` headings prefixed with `Level N:`.
pub fn render_outline_locally(outline: &StructuredOutline) -> String {
    let mut lines = vec![format!("# {}", outline.title.trim())];
    for node in &outline.nodes {
        render_node(node, 2, &mut lines);
    }
    let mut markdown = lines.join("\n");
    markdown.push('\n');
    markdown
}

fn render_node(node: &OutlineNode, level: usize, lines: &mut Vec<String>) {
    if level <= MAX_HEADING_DEPTH {
        lines.push(format!("{} {}", "#".repeat(level), node.name.trim()));
    } else {
        lines.push(format!(
            "{} Level {}: {}",
            "#".repeat(MAX_HEADING_DEPTH),
            level,
            node.name.trim()
        ));
    }

    for child in node.children.iter().flatten() {
        render_node(child, level + 1, lines);
    }
}
