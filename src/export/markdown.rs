//! Markdown → HTML, for the result preview and the document export.
//!
//! Rendering follows GitHub Flavored Markdown with single newlines kept as
//! line breaks.

use comrak::{markdown_to_html, Options};
use thiserror::Error;

/// The markdown renderer could not produce HTML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MarkdownError(pub String);

/// The markdown-rendering service.
pub trait MarkdownRenderer: Send + Sync {
    fn to_html(&self, markdown: &str) -> Result<String, MarkdownError>;
}

/// CommonMark + GFM renderer built on comrak.
#[derive(Debug, Clone, Copy, Default)]
pub struct GfmRenderer;

impl MarkdownRenderer for GfmRenderer {
    fn to_html(&self, markdown: &str) -> Result<String, MarkdownError> {
        let mut options = Options::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.tasklist = true;
        options.extension.autolink = true;
        options.extension.footnotes = true;
        options.render.hardbreaks = true;
        Ok(markdown_to_html(markdown, &options))
    }
}

/// Shown in place of the preview when rendering fails.
pub const RENDER_ERROR_HTML: &str =
    r#"<div class="render-error">Error parsing markdown content</div>"#;

/// HTML for the result preview. Empty content renders as nothing; a
/// renderer failure renders as [`RENDER_ERROR_HTML`].
pub fn preview_html<M: MarkdownRenderer + ?Sized>(renderer: &M, content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    match renderer.to_html(content) {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!("Markdown rendering failed: {}", e);
            RENDER_ERROR_HTML.to_string()
        }
    }
}

/// Style rules embedded in the exported document.
const DOCUMENT_STYLE: &str = "\
body { font-family: Arial, sans-serif; line-height: 1.6; }
pre { background-color: #f6f8fa; padding: 16px; border-radius: 6px; overflow-x: auto; }
code { font-family: Consolas, monospace; background-color: #f6f8fa; padding: 2px 4px; border-radius: 3px; }
table { border-collapse: collapse; width: 100%; margin: 16px 0; }
th, td { border: 1px solid #dfe2e5; padding: 6px 13px; }
th { background-color: #f6f8fa; }
img { max-width: 100%; }
blockquote { border-left: 4px solid #dfe2e5; padding-left: 16px; color: #6a737d; margin: 0; }";

/// Wrap rendered HTML in the Word-compatible document shell.
pub fn document_shell(title: &str, body_html: &str) -> String {
    format!(
        r#"<html xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:w="urn:schemas-microsoft-com:office:word" xmlns="http://www.w3.org/TR/REC-html40">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
{DOCUMENT_STYLE}
</style>
</head>
<body>
{body_html}
</body>
</html>
"#,
        title = escape_text(title),
    )
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
