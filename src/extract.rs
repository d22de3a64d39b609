//! Text extraction: fetch a page and reduce it to cleaned plain text.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;

const FETCH_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "Mozilla/5.0";

/// Cleaned plain text extracted from one source page, plus its metadata.
/// Immutable once created; consumed by the chunker.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

pub struct TextExtractor {
    client: reqwest::Client,
}

impl TextExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch a URL and extract its visible text.
    pub async fn fetch(&self, url: &str) -> anyhow::Result<Document> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("bad response from {}", url))?;

        let html = response.text().await.context("failed to read body")?;
        let content = extract_text(&html);

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), url.to_string());

        Ok(Document { content, metadata })
    }
}

/// Strip markup and boilerplate elements from HTML and normalize whitespace.
///
/// The contents of `script`, `style`, `nav`, `aside` and `footer` elements
/// are dropped entirely; remaining tags are removed and blank lines
/// collapsed.
pub fn extract_text(html: &str) -> String {
    let stripped = strip_tags(html);

    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

const DROPPED_ELEMENTS: [&str; 5] = ["script", "style", "nav", "aside", "footer"];

fn strip_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len() / 2);
    let lower = html.to_lowercase();
    let chars: Vec<char> = html.chars().collect();
    let chars_lower: Vec<char> = lower.chars().collect();

    let mut in_tag = false;
    let mut skip_until: Option<String> = None;
    let mut i = 0;

    while i < chars.len() {
        if let Some(closer) = &skip_until {
            if starts_with_at(&chars_lower, i, closer) {
                i += closer.chars().count();
                skip_until = None;
            } else {
                i += 1;
            }
            continue;
        }

        if chars[i] == '<' {
            for element in DROPPED_ELEMENTS {
                let opener = format!("<{}", element);
                if starts_with_at(&chars_lower, i, &opener) {
                    skip_until = Some(format!("</{}>", element));
                    break;
                }
            }
            if skip_until.is_some() {
                i += 1;
                continue;
            }
            in_tag = true;
        } else if chars[i] == '>' {
            in_tag = false;
            // Tag boundaries separate words in rendered text.
            result.push('\n');
            i += 1;
            continue;
        } else if !in_tag {
            result.push(chars[i]);
        }

        i += 1;
    }

    result
}

fn starts_with_at(chars: &[char], pos: usize, needle: &str) -> bool {
    let needle: Vec<char> = needle.chars().collect();
    if pos + needle.len() > chars.len() {
        return false;
    }
    chars[pos..pos + needle.len()] == needle[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_keeps_text() {
        let html = r#"
            <html>
            <head><script>var x = 1;</script><style>body { color: red }</style></head>
            <body>
                <nav><a href="/">Home</a></nav>
                <h1>Hello</h1>
                <p>World</p>
                <aside>sidebar junk</aside>
                <footer>copyright</footer>
            </body>
            </html>
        "#;

        let text = extract_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains('<'));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("sidebar junk"));
        assert!(!text.contains("copyright"));
    }

    #[test]
    fn collapses_blank_lines() {
        let html = "<p>one</p>\n\n\n<p>  two  </p>";
        assert_eq!(extract_text(html), "one\ntwo");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(extract_text("just text"), "just text");
    }

    #[test]
    fn case_insensitive_element_matching() {
        let html = "<SCRIPT>secret()</SCRIPT><p>visible</p>";
        let text = extract_text(html);
        assert!(!text.contains("secret"));
        assert!(text.contains("visible"));
    }
}
