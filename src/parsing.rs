use std::path::PathBuf;

use anyhow;
use scraper::{Html, Selector};
use tokio::fs;

pub struct Parser {
    pub directory_path: String,
}

impl Parser {
    pub fn new(directory_path: String) -> Self {
        Self { directory_path }
    }

    async fn extract_text_from_pdf(&self, file_path: PathBuf) -> anyhow::Result<String> {
        let bytes = fs::read(file_path).await?;
        let out = pdf_extract::extract_text_from_mem(&bytes)?;
        Ok(out)
    }

    async fn read_file(&self, file_path: PathBuf) -> anyhow::Result<String> {
        let content = fs::read_to_string(file_path).await?;
        Ok(content)
    }

    pub async fn parse(&self) -> anyhow::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.directory_path).await?;
        let mut results: Vec<String> = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let extension = match path.extension() {
                Some(e) => e.to_string_lossy().to_lowercase(),
                None => continue,
            };
            let result = match extension.as_str() {
                "pdf" => {
                    println!("Extracting text from {:?}", path);
                    self.extract_text_from_pdf(path).await?
                }
                "md" | "txt" => {
                    println!("Reading text from {:?}", path);
                    self.read_file(path).await?
                }
                _ => {
                    eprintln!(
                        "Unsupported file format: {:?}. Supported file formats are: .pdf, .txt and .md",
                        path
                    );
                    continue;
                }
            };
            println!("Text size: {:?} chars", result.len());
            results.push(result);
        }
        if results.is_empty() {
            eprintln!(
                "No readable documents found in {:?}",
                self.directory_path
            );
        }

        Ok(results)
    }
}

/// Fetch a web page and reduce it to its visible text.
pub async fn fetch_webpage(url: &str) -> anyhow::Result<String> {
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    let text = html_to_text(&body);
    if text.trim().is_empty() {
        return Err(anyhow::anyhow!("No text content found at {}", url));
    }
    println!("Fetched {:?} chars of text from {}", text.len(), url);
    Ok(text)
}

/// Comma-separated URL list from the `WEBPAGES_URLS` environment variable.
pub fn webpages_from_env() -> Vec<String> {
    match std::env::var("WEBPAGES_URLS") {
        Ok(urls) => parse_webpages_list(&urls),
        Err(_) => {
            eprintln!("WEBPAGES_URLS environment variable not set or empty.");
            vec![]
        }
    }
}

pub fn parse_webpages_list(urls: &str) -> Vec<String> {
    urls.split(',')
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("p, h1, h2, h3, h4, h5, h6, li, td, th, pre, blockquote, title")
            .expect("Should be able to parse the text selector");
    let mut lines: Vec<String> = vec![];
    for element in document.select(&selector) {
        let line = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_html_to_text_keeps_visible_text() {
        let html = "<html><head><title>A page</title>\
                    <script>var hidden = 1;</script></head>\
                    <body><h1>Heading</h1><p>First   paragraph.</p>\
                    <ul><li>item one</li><li>item two</li></ul></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Heading"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("item one"));
        assert!(!text.contains("var hidden"));
    }

    #[test]
    fn test_html_to_text_one_line_per_element() {
        let html = "<body><p>one</p><p>two</p></body>";
        let text = html_to_text(html);
        assert_eq!(text, "one\ntwo");
    }

    #[test]
    fn test_parse_webpages_list() {
        let urls = parse_webpages_list(" https://a.example , https://b.example,,");
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_parse_webpages_list_empty() {
        assert!(parse_webpages_list("").is_empty());
        assert!(parse_webpages_list(" , ").is_empty());
    }
}
