//! Page content extraction for a single tab.
//!
//! Two tiers, mirroring what a content script can do inside the page:
//! - [`extract_page`]: strips non-content elements (scripts, navigation,
//!   ads, comment threads) and returns a truncated text body plus a
//!   structured summary of paragraphs, links, images and headings.
//! - [`visible_text`]: the minimal fallback: all visible text, truncated.

mod cleanup;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};
use url::Url;

use tabcontext_shared::{ImageRef, LinkRef, MAX_CONTENT_CHARS, PageDetail, Result, TabContextError};

pub use cleanup::truncate_chars;

/// Limits applied to the structured summary.
pub const MAX_PARAGRAPHS: usize = 10;
pub const MAX_LINKS: usize = 20;
pub const MAX_IMAGES: usize = 10;
pub const MAX_HEADINGS: usize = 5;

/// Paragraphs shorter than this are treated as UI text, not prose.
const MIN_PARAGRAPH_CHARS: usize = 30;
const MAX_PARAGRAPH_CHARS: usize = 500;
const MAX_LINK_TEXT_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

static NON_CONTENT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script, style, noscript, template, iframe, svg, canvas, nav, header, footer, aside, \
         form, button, [role=\"navigation\"], [role=\"banner\"], [role=\"contentinfo\"], \
         [aria-hidden=\"true\"], .ad, .ads, .advert, .advertisement, .sponsored, \
         .cookie-banner, .comments, #comments, .comment",
    )
    .expect("valid selector")
});

static NON_VISIBLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("head, script, style, noscript, template").expect("valid selector"));

static BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "nav", "header", "footer", "aside", "form", "li",
    "ul", "ol", "br", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "table", "dd", "dt", "figcaption",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of the structured extractor.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// `<title>`, or the first H1 when there is none.
    pub title: Option<String>,
    /// Visible text of the content area, at most [`MAX_CONTENT_CHARS`] characters.
    pub text: String,
    pub detail: PageDetail,
}

// ---------------------------------------------------------------------------
// Structured extraction
// ---------------------------------------------------------------------------

/// Run the structured extractor over a page document.
///
/// Fails when the page has no readable content once navigation and other
/// chrome are removed; callers then fall back to [`visible_text`].
#[instrument(skip(html), fields(base = base_url.map(Url::as_str).unwrap_or("")))]
pub fn extract_page(html: &str, base_url: Option<&Url>) -> Result<ExtractedPage> {
    let doc = Html::parse_document(html);
    let root = content_root(&doc)
        .ok_or_else(|| TabContextError::parse("document has no body"))?;

    let mut raw = String::new();
    collect_text(root, &NON_CONTENT, &mut raw);
    let text = truncate_chars(&cleanup::run_pipeline(&raw), MAX_CONTENT_CHARS);

    let detail = PageDetail {
        paragraphs: extract_paragraphs(root),
        links: extract_links(&doc, base_url),
        images: extract_images(&doc, base_url),
        headings: extract_headings(&doc),
    };

    if text.is_empty() && detail.paragraphs.is_empty() {
        return Err(TabContextError::parse("no readable content after stripping chrome"));
    }

    debug!(
        chars = text.chars().count(),
        paragraphs = detail.paragraphs.len(),
        links = detail.links.len(),
        "structured extraction complete"
    );

    Ok(ExtractedPage {
        title: extract_title(&doc),
        text,
        detail,
    })
}

/// Minimal fallback: every visible text node of the document, truncated.
pub fn visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(doc.root_element(), &NON_VISIBLE, &mut raw);
    truncate_chars(&cleanup::run_pipeline(&raw), MAX_CONTENT_CHARS)
}

/// Extract only the page title.
pub fn page_title(html: &str) -> Option<String> {
    extract_title(&Html::parse_document(html))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Readability heuristics: `<main>`, `<article>`, `[role=main]`, `.content`,
/// then `<body>`. Candidates without text are skipped.
fn content_root(doc: &Html) -> Option<ElementRef<'_>> {
    let selectors = ["main", "article", r#"[role="main"]"#, ".content", "body"];

    for sel_str in selectors {
        let sel = Selector::parse(sel_str).expect("valid selector");
        if let Some(el) = doc.select(&sel).next() {
            if el.text().any(|t| !t.trim().is_empty()) {
                return Some(el);
            }
        }
    }

    let body = Selector::parse("body").expect("valid selector");
    doc.select(&body).next()
}

/// Depth-first text collection that skips any subtree matching `skip`.
fn collect_text(el: ElementRef<'_>, skip: &Selector, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if skip.matches(&child_el) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&element.name());
                if block {
                    out.push(' ');
                }
                collect_text(child_el, skip, out);
                if block {
                    out.push(' ');
                }
            }
            // Comments, doctype, processing instructions
            _ => {}
        }
    }
}

/// True if the element or any ancestor is non-content chrome.
fn in_chrome(el: &ElementRef<'_>) -> bool {
    NON_CONTENT.matches(el)
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| NON_CONTENT.matches(&a))
}

fn element_text(el: &ElementRef<'_>) -> String {
    cleanup::run_pipeline(&el.text().collect::<String>())
}

fn extract_title(doc: &Html) -> Option<String> {
    let title_sel = Selector::parse("title").expect("valid selector");
    let h1_sel = Selector::parse("h1").expect("valid selector");

    doc.select(&title_sel)
        .chain(doc.select(&h1_sel))
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

fn extract_paragraphs(root: ElementRef<'_>) -> Vec<String> {
    let p_sel = Selector::parse("p").expect("valid selector");
    root.select(&p_sel)
        .filter(|el| !in_chrome(el))
        .map(|el| element_text(&el))
        .filter(|t| t.chars().count() >= MIN_PARAGRAPH_CHARS)
        .map(|t| truncate_chars(&t, MAX_PARAGRAPH_CHARS))
        .take(MAX_PARAGRAPHS)
        .collect()
}

fn extract_links(doc: &Html, base_url: Option<&Url>) -> Vec<LinkRef> {
    let link_sel = Selector::parse("a[href]").expect("valid selector");
    let mut links: Vec<LinkRef> = Vec::new();

    for el in doc.select(&link_sel) {
        if links.len() >= MAX_LINKS {
            break;
        }
        if in_chrome(&el) {
            continue;
        }
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        // Skip anchors, javascript:, mailto:
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }
        let Some(resolved) = resolve(href, base_url) else {
            continue;
        };
        if links.iter().any(|l| l.href == resolved) {
            continue;
        }
        let text = truncate_chars(&element_text(&el), MAX_LINK_TEXT_CHARS);
        if text.is_empty() {
            continue;
        }
        links.push(LinkRef {
            text,
            href: resolved,
        });
    }

    links
}

fn extract_images(doc: &Html, base_url: Option<&Url>) -> Vec<ImageRef> {
    let img_sel = Selector::parse("img[src]").expect("valid selector");
    doc.select(&img_sel)
        .filter(|el| !in_chrome(el))
        .filter_map(|el| {
            let src = resolve(el.value().attr("src")?, base_url)?;
            let alt = el.value().attr("alt").unwrap_or_default().trim().to_string();
            Some(ImageRef { src, alt })
        })
        .take(MAX_IMAGES)
        .collect()
}

fn extract_headings(doc: &Html) -> Vec<String> {
    let heading_sel = Selector::parse("h1, h2, h3").expect("valid selector");
    doc.select(&heading_sel)
        .filter(|el| !in_chrome(el))
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .take(MAX_HEADINGS)
        .collect()
}

/// Resolve a reference to an absolute http(s) URL, stripping the fragment.
fn resolve(href: &str, base_url: Option<&Url>) -> Option<String> {
    let mut url = match base_url {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<html><head><title>Attention Is All You Need</title>
        <script>window.analytics = {};</script><style>.x { color: red }</style></head>
        <body>
          <nav><a href="/home">Home</a><a href="/login">Log in</a></nav>
          <main>
            <h1>Attention Is All You Need</h1>
            <!-- tracking comment -->
            <p>The dominant sequence transduction models are based on complex recurrent networks.</p>
            <p>Short.</p>
            <h2>Abstract</h2>
            <p>We propose a new simple network architecture, the Transformer, based solely on attention.</p>
            <div class="ad">Buy cheap GPUs now</div>
            <a href="/pdf/1706.03762">Download PDF</a>
            <a href="https://github.com/tensorflow/tensor2tensor#readme">Code</a>
            <a href="javascript:void(0)">Share</a>
            <img src="/figures/arch.png" alt="Architecture">
            <img src="data:image/png;base64,AAAA">
            <section id="comments"><p>First comment on this excellent and very long paper!</p></section>
          </main>
          <footer>Copyright arXiv</footer>
        </body></html>"#;

    fn base() -> Url {
        Url::parse("https://arxiv.org/abs/1706.03762").unwrap()
    }

    #[test]
    fn structured_extraction_strips_chrome() {
        let page = extract_page(ARTICLE, Some(&base())).expect("extract");

        assert_eq!(page.title.as_deref(), Some("Attention Is All You Need"));
        assert!(page.text.contains("sequence transduction"));
        assert!(page.text.contains("Transformer"));
        assert!(!page.text.contains("analytics"));
        assert!(!page.text.contains("Log in"));
        assert!(!page.text.contains("Buy cheap GPUs"));
        assert!(!page.text.contains("First comment"));
        assert!(!page.text.contains("Copyright"));
        assert!(!page.text.contains("tracking comment"));
    }

    #[test]
    fn structured_summary_is_collected() {
        let page = extract_page(ARTICLE, Some(&base())).expect("extract");

        assert_eq!(page.detail.paragraphs.len(), 2);
        assert_eq!(
            page.detail.headings,
            vec!["Attention Is All You Need".to_string(), "Abstract".to_string()]
        );

        let hrefs: Vec<&str> = page.detail.links.iter().map(|l| l.href.as_str()).collect();
        assert!(hrefs.contains(&"https://arxiv.org/pdf/1706.03762"));
        assert!(hrefs.contains(&"https://github.com/tensorflow/tensor2tensor"));
        assert!(!hrefs.iter().any(|h| h.contains("login")));
        assert_eq!(page.detail.links.len(), 2);

        assert_eq!(page.detail.images.len(), 1);
        assert_eq!(page.detail.images[0].src, "https://arxiv.org/figures/arch.png");
        assert_eq!(page.detail.images[0].alt, "Architecture");
    }

    #[test]
    fn structured_limits_are_enforced() {
        let mut html = String::from("<html><body><main>");
        for i in 0..40 {
            html.push_str(&format!(
                "<h2>Heading {i}</h2><p>Paragraph number {i} with enough words to count as prose.</p>\
                 <a href=\"/item/{i}\">Item {i}</a><img src=\"/img/{i}.png\">"
            ));
        }
        html.push_str(&"word ".repeat(1000));
        html.push_str("</main></body></html>");

        let page = extract_page(&html, Some(&base())).expect("extract");
        assert!(page.text.chars().count() <= MAX_CONTENT_CHARS);
        assert_eq!(page.detail.paragraphs.len(), MAX_PARAGRAPHS);
        assert_eq!(page.detail.links.len(), MAX_LINKS);
        assert_eq!(page.detail.images.len(), MAX_IMAGES);
        assert_eq!(page.detail.headings.len(), MAX_HEADINGS);
    }

    #[test]
    fn chrome_only_page_fails_structured_extraction() {
        let html = "<html><body><nav>Menu items only</nav><footer>Footer</footer></body></html>";
        assert!(extract_page(html, None).is_err());
    }

    #[test]
    fn fallback_keeps_chrome_text_but_not_scripts() {
        let html = "<html><head><script>var secret = 1;</script></head>\
                    <body><nav>Menu items only</nav><footer>Footer</footer></body></html>";
        let text = visible_text(html);
        assert_eq!(text, "Menu items only Footer");
    }

    #[test]
    fn fallback_truncates() {
        let html = format!("<html><body><p>{}</p></body></html>", "abc ".repeat(2000));
        let text = visible_text(&html);
        assert_eq!(text.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn block_elements_do_not_merge_words() {
        let html = "<html><body><main><div>alpha</div><div>beta</div></main></body></html>";
        let page = extract_page(html, None).expect("extract");
        assert_eq!(page.text, "alpha beta");
    }

    #[test]
    fn page_title_falls_back_to_h1() {
        let html = "<html><body><h1>Only Heading</h1></body></html>";
        assert_eq!(page_title(html).as_deref(), Some("Only Heading"));
    }
}
