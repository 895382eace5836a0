use scraper::{Html, Selector};

use crate::fetch::FetchResult;

const TEXT_SAMPLE_CAP: usize = 2000;

/// Normalized signals pulled from a fetched page. All fields degrade to
/// empty strings on absent or malformed bodies; the status code is always
/// preserved from the fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: String,
    pub description: String,
    pub text_sample: String,
    pub status_code: u16,
}

impl ExtractedFields {
    pub fn empty(status_code: u16) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            text_sample: String::new(),
            status_code,
        }
    }
}

/// Pure function of the fetch result; no network or disk access.
pub fn extract(result: &FetchResult) -> ExtractedFields {
    let Some(body) = result.body.as_deref() else {
        return ExtractedFields::empty(result.status_code);
    };

    // html5ever never fails; malformed markup just yields a sparse tree
    let doc = Html::parse_document(body);

    let title_sel = Selector::parse("title").unwrap();
    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let meta_sel = Selector::parse("meta").unwrap();
    let description = doc
        .select(&meta_sel)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case("description"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    ExtractedFields {
        title,
        description,
        text_sample: visible_text(&doc, TEXT_SAMPLE_CAP),
        status_code: result.status_code,
    }
}

/// Visible text only: script/style/noscript content is classification noise.
fn visible_text(doc: &Html, cap: usize) -> String {
    let mut out = String::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let parent = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_ascii_lowercase()));
        if matches!(parent.as_deref(), Some("script") | Some("style") | Some("noscript")) {
            continue;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
        if out.len() >= cap {
            break;
        }
    }
    if out.len() > cap {
        let mut cut = cap;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(body: Option<&str>, status: u16) -> FetchResult {
        FetchResult {
            domain: "example.com".into(),
            final_url: "https://example.com/".into(),
            status_code: status,
            body: body.map(String::from),
            elapsed_ms: 0,
            attempts: 1,
        }
    }

    #[test]
    fn extracts_title_description_and_text() {
        let html = r#"<html><head>
            <title> My Site </title>
            <meta name="DESCRIPTION" content=" A fine site. ">
            <script>var hidden = "secret";</script>
            <style>.x { color: red }</style>
            </head><body><p>Hello world</p></body></html>"#;
        let fields = extract(&fetched(Some(html), 200));
        assert_eq!(fields.title, "My Site");
        assert_eq!(fields.description, "A fine site.");
        assert!(fields.text_sample.contains("Hello world"));
        assert!(!fields.text_sample.contains("secret"));
        assert!(!fields.text_sample.contains("color"));
        assert_eq!(fields.status_code, 200);
    }

    #[test]
    fn absent_body_yields_empty_fields_with_status() {
        let fields = extract(&fetched(None, 0));
        assert_eq!(fields, ExtractedFields::empty(0));
    }

    #[test]
    fn malformed_html_never_fails() {
        let fields = extract(&fetched(Some("<<<><title>Ok</tit"), 200));
        assert_eq!(fields.status_code, 200);
        // Best effort only; the point is that it returns instead of erroring
    }

    #[test]
    fn text_sample_is_bounded() {
        let body = format!("<html><body><p>{}</p></body></html>", "word ".repeat(2000));
        let fields = extract(&fetched(Some(&body), 200));
        assert!(fields.text_sample.len() <= TEXT_SAMPLE_CAP);
    }

    #[test]
    fn missing_title_and_meta_are_empty() {
        let fields = extract(&fetched(Some("<html><body><p>hi</p></body></html>"), 200));
        assert_eq!(fields.title, "");
        assert_eq!(fields.description, "");
    }
}
