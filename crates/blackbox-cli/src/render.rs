use blackbox_core::bridge::ClickTarget;
use scraper::ElementRef;
use scraper::Html;
use scraper::Node;
use scraper::Selector;

const SKIPPED: [&str; 3] = ["script", "style", "head"];
const BLOCKS: [&str; 24] = [
    "address", "article", "aside", "blockquote", "div", "footer", "form", "h1", "h2", "h3", "h4",
    "h5", "h6", "header", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

/// Flattens generated markup to plain lines for the terminal.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut out = String::new();
    walk(document.root_element(), &mut out);

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child.value().name();
                if SKIPPED.contains(&name) {
                    continue;
                }
                match name {
                    "br" | "hr" => out.push('\n'),
                    "input" => {
                        let id = child.value().attr("id").unwrap_or("input");
                        let value = child.value().attr("value").unwrap_or_default();
                        out.push_str(&format!("[{id}: {value}]"));
                    }
                    "textarea" => {
                        out.push('\n');
                        out.extend(child.text());
                        out.push('\n');
                    }
                    _ => {
                        let block = BLOCKS.contains(&name);
                        if block {
                            out.push('\n');
                        }
                        walk(child, out);
                        if block {
                            out.push('\n');
                        } else if name == "td" || name == "th" {
                            out.push_str("  ");
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_text(out: &mut String, text: &str) {
    let at_line_start = out.is_empty() || out.ends_with('\n');
    let mut words = text.split_whitespace().peekable();
    if words.peek().is_none() {
        if !at_line_start && !out.ends_with(' ') && !text.is_empty() {
            out.push(' ');
        }
        return;
    }
    if !at_line_start && !out.ends_with(' ') && text.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    let joined = words.collect::<Vec<_>>().join(" ");
    out.push_str(&joined);
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

/// One numbered line per clickable element, for the `click N` command.
pub fn describe_targets(targets: &[ClickTarget]) -> String {
    targets
        .iter()
        .enumerate()
        .map(|(index, target)| {
            let kind = target.kind.as_deref().unwrap_or("click");
            let label = if target.label.is_empty() {
                target.interaction_id.as_str()
            } else {
                target.label.as_str()
            };
            format!("  [{}] {label} ({}, {kind})", index + 1, target.interaction_id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ids of every editable control, in document order.
pub fn input_ids(document: &Html) -> Vec<String> {
    let selector = match Selector::parse("input[id], textarea[id], select[id]") {
        Ok(selector) => selector,
        Err(err) => {
            log::warn!("invalid input selector: {err}");
            return Vec::new();
        }
    };
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("id"))
        .map(str::to_string)
        .collect()
}
