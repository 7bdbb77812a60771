//! Reads generated HTML as a side channel.
//!
//! Generated content carries four kinds of markers: click targets
//! (`data-interaction-id`), a state-update sentinel, a system-command sentinel
//! and `<script>` blocks. `ContentView` finds them in one parsed document;
//! `InteractionBridge` keeps that document attached to the current content
//! revision and turns clicks into `InteractionRecord`s.

use std::collections::HashMap;

use scraper::ElementRef;
use scraper::Html;
use scraper::Selector;
use serde::de::DeserializeOwned;

use super::error::GenerationError;
use super::interaction::InteractionRecord;
use super::interaction::DEFAULT_INTERACTION_KIND;
use super::vfs::Vfs;

pub const INTERACTION_ID_ATTR: &str = "data-interaction-id";
pub const INTERACTION_TYPE_ATTR: &str = "data-interaction-type";
pub const INTERACTION_VALUE_ATTR: &str = "data-interaction-value";
pub const VALUE_FROM_ATTR: &str = "data-value-from";

pub const STATE_UPDATE_ID: &str = "terminal-state-update";
pub const SYSTEM_COMMAND_ID: &str = "system-command";
pub const UPLOAD_INPUT_ID: &str = "file-upload";
pub const TERMINAL_INPUT_ID: &str = "terminal_input";
pub const NOTEPAD_TEXTAREA_ID: &str = "notepad-textarea";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickTarget {
    pub interaction_id: String,
    pub kind: Option<String>,
    pub value: Option<String>,
    /// Ids of inputs whose live values form the interaction value.
    pub value_from: Vec<String>,
    pub element_kind: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    StateUpdate {
        vfs: Option<Vfs>,
        path: Option<Vec<String>>,
    },
    SystemCommand(String),
}

pub struct ContentView {
    document: Html,
}

impl std::fmt::Debug for ContentView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentView")
            .field("html", &self.to_html())
            .finish()
    }
}

impl ContentView {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_fragment(html),
        }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// The fragment as HTML, without anything detached so far.
    pub fn to_html(&self) -> String {
        self.document.root_element().inner_html()
    }

    pub fn click_targets(&self) -> Vec<ClickTarget> {
        select_all(&self.document, "[data-interaction-id]")
            .into_iter()
            .filter_map(click_target)
            .collect()
    }

    /// Resolves a click on the element with HTML id `element_id` to the
    /// nearest enclosing click target.
    pub fn target_for_element(&self, element_id: &str) -> Option<ClickTarget> {
        let element = find_by_id(&self.document, element_id)?;
        std::iter::once(element)
            .chain(element.ancestors().filter_map(ElementRef::wrap))
            .find_map(click_target)
    }

    pub fn input_value(&self, id: &str) -> Option<String> {
        let element = find_by_id(&self.document, id)?;
        let value = match element.value().name() {
            "textarea" => element.text().collect(),
            "select" => {
                let options = element
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .filter(|option| option.value().name() == "option")
                    .collect::<Vec<_>>();
                options
                    .iter()
                    .find(|option| option.value().attr("selected").is_some())
                    .or_else(|| options.first())
                    .map(|option| option_value(*option))
                    .unwrap_or_default()
            }
            _ => element.value().attr("value").unwrap_or_default().to_string(),
        };
        Some(value)
    }

    pub fn has_input(&self, id: &str) -> bool {
        find_by_id(&self.document, id).is_some()
    }

    pub fn has_upload_input(&self) -> bool {
        find_by_id(&self.document, UPLOAD_INPUT_ID)
            .is_some_and(|element| element.value().name() == "input")
    }

    /// Removes every state-update and system-command sentinel and returns
    /// what they carried. Malformed payloads are logged and skipped.
    pub fn take_signals(&mut self) -> Vec<Signal> {
        let selector = format!("#{STATE_UPDATE_ID}, #{SYSTEM_COMMAND_ID}");
        let mut signals = Vec::new();
        let mut consumed = Vec::new();
        for element in select_all(&self.document, &selector) {
            let attrs = element.value();
            if attrs.id() == Some(STATE_UPDATE_ID) {
                consumed.push(element.id());
                match decode_state_update(element) {
                    Ok(Some(signal)) => signals.push(signal),
                    Ok(None) => {}
                    Err(err) => log::warn!("ignoring state update: {err}"),
                }
            } else if let Some(command) = attrs.attr("data-command").filter(|c| !c.is_empty()) {
                consumed.push(element.id());
                signals.push(Signal::SystemCommand(command.to_string()));
            }
        }
        for id in consumed {
            if let Some(mut node) = self.document.tree.get_mut(id) {
                node.detach();
            }
        }
        signals
    }

    pub fn take_scripts(&mut self) -> Vec<String> {
        let scripts = select_all(&self.document, "script");
        let bodies = scripts
            .iter()
            .map(|script| script.text().collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .collect();
        let ids = scripts.iter().map(|script| script.id()).collect::<Vec<_>>();
        for id in ids {
            if let Some(mut node) = self.document.tree.get_mut(id) {
                node.detach();
            }
        }
        bodies
    }
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(err) => {
            log::error!("invalid selector {css}: {err}");
            Vec::new()
        }
    }
}

fn find_by_id<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().id() == Some(id))
}

fn click_target(element: ElementRef<'_>) -> Option<ClickTarget> {
    let attrs = element.value();
    let interaction_id = attrs.attr(INTERACTION_ID_ATTR)?.to_string();
    let value_from = attrs
        .attr(VALUE_FROM_ATTR)
        .map(|ids| {
            ids.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let text = element.text().collect::<String>();
    let label = if text.trim().is_empty() {
        attrs.attr("value").unwrap_or_default().to_string()
    } else {
        text
    };
    Some(ClickTarget {
        interaction_id,
        kind: attrs.attr(INTERACTION_TYPE_ATTR).map(str::to_string),
        value: attrs.attr(INTERACTION_VALUE_ATTR).map(str::to_string),
        value_from,
        element_kind: attrs.name().to_ascii_lowercase(),
        label,
    })
}

fn option_value(option: ElementRef<'_>) -> String {
    option
        .value()
        .attr("value")
        .map(str::to_string)
        .unwrap_or_else(|| option.text().collect::<String>().trim().to_string())
}

fn decode_state_update(element: ElementRef<'_>) -> Result<Option<Signal>, GenerationError> {
    let vfs: Option<Vfs> = decode_attr(element, "data-vfs")?;
    let path: Option<Vec<String>> = decode_attr(element, "data-path")?;
    if vfs.is_none() && path.is_none() {
        return Ok(None);
    }
    Ok(Some(Signal::StateUpdate { vfs, path }))
}

fn decode_attr<T: DeserializeOwned>(
    element: ElementRef<'_>,
    attr: &str,
) -> Result<Option<T>, GenerationError> {
    match element.value().attr(attr).filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|err| GenerationError::Decode(format!("{attr}: {err}"))),
        None => Ok(None),
    }
}

pub trait ScriptHost {
    fn run_script(&mut self, script: &str);
}

/// Index into the terminal command history driven by previous/next keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalHistoryCursor {
    history: Vec<String>,
    index: usize,
}

impl TerminalHistoryCursor {
    pub fn new(history: &[String]) -> Self {
        Self {
            history: history.to_vec(),
            index: history.len(),
        }
    }

    /// Follows a new history; the cursor moves past the end when it changed.
    pub fn sync(&mut self, history: &[String]) {
        if self.history != history {
            *self = Self::new(history);
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn previous(&mut self) -> &str {
        self.index = self.index.saturating_sub(1);
        self.current()
    }

    pub fn next(&mut self) -> &str {
        self.index = (self.index + 1).min(self.history.len());
        self.current()
    }

    fn current(&self) -> &str {
        self.history.get(self.index).map_or("", String::as_str)
    }
}

/// Keeps one parsed view attached to the session's current content and
/// remembers what the user typed into it.
#[derive(Debug, Default)]
pub struct InteractionBridge {
    view: Option<ContentView>,
    attached_rev: Option<u64>,
    inputs: HashMap<String, String>,
    scripts_rev: Option<u64>,
    cursor: TerminalHistoryCursor,
    parses: u64,
}

impl InteractionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-parses `content` when `rev` moved. Returns whether it re-attached.
    pub fn attach(&mut self, content: &str, rev: u64) -> bool {
        if self.attached_rev == Some(rev) {
            return false;
        }
        self.view = Some(ContentView::parse(content));
        self.attached_rev = Some(rev);
        self.parses += 1;
        self.inputs.clear();
        true
    }

    pub fn detach(&mut self) {
        self.view = None;
        self.attached_rev = None;
        self.inputs.clear();
    }

    pub fn parses(&self) -> u64 {
        self.parses
    }

    pub fn is_attached(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&ContentView> {
        self.view.as_ref()
    }

    pub fn click_targets(&self) -> Vec<ClickTarget> {
        self.view
            .as_ref()
            .map(ContentView::click_targets)
            .unwrap_or_default()
    }

    /// Records what the user typed into an input. Returns false when no such
    /// input is rendered.
    pub fn set_input(&mut self, id: &str, value: impl Into<String>) -> bool {
        if !self.view.as_ref().is_some_and(|view| view.has_input(id)) {
            return false;
        }
        self.inputs.insert(id.to_string(), value.into());
        true
    }

    /// The live value: what the user typed, else what was rendered.
    pub fn input_value(&self, id: &str) -> Option<String> {
        self.inputs
            .get(id)
            .cloned()
            .or_else(|| self.view.as_ref()?.input_value(id))
    }

    pub fn has_upload_input(&self) -> bool {
        self.view.as_ref().is_some_and(ContentView::has_upload_input)
    }

    pub fn click(&self, target: &ClickTarget, app_context: Option<&str>) -> InteractionRecord {
        let value = if target.value_from.is_empty() {
            target.value.clone()
        } else {
            Some(
                target
                    .value_from
                    .iter()
                    .map(|id| self.input_value(id).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };
        let record = InteractionRecord::new(
            target.interaction_id.as_str(),
            target.kind.as_deref().unwrap_or(DEFAULT_INTERACTION_KIND),
            target.element_kind.as_str(),
            &target.label,
            app_context,
        );
        match value {
            Some(value) => record.with_value(value),
            None => record,
        }
    }

    /// Hands the scripts of the attached view to `host`, once per content
    /// revision and only after loading finished.
    pub fn run_scripts(&mut self, loading: bool, host: &mut dyn ScriptHost) -> usize {
        if loading || self.scripts_rev == self.attached_rev {
            return 0;
        }
        let Some(view) = self.view.as_mut() else {
            return 0;
        };
        self.scripts_rev = self.attached_rev;
        let scripts = view.take_scripts();
        for script in &scripts {
            host.run_script(script);
        }
        scripts.len()
    }

    pub fn sync_terminal_history(&mut self, history: &[String]) {
        self.cursor.sync(history);
    }

    /// Steps back through the terminal history into the terminal input.
    /// `None` when no terminal input is rendered.
    pub fn history_previous(&mut self) -> Option<String> {
        if !self.has_terminal_input() {
            return None;
        }
        let value = self.cursor.previous().to_string();
        self.inputs.insert(TERMINAL_INPUT_ID.to_string(), value.clone());
        Some(value)
    }

    pub fn history_next(&mut self) -> Option<String> {
        if !self.has_terminal_input() {
            return None;
        }
        let value = self.cursor.next().to_string();
        self.inputs.insert(TERMINAL_INPUT_ID.to_string(), value.clone());
        Some(value)
    }

    fn has_terminal_input(&self) -> bool {
        self.view
            .as_ref()
            .is_some_and(|view| view.has_input(TERMINAL_INPUT_ID))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FORM: &str = r#"
        <div class="toolbar">
          <button data-interaction-id="open_docs" data-interaction-type="navigate">
            <span id="docs-icon">Docs</span>
          </button>
        </div>
        <input id="city" value="Oslo">
        <select id="units"><option value="c">C</option><option value="f" selected>F</option></select>
        <button id="go" data-interaction-id="weather_go" data-value-from="city, units" data-interaction-value="ignored">Go</button>
        <a data-interaction-id="pick" data-interaction-value="42">Pick</a>
    "#;

    struct Recorder(Vec<String>);

    impl ScriptHost for Recorder {
        fn run_script(&mut self, script: &str) {
            self.0.push(script.to_string());
        }
    }

    fn attached(html: &str) -> InteractionBridge {
        let mut bridge = InteractionBridge::new();
        bridge.attach(html, 1);
        bridge
    }

    #[test]
    fn click_targets_are_listed_in_document_order() {
        let view = ContentView::parse(FORM);
        let ids = view
            .click_targets()
            .into_iter()
            .map(|target| target.interaction_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["open_docs", "weather_go", "pick"]);
    }

    #[test]
    fn clicks_on_children_resolve_to_the_marked_ancestor() {
        let view = ContentView::parse(FORM);
        let target = view.target_for_element("docs-icon").unwrap();
        assert_eq!(target.interaction_id, "open_docs");
        assert_eq!(target.element_kind, "button");

        let bridge = attached(FORM);
        let record = bridge.click(&target, None);
        assert_eq!(record.kind, "navigate");
        assert_eq!(record.element_label, "Docs");
        assert_eq!(record.value, None);
    }

    #[test]
    fn value_sources_override_the_literal_value() {
        let mut bridge = attached(FORM);
        let target = bridge
            .click_targets()
            .into_iter()
            .find(|target| target.interaction_id == "weather_go")
            .unwrap();

        let record = bridge.click(&target, Some("web_browser_app"));
        assert_eq!(record.value.as_deref(), Some("Oslo,f"));
        assert_eq!(record.kind, DEFAULT_INTERACTION_KIND);

        assert!(bridge.set_input("city", "Bergen"));
        assert!(!bridge.set_input("missing", "x"));
        let record = bridge.click(&target, Some("web_browser_app"));
        assert_eq!(record.value.as_deref(), Some("Bergen,f"));
    }

    #[test]
    fn literal_values_pass_through() {
        let bridge = attached(FORM);
        let target = bridge.click_targets().pop().unwrap();
        let record = bridge.click(&target, None);
        assert_eq!(record.value.as_deref(), Some("42"));
        assert_eq!(record.element_kind, "a");
    }

    #[test]
    fn signals_are_consumed_once() {
        let html = r#"<p>ok</p><div id="terminal-state-update" data-vfs='{"tmp":{"a.txt":"hi"}}' data-path='["tmp"]'></div><div id="system-command" data-command="close_app"></div>"#;
        let mut view = ContentView::parse(html);

        let signals = view.take_signals();
        assert_eq!(signals.len(), 2);
        let Signal::StateUpdate { vfs, path } = &signals[0] else {
            panic!("expected a state update first");
        };
        assert_eq!(
            vfs.as_ref().unwrap().read_file(&crate::vfs::path_of(&["tmp", "a.txt"])),
            Ok("hi")
        );
        assert_eq!(path.as_deref(), Some(&["tmp".to_string()][..]));
        assert_eq!(signals[1], Signal::SystemCommand("close_app".to_string()));

        assert_eq!(view.to_html(), "<p>ok</p>");
        assert!(view.take_signals().is_empty());
    }

    #[test]
    fn malformed_state_updates_are_dropped() {
        let mut view =
            ContentView::parse(r#"<div id="terminal-state-update" data-vfs="{oops"></div><p>x</p>"#);
        assert!(view.take_signals().is_empty());
        assert_eq!(view.to_html(), "<p>x</p>");
    }

    #[test]
    fn scripts_run_once_per_revision_after_loading() {
        let html = "<p>clock</p><script>tick()</script>";
        let mut bridge = attached(html);
        let mut host = Recorder(Vec::new());

        assert_eq!(bridge.run_scripts(true, &mut host), 0);
        assert_eq!(bridge.run_scripts(false, &mut host), 1);
        assert_eq!(bridge.run_scripts(false, &mut host), 0);
        assert!(!bridge.attach(html, 1));
        assert!(bridge.attach(html, 2));
        assert_eq!(bridge.run_scripts(false, &mut host), 1);
        assert_eq!(host.0, vec!["tick()", "tick()"]);
    }

    #[test]
    fn terminal_history_round_trip() {
        let history = vec!["ls".to_string(), "pwd".to_string()];
        let mut bridge = attached(r#"<input id="terminal_input" value="">"#);
        bridge.sync_terminal_history(&history);

        assert_eq!(bridge.history_previous().as_deref(), Some("pwd"));
        assert_eq!(bridge.history_previous().as_deref(), Some("ls"));
        assert_eq!(bridge.history_previous().as_deref(), Some("ls"));
        assert_eq!(bridge.history_next().as_deref(), Some("pwd"));
        assert_eq!(bridge.input_value(TERMINAL_INPUT_ID).as_deref(), Some("pwd"));
        assert_eq!(bridge.history_next().as_deref(), Some(""));
        assert_eq!(bridge.history_next().as_deref(), Some(""));
    }

    #[test]
    fn cursor_resets_when_history_changes() {
        let mut cursor = TerminalHistoryCursor::new(&["a".to_string()]);
        cursor.previous();
        assert_eq!(cursor.index(), 0);

        cursor.sync(&["a".to_string()]);
        assert_eq!(cursor.index(), 0);
        cursor.sync(&["a".to_string(), "b".to_string()]);
        assert_eq!(cursor.index(), 2);
    }

    #[test]
    fn history_keys_need_a_terminal_input() {
        let mut bridge = attached("<p>no input</p>");
        bridge.sync_terminal_history(&["ls".to_string()]);
        assert_eq!(bridge.history_previous(), None);
    }

    #[test]
    fn upload_input_is_detected() {
        assert!(ContentView::parse(r#"<input type="file" id="file-upload">"#).has_upload_input());
        assert!(!ContentView::parse(r#"<div id="file-upload"></div>"#).has_upload_input());
    }

    #[test]
    fn textareas_report_their_text() {
        let view = ContentView::parse(r#"<textarea id="notepad-textarea">dear diary</textarea>"#);
        assert_eq!(view.input_value(NOTEPAD_TEXTAREA_ID).as_deref(), Some("dear diary"));
    }
}
