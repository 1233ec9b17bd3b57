use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::preview::{PreviewClient, PreviewDelivery, PreviewPresentation, PreviewRequest};

// ============================================================================
// Editor Seam
// ============================================================================

/// A range in editor text offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub length: usize,
}

impl Selection {
    pub fn new(index: usize, length: usize) -> Self {
        Self { index, length }
    }

    /// A collapsed selection (cursor position).
    pub fn caret(index: usize) -> Self {
        Self { index, length: 0 }
    }
}

/// The rich-text editor a form field is bound to.
///
/// Offsets count text characters plus one position per block break, so
/// `len()` includes the break that ends the last block.
pub trait RichEditor {
    /// Current content as HTML.
    fn html(&self) -> String;

    /// Replace the content, parsing `html` into the editor's own model.
    fn set_html(&mut self, html: &str);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn selection(&self) -> Option<Selection>;

    fn set_selection(&mut self, index: usize);

    fn insert_text(&mut self, index: usize, text: &str);
}

// ============================================================================
// Form Controls
// ============================================================================

/// The hidden input that carries the template in the submitted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenField {
    pub id: String,
    pub value: String,
}

impl HiddenField {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Plain textarea used for editing the template as raw HTML.
/// Selection offsets are in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTextArea {
    value: String,
    selection: Option<(usize, usize)>,
    focused: bool,
}

impl RawTextArea {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.selection = None;
    }

    pub fn select(&mut self, start: usize, end: usize) {
        self.selection = Some((start.min(end), start.max(end)));
    }

    pub fn selection(&self) -> Option<(usize, usize)> {
        self.selection
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    /// Replace the selected text with `text`, or append it when nothing is
    /// selected. The caret ends up after the inserted text and the textarea
    /// takes focus.
    pub fn insert_at_selection(&mut self, text: &str) {
        let len = self.value.chars().count();
        let (start, end) = self
            .selection
            .map(|(s, e)| (s.min(len), e.min(len)))
            .unwrap_or((len, len));

        let byte = |offset: usize| {
            self.value
                .char_indices()
                .nth(offset)
                .map(|(b, _)| b)
                .unwrap_or(self.value.len())
        };
        let (start_byte, end_byte) = (byte(start), byte(end));
        self.value.replace_range(start_byte..end_byte, text);

        let caret = start + text.chars().count();
        self.selection = Some((caret, caret));
        self.focused = true;
    }
}

/// Textarea plus the toggle that switches to it, when the page has them.
#[derive(Debug, Clone, Default)]
pub struct RawControls {
    pub textarea: RawTextArea,
    pub toggle_checked: bool,
}

// ============================================================================
// Mode State Machine
// ============================================================================

/// Which representation of the template is showing, and therefore authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    RichView,
    RawView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub editor_visible: bool,
    pub textarea_visible: bool,
}

impl EditorMode {
    pub fn from_toggle(checked: bool) -> Self {
        if checked {
            EditorMode::RawView
        } else {
            EditorMode::RichView
        }
    }

    pub fn visibility(self) -> Visibility {
        Visibility {
            editor_visible: self == EditorMode::RichView,
            textarea_visible: self == EditorMode::RawView,
        }
    }
}

/// Where the textarea's content comes from the first time raw mode opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstActivation {
    /// Show the field's original value, untouched by editor normalization.
    #[default]
    SeedFromField,
    /// Show the editor's current HTML, like every later activation.
    CaptureEditor,
}

impl FirstActivation {
    pub fn as_str(self) -> &'static str {
        match self {
            FirstActivation::SeedFromField => "seed_from_field",
            FirstActivation::CaptureEditor => "capture_editor",
        }
    }
}

#[derive(Debug, Clone)]
struct RawMode {
    textarea: RawTextArea,
    mode: EditorMode,
    activated: bool,
}

// ============================================================================
// Binding
// ============================================================================

/// Keeps a rich-text editor, an optional raw-HTML textarea and the hidden
/// form field consistent.
#[derive(Debug, Clone)]
pub struct EditorBinding<E> {
    container_id: String,
    field: HiddenField,
    original_value: String,
    // Editor content right after seeding, to tell whether the user has edited it
    seeded_html: String,
    editor: E,
    raw: Option<RawMode>,
    first_activation: FirstActivation,
}

impl<E: RichEditor> EditorBinding<E> {
    /// Bind `editor` to `field`. Without a field there is nothing to bind and
    /// `None` comes back.
    pub fn initialize(
        field: Option<HiddenField>,
        container_id: impl Into<String>,
        mut editor: E,
        raw: Option<RawControls>,
        first_activation: FirstActivation,
    ) -> Option<Self> {
        let container_id = container_id.into();
        let Some(field) = field else {
            debug!(container = %container_id, "no backing field, editor not bound");
            return None;
        };

        editor.set_html(&field.value);

        let mut binding = Self {
            original_value: field.value.clone(),
            seeded_html: editor.html(),
            container_id,
            field,
            editor,
            raw: raw.as_ref().map(|controls| RawMode {
                textarea: controls.textarea.clone(),
                mode: EditorMode::RichView,
                activated: false,
            }),
            first_activation,
        };

        if raw.is_some_and(|controls| controls.toggle_checked) {
            binding.set_raw_mode(true);
        }

        Some(binding)
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn field(&self) -> &HiddenField {
        &self.field
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    pub fn textarea(&self) -> Option<&RawTextArea> {
        self.raw.as_ref().map(|raw| &raw.textarea)
    }

    pub fn textarea_mut(&mut self) -> Option<&mut RawTextArea> {
        self.raw.as_mut().map(|raw| &mut raw.textarea)
    }

    pub fn mode(&self) -> EditorMode {
        self.raw
            .as_ref()
            .map(|raw| raw.mode)
            .unwrap_or(EditorMode::RichView)
    }

    pub fn visibility(&self) -> Visibility {
        self.mode().visibility()
    }

    /// Handle a change of the raw-HTML toggle.
    pub fn set_raw_mode(&mut self, checked: bool) -> Visibility {
        let Some(raw) = self.raw.as_mut() else {
            return EditorMode::RichView.visibility();
        };

        let target = EditorMode::from_toggle(checked);
        if raw.mode == target {
            return target.visibility();
        }

        match target {
            EditorMode::RawView => {
                let current = self.editor.html();
                let seed_from_field = !raw.activated
                    && self.first_activation == FirstActivation::SeedFromField
                    && current == self.seeded_html;
                let html = if seed_from_field {
                    self.original_value.clone()
                } else {
                    current
                };
                raw.textarea.set_value(html);
                raw.activated = true;
            }
            EditorMode::RichView => {
                self.editor.set_html(raw.textarea.value());
            }
        }

        debug!(container = %self.container_id, mode = ?target, "editor mode switched");
        raw.mode = target;
        target.visibility()
    }

    /// Content of whichever view is showing.
    pub fn authoritative_content(&self) -> String {
        match &self.raw {
            Some(raw) if raw.mode == EditorMode::RawView => raw.textarea.value().to_string(),
            _ => self.editor.html(),
        }
    }

    /// Write the authoritative content back into the hidden field before the form posts.
    pub fn submit(&mut self) -> &HiddenField {
        self.field.value = self.authoritative_content();
        &self.field
    }

    /// Insert a placeholder token at the cursor of whichever view is showing.
    pub fn insert_variable(&mut self, token: &str) {
        if let Some(raw) = self.raw.as_mut().filter(|raw| raw.mode == EditorMode::RawView) {
            raw.textarea.insert_at_selection(token);
            return;
        }

        let index = self
            .editor
            .selection()
            .map(|selection| selection.index)
            .unwrap_or_else(|| self.editor.len().saturating_sub(1));
        self.editor.insert_text(index, token);
        self.editor.set_selection(index + token.chars().count());
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Every bound editor on a page, keyed by editor container id.
#[derive(Debug)]
pub struct EditorRegistry<E> {
    editors: HashMap<String, EditorBinding<E>>,
    first_activation: FirstActivation,
}

impl<E: RichEditor> EditorRegistry<E> {
    pub fn new(first_activation: FirstActivation) -> Self {
        Self {
            editors: HashMap::new(),
            first_activation,
        }
    }

    /// Bind an editor and record it under its container id. Returns whether a
    /// binding was made.
    pub fn initialize(
        &mut self,
        field: Option<HiddenField>,
        container_id: &str,
        editor: E,
        raw: Option<RawControls>,
    ) -> bool {
        match EditorBinding::initialize(field, container_id, editor, raw, self.first_activation) {
            Some(binding) => {
                self.editors.insert(container_id.to_string(), binding);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, editor_id: &str) -> Option<&EditorBinding<E>> {
        self.editors.get(editor_id)
    }

    pub fn get_mut(&mut self, editor_id: &str) -> Option<&mut EditorBinding<E>> {
        self.editors.get_mut(editor_id)
    }

    pub fn set_raw_mode(&mut self, editor_id: &str, checked: bool) -> Option<Visibility> {
        self.editors
            .get_mut(editor_id)
            .map(|binding| binding.set_raw_mode(checked))
    }

    /// Insert `token` into the named editor. Unknown editors are ignored.
    pub fn insert_variable(&mut self, editor_id: &str, token: &str) -> bool {
        match self.editors.get_mut(editor_id) {
            Some(binding) => {
                binding.insert_variable(token);
                true
            }
            None => false,
        }
    }

    /// Sync every bound field and return them as they will be posted.
    pub fn submit_all(&mut self) -> Vec<HiddenField> {
        let mut fields: Vec<HiddenField> = self
            .editors
            .values_mut()
            .map(|binding| binding.submit().clone())
            .collect();
        fields.sort_by(|a, b| a.id.cmp(&b.id));
        fields
    }

    /// Ask the server to render the named editor's current content with
    /// `template`'s sample data. `None` when the editor is unknown.
    pub async fn request_preview<C: PreviewClient>(
        &self,
        editor_id: &str,
        template: &str,
        client: &C,
        delivery: PreviewDelivery,
    ) -> Option<PreviewPresentation> {
        let binding = self.editors.get(editor_id)?;
        let request = PreviewRequest::new(template, binding.authoritative_content());

        debug!(editor = editor_id, template, "requesting preview");
        let presentation = match client.render_preview(&request).await {
            Ok(markup) => delivery.present(markup),
            Err(e) => {
                warn!(editor = editor_id, template, error = %e, "preview failed");
                PreviewPresentation::failed(&e)
            }
        };
        Some(presentation)
    }
}
