// Dropdown Module - Suggestion overlay for free-text inputs, backed by the device's reference list
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::form::{UiTree, WidgetId};

/// Name of the one shared overlay; a second one never exists
pub const OVERLAY_NAME: &str = "listBox";

/// On-screen rectangle of a widget, relative to the visible viewport
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Current scroll offset of the page
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scroll {
    pub x: f64,
    pub y: f64,
}

/// Where the overlay sits in page coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Placement {
    pub top: f64,
    pub left: f64,
    pub width: f64,
}

impl Placement {
    /// Directly below the anchor, same left edge and width
    pub fn below(anchor: Rect, scroll: Scroll) -> Self {
        Placement {
            top: scroll.y + anchor.bottom(),
            left: scroll.x + anchor.left,
            width: anchor.width,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WavListResponse {
    #[serde(default)]
    wavs: Vec<Value>,
}

/// Suggestion source fetched once per session. Entries stay loosely typed so
/// the label field can be chosen by configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceList {
    entries: Vec<Value>,
}

impl ReferenceList {
    pub fn new(entries: Vec<Value>) -> Self {
        ReferenceList { entries }
    }

    /// Parse a `{ "wavs": [ ... ] }` answer
    pub fn from_response(raw: &str) -> serde_json::Result<Self> {
        let response: WavListResponse = serde_json::from_str(raw)?;
        Ok(ReferenceList::new(response.wavs))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One label per entry. Missing fields show as empty rows.
    pub fn labels(&self, field: &str) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| match entry.get(field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect()
    }
}

/// Handle for the outside-interaction listener of one open overlay.
/// Disposed once, by whichever of selection or outside interaction comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub name: &'static str,
    pub owner: WidgetId,
    pub placement: Placement,
    pub rows: Vec<String>,
    pub highlighted: Option<usize>,
    subscription: Subscription,
}

impl Overlay {
    pub fn subscription(&self) -> Subscription {
        self.subscription
    }
}

/// What an interaction landed on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Input(WidgetId),
    OverlayRow(usize),
    Overlay,
    Elsewhere,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    // No overlay open, nothing intercepted
    Idle,
    KeptOpen,
    Selected { input: WidgetId, label: String },
    Dismissed,
}

/// Owns the shared overlay and the single live outside listener
#[derive(Debug, Default)]
pub struct OverlayHost {
    overlay: Option<Overlay>,
    next_subscription: u64,
}

impl OverlayHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the overlay for `input`. Any overlay already open is superseded.
    pub fn open(&mut self, input: WidgetId, anchor: Rect, scroll: Scroll, rows: Vec<String>) -> Subscription {
        if let Some(previous) = self.overlay.take() {
            debug!(owner = ?previous.owner, "superseding open overlay");
        }
        self.next_subscription += 1;
        let subscription = Subscription(self.next_subscription);
        self.overlay = Some(Overlay {
            name: OVERLAY_NAME,
            owner: input,
            placement: Placement::below(anchor, scroll),
            highlighted: if rows.is_empty() { None } else { Some(0) },
            rows,
            subscription,
        });
        subscription
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.overlay.is_some()
    }

    /// Listeners currently registered; never more than one
    #[cfg(test)]
    pub fn live_subscriptions(&self) -> usize {
        usize::from(self.overlay.is_some())
    }

    /// Dispose a subscription. Returns false if it was already disposed or superseded.
    pub fn close(&mut self, subscription: Subscription) -> bool {
        match &self.overlay {
            Some(overlay) if overlay.subscription == subscription => {
                self.overlay = None;
                true
            }
            _ => false,
        }
    }

    /// Route one interaction through the overlay before the target sees it.
    ///
    /// Selecting a row writes its label into the owning input and closes the
    /// overlay. Interactions on the owning input or the overlay keep it open;
    /// anything else dismisses it and is then free to proceed to its target.
    pub fn handle(&mut self, target: Target, tree: &mut UiTree) -> Dispatch {
        let Some(overlay) = &self.overlay else {
            return Dispatch::Idle;
        };
        let owner = overlay.owner;
        let subscription = overlay.subscription;

        match target {
            Target::OverlayRow(i) => {
                let Some(label) = overlay.rows.get(i).cloned() else {
                    return Dispatch::KeptOpen;
                };
                if let Some(widget) = tree.widget_mut(owner) {
                    widget.value = label.clone();
                }
                self.close(subscription);
                Dispatch::Selected { input: owner, label }
            }
            Target::Input(id) if id == owner => Dispatch::KeptOpen,
            Target::Overlay => Dispatch::KeptOpen,
            Target::Input(_) | Target::Elsewhere => {
                self.close(subscription);
                Dispatch::Dismissed
            }
        }
    }

    pub fn highlight_next(&mut self) {
        if let Some(overlay) = &mut self.overlay {
            if let Some(i) = overlay.highlighted {
                overlay.highlighted = Some((i + 1).min(overlay.rows.len().saturating_sub(1)));
            }
        }
    }

    pub fn highlight_prev(&mut self) {
        if let Some(overlay) = &mut self.overlay {
            if let Some(i) = overlay.highlighted {
                overlay.highlighted = Some(i.saturating_sub(1));
            }
        }
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.overlay.as_ref().and_then(|o| o.highlighted)
    }
}

/// Binds a text input to the reference list through the shared overlay
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionDropdown {
    pub input: WidgetId,
    pub label_field: String,
}

impl SuggestionDropdown {
    pub fn new(input: WidgetId, label_field: impl Into<String>) -> Self {
        SuggestionDropdown {
            input,
            label_field: label_field.into(),
        }
    }

    /// Activation of the input's container: Closed -> Open
    pub fn activate(
        &self,
        host: &mut OverlayHost,
        anchor: Rect,
        scroll: Scroll,
        references: &ReferenceList,
    ) -> Subscription {
        host.open(self.input, anchor, scroll, references.labels(&self.label_field))
    }
}
