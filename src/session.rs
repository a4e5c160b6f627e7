// Session Module - One editing context: document, form, suggestion overlay and reference list
use tracing::{debug, info};

use crate::binding::{harvest, populate};
use crate::device::{DeviceClient, SyncError};
use crate::dropdown::{Dispatch, OverlayHost, Rect, ReferenceList, Scroll, Subscription, SuggestionDropdown, Target};
use crate::form::{synthesize, EditError, UiTree, WidgetId};
use crate::rows::{self, RowError};
use crate::settings::SettingsDocument;
use crate::transport::Transport;

pub struct EditingSession<D: SettingsDocument> {
    document: Option<D>,
    form: Option<UiTree>,
    dropdowns: Vec<SuggestionDropdown>,
    references: ReferenceList,
    overlay: OverlayHost,
    label_field: String,
    generation: u64,
}

impl<D: SettingsDocument> EditingSession<D> {
    pub fn new(label_field: impl Into<String>) -> Self {
        EditingSession {
            document: None,
            form: None,
            dropdowns: Vec::new(),
            references: ReferenceList::default(),
            overlay: OverlayHost::new(),
            label_field: label_field.into(),
            generation: 0,
        }
    }

    pub fn document(&self) -> Option<&D> {
        self.document.as_ref()
    }

    pub fn form(&self) -> Option<&UiTree> {
        self.form.as_ref()
    }

    pub fn overlay(&self) -> &OverlayHost {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayHost {
        &mut self.overlay
    }

    pub fn references(&self) -> &ReferenceList {
        &self.references
    }

    /// Number of documents installed so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_references(&mut self, references: ReferenceList) {
        debug!(entries = references.len(), "reference list installed");
        self.references = references;
    }

    /// Replace the document wholesale and rebuild the form from it.
    /// The previous form, its dropdowns and any open overlay are dropped.
    pub fn replace_document(&mut self, document: D) -> Result<(), SyncError> {
        let mut form = synthesize(&document);
        populate(&document, &mut form)?;
        let dropdowns = rows::wire(&mut form, &self.label_field);

        if let Some(subscription) = self.overlay.overlay().map(|o| o.subscription()) {
            self.overlay.close(subscription);
        }
        let reshaped = self.form.as_ref().map_or(true, |old| !old.same_shape(&form));
        self.generation += 1;
        info!(
            domain = D::DOMAIN,
            generation = self.generation,
            alarms = document.alarms().len(),
            reshaped,
            "document installed"
        );

        self.document = Some(document);
        self.form = Some(form);
        self.dropdowns = dropdowns;
        Ok(())
    }

    /// Harvest the whole form into the document, ready to be written.
    pub fn commit(&mut self) -> Result<&D, SyncError> {
        let (Some(form), Some(document)) = (self.form.as_ref(), self.document.as_mut()) else {
            return Err(SyncError::NotLoaded);
        };
        harvest(form, document)?;
        Ok(document)
    }

    /// Read the document from the device. A malformed answer leaves the
    /// current document and form untouched.
    pub async fn load<T: Transport>(&mut self, client: &DeviceClient<T>) -> Result<(), SyncError> {
        let document = client.read_settings::<D>().await?;
        self.replace_document(document)
    }

    /// Route an interaction through the overlay first.
    /// The caller continues with its own handling unless the overlay kept or consumed it.
    pub fn interact(&mut self, target: Target) -> Dispatch {
        match self.form.as_mut() {
            Some(form) => self.overlay.handle(target, form),
            None => Dispatch::Idle,
        }
    }

    pub fn dropdown_for(&self, input: WidgetId) -> Option<&SuggestionDropdown> {
        self.dropdowns.iter().find(|d| d.input == input)
    }

    /// Open the suggestion overlay under `input` if it has one
    pub fn activate_dropdown(&mut self, input: WidgetId, anchor: Rect, scroll: Scroll) -> Option<Subscription> {
        let dropdown = self.dropdowns.iter().find(|d| d.input == input)?;
        Some(dropdown.activate(&mut self.overlay, anchor, scroll, &self.references))
    }

    pub fn edit(&mut self, id: WidgetId, text: impl Into<String>) -> Result<(), EditError> {
        let form = self.form.as_mut().ok_or(EditError::UnknownWidget(id))?;
        form.edit(id, text)
    }

    pub fn toggle(&mut self, id: WidgetId) -> Result<bool, RowError> {
        let form = self.form.as_mut().ok_or(EditError::UnknownWidget(id))?;
        rows::toggle(form, id)
    }
}
