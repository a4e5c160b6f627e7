// Rows Module - Per-row editing rules for the alarm list
use thiserror::Error;

use crate::dropdown::SuggestionDropdown;
use crate::form::{AlarmRow, EditError, UiTree, WidgetId};
use crate::settings::AlarmField;

#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("alarm row {0} does not exist")]
    NoSuchRow(usize),
    #[error("the default alarm cannot be switched")]
    DefaultRowLocked,
    #[error(transparent)]
    Edit(#[from] EditError),
}

// An enabled alarm keeps its time fixed until it is switched off again
fn apply_time_lock(row: &mut AlarmRow) {
    if row.is_default() {
        return;
    }
    let locked = row.is_alarm.checked;
    row.hour.read_only = locked;
    row.minute.read_only = locked;
}

/// Apply the row rules to a freshly populated tree and attach the sound dropdowns.
pub fn wire(tree: &mut UiTree, label_field: &str) -> Vec<SuggestionDropdown> {
    let mut dropdowns = Vec::with_capacity(tree.rows().len());

    for row in tree.rows_mut() {
        if row.is_default() {
            for field in AlarmField::ALL {
                if field.locked_on_default_row() {
                    row.widget_mut(field).disabled = true;
                }
            }
        }
        apply_time_lock(row);
        dropdowns.push(SuggestionDropdown::new(row.sound.id, label_field));
    }

    dropdowns
}

/// Runtime change of a row's alarm-enabled box
pub fn set_alarm_enabled(tree: &mut UiTree, row: usize, checked: bool) -> Result<(), RowError> {
    let alarm_row = tree.row_mut(row).ok_or(RowError::NoSuchRow(row))?;
    if alarm_row.is_default() {
        return Err(RowError::DefaultRowLocked);
    }
    alarm_row.is_alarm.checked = checked;
    apply_time_lock(alarm_row);
    Ok(())
}

/// Flip a checkbox, honouring the row rules. Returns the new state.
pub fn toggle(tree: &mut UiTree, id: WidgetId) -> Result<bool, RowError> {
    if let WidgetId::Alarm { row, field: AlarmField::IsAlarm } = id {
        let checked = !tree.row(row).ok_or(RowError::NoSuchRow(row))?.is_alarm.checked;
        set_alarm_enabled(tree, row, checked)?;
        return Ok(checked);
    }

    let checked = !tree.widget(id).ok_or(EditError::UnknownWidget(id))?.checked;
    tree.set_checked(id, checked)?;
    Ok(checked)
}
