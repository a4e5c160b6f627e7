// Binding Module - Two-way projection between a settings document and its widget tree
use thiserror::Error;

use crate::form::{UiTree, Widget};
use crate::settings::{AlarmField, FieldValue, SettingsDocument};

#[derive(Debug, Error, PartialEq)]
pub enum BindingError {
    #[error("form was built for the {form} domain, document is {document}")]
    DomainMismatch {
        form: &'static str,
        document: &'static str,
    },
    #[error("form has {form} alarm rows but the document has {document}")]
    RowCountMismatch { form: usize, document: usize },
}

fn check_shape<D: SettingsDocument>(document: &D, tree: &UiTree) -> Result<(), BindingError> {
    if tree.domain != D::DOMAIN {
        return Err(BindingError::DomainMismatch {
            form: tree.domain,
            document: D::DOMAIN,
        });
    }
    if tree.rows().len() != document.alarms().len() {
        return Err(BindingError::RowCountMismatch {
            form: tree.rows().len(),
            document: document.alarms().len(),
        });
    }
    Ok(())
}

fn show(widget: &mut Widget, value: FieldValue) {
    if widget.is_checkbox() {
        widget.checked = value.as_bool();
    } else {
        widget.value = value.as_text();
    }
}

fn read(widget: &Widget) -> FieldValue {
    if widget.is_checkbox() {
        FieldValue::Bool(widget.checked)
    } else {
        FieldValue::Text(widget.value.clone())
    }
}

/// Copy every model value into its widget
pub fn populate<D: SettingsDocument>(document: &D, tree: &mut UiTree) -> Result<(), BindingError> {
    check_shape(document, tree)?;

    for widget in tree.scalars_mut() {
        if let Some(value) = document.field(widget.name) {
            show(widget, value);
        }
    }

    for (row, entry) in tree.rows_mut().iter_mut().zip(document.alarms()) {
        for field in AlarmField::ALL {
            show(row.widget_mut(field), entry.get(field));
        }
    }

    Ok(())
}

/// Read every editable widget back into the model at the same position.
///
/// The whole list is harvested on each call. Row 0 only contributes hour, minute
/// and sound; its other fields keep whatever the model already held.
pub fn harvest<D: SettingsDocument>(tree: &UiTree, document: &mut D) -> Result<(), BindingError> {
    check_shape(document, tree)?;

    for widget in tree.scalars() {
        document.set_field(widget.name, read(widget));
    }

    for (row, entry) in tree.rows().iter().zip(document.alarms_mut().iter_mut()) {
        for field in AlarmField::ALL {
            if row.is_default() && field.locked_on_default_row() {
                continue;
            }
            entry.set(field, &read(row.widget(field)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{synthesize, WidgetId};
    use crate::settings::tests::sample_clock;
    use crate::settings::{ClockSettings, NetworkSettings};

    fn bound(clock: &ClockSettings) -> UiTree {
        let mut tree = synthesize(clock);
        populate(clock, &mut tree).unwrap();
        tree
    }

    #[test]
    fn test_round_trip_reconstructs_document() {
        let original = sample_clock();
        let tree = bound(&original);
        let mut harvested = original.clone();
        harvest(&tree, &mut harvested).unwrap();
        assert_eq!(harvested, original);
    }

    #[test]
    fn test_round_trip_into_blank_document_keeps_default_row_model_values() {
        let original = sample_clock();
        let tree = bound(&original);

        let mut target = ClockSettings {
            alarms: vec![Default::default(); original.alarms.len()],
            ..Default::default()
        };
        target.alarms[0].weekday = 5;
        harvest(&tree, &mut target).unwrap();

        // Row 0 day/month/weekday/is_alarm are not harvested
        assert_eq!(target.alarms[0].weekday, 5);
        assert!(!target.alarms[0].is_alarm);
        assert_eq!(target.alarms[0].hour, original.alarms[0].hour);
        assert_eq!(target.alarms[0].sound, original.alarms[0].sound);
        assert_eq!(target.alarms[1..], original.alarms[1..]);
        assert_eq!(target.brightness, original.brightness);
    }

    #[test]
    fn test_positional_correlation() {
        let mut clock = sample_clock();
        clock.alarms.swap(1, 3);
        let tree = bound(&clock);
        assert_eq!(tree.row(1).unwrap().hour.value, "14");
        assert_eq!(tree.row(1).unwrap().minute.value, "50");
        assert_eq!(tree.row(3).unwrap().hour.value, "20");
        assert_eq!(tree.row(3).unwrap().minute.value, "58");
    }

    #[test]
    fn test_default_row_never_harvested_for_locked_fields() {
        let clock = sample_clock();
        let mut tree = bound(&clock);
        {
            let row0 = tree.row_mut(0).unwrap();
            row0.day.value = "17".into();
            row0.month.value = "9".into();
            row0.weekday.value = "3".into();
            row0.is_alarm.checked = false;
            row0.hour.value = "6".into();
        }
        let mut after = clock.clone();
        harvest(&tree, &mut after).unwrap();
        assert_eq!(after.alarms[0].day, clock.alarms[0].day);
        assert_eq!(after.alarms[0].month, clock.alarms[0].month);
        assert_eq!(after.alarms[0].weekday, clock.alarms[0].weekday);
        assert_eq!(after.alarms[0].is_alarm, clock.alarms[0].is_alarm);
        assert_eq!(after.alarms[0].hour, 6);
    }

    #[test]
    fn test_sound_edit_scenario() {
        let clock = sample_clock();
        let mut tree = bound(&clock);
        let row3 = tree.row(3).unwrap();
        assert_eq!(row3.hour.value, "14");
        assert_eq!(row3.minute.value, "50");

        tree.edit(WidgetId::Alarm { row: 3, field: AlarmField::Sound }, "ChurchBell")
            .unwrap();
        let mut after = clock.clone();
        harvest(&tree, &mut after).unwrap();
        assert_eq!(after.alarms[3].sound, "ChurchBell");
        let mut expected = clock.alarms[3].clone();
        expected.sound = "ChurchBell".into();
        assert_eq!(after.alarms[3], expected);
    }

    #[test]
    fn test_malformed_number_is_coerced_to_zero() {
        let clock = sample_clock();
        let mut tree = bound(&clock);
        tree.row_mut(5).unwrap().minute.value = "half past".into();
        let mut after = clock.clone();
        harvest(&tree, &mut after).unwrap();
        assert_eq!(after.alarms[5].minute, 0);
    }

    #[test]
    fn test_checkbox_semantics() {
        let mut clock = sample_clock();
        clock.default_on = true;
        clock.alarm_on = false;
        let tree = bound(&clock);
        assert!(tree.scalar("default_on").unwrap().checked);
        assert!(!tree.scalar("alarm_on").unwrap().checked);
        assert!(tree.row(2).unwrap().is_alarm.checked);
    }

    #[test]
    fn test_mismatched_tree_is_rejected() {
        let clock = sample_clock();
        let tree = bound(&clock);
        let mut shorter = clock.clone();
        shorter.alarms.truncate(10);
        assert_eq!(
            harvest(&tree, &mut shorter),
            Err(BindingError::RowCountMismatch { form: 20, document: 10 })
        );

        let mut network = NetworkSettings::default();
        assert!(matches!(
            harvest(&tree, &mut network),
            Err(BindingError::DomainMismatch { .. })
        ));
    }

    #[test]
    fn test_network_round_trip() {
        let network = NetworkSettings {
            wifimode: 3,
            name: "kitchen".into(),
            apchannel: 6,
            stssid: "home".into(),
            timezone: "CET-1CES-2,M3.5.0/2,M10.5.0/3".into(),
            ntpserver: "pool.ntp.org".into(),
            ..Default::default()
        };
        let mut tree = synthesize(&network);
        populate(&network, &mut tree).unwrap();
        assert_eq!(tree.scalar("apchannel").unwrap().value, "6");
        let mut after = NetworkSettings::default();
        harvest(&tree, &mut after).unwrap();
        assert_eq!(after, network);
    }
}
