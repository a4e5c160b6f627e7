// Form Module - Synthesizes an editable widget tree from the shape of a settings document
use thiserror::Error;

use crate::settings::{AlarmField, FieldKind, FieldSpec, SettingsDocument};

/// Stable address of a widget inside a synthesized tree.
/// Alarm widgets are addressed by row index, which is the only link back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetId {
    Scalar(usize),
    Alarm { row: usize, field: AlarmField },
}

#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("no widget at {0:?}")]
    UnknownWidget(WidgetId),
    #[error("{0} is disabled")]
    Disabled(&'static str),
    #[error("{0} is read-only")]
    ReadOnly(&'static str),
    #[error("{0} is a checkbox")]
    Checkbox(&'static str),
    #[error("{0} is not a checkbox")]
    NotCheckbox(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: WidgetId,
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    // Current text for number/text inputs
    pub value: String,
    // Current state for checkboxes
    pub checked: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub autocomplete: bool,
}

impl Widget {
    fn from_spec(id: WidgetId, spec: &FieldSpec) -> Self {
        Widget {
            id,
            name: spec.name,
            label: spec.label,
            kind: spec.kind,
            value: String::new(),
            checked: false,
            disabled: false,
            read_only: false,
            autocomplete: true,
        }
    }

    pub fn is_checkbox(&self) -> bool {
        matches!(self.kind, FieldKind::Checkbox)
    }

    /// Declared (min, max) for number inputs
    pub fn range(&self) -> Option<(f64, f64)> {
        match self.kind {
            FieldKind::Number { min, max, .. } => Some((min, max)),
            _ => None,
        }
    }
}

/// Visual groups of an alarm row, in render order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmGroup {
    Time,
    Date,
    Weekday,
    Flag,
    Sound,
}

impl AlarmGroup {
    pub const ALL: [AlarmGroup; 5] = [
        AlarmGroup::Time,
        AlarmGroup::Date,
        AlarmGroup::Weekday,
        AlarmGroup::Flag,
        AlarmGroup::Sound,
    ];

    pub fn fields(&self) -> &'static [AlarmField] {
        match self {
            AlarmGroup::Time => &[AlarmField::Hour, AlarmField::Minute],
            AlarmGroup::Date => &[AlarmField::Day, AlarmField::Month],
            AlarmGroup::Weekday => &[AlarmField::Weekday],
            AlarmGroup::Flag => &[AlarmField::IsAlarm],
            AlarmGroup::Sound => &[AlarmField::Sound],
        }
    }

    // Text drawn between the two inputs of a pair
    pub fn separator(&self) -> Option<&'static str> {
        match self {
            AlarmGroup::Time => Some(":"),
            AlarmGroup::Date => Some("/"),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AlarmGroup::Time => "Time",
            AlarmGroup::Date => "Date",
            AlarmGroup::Weekday => "Wd",
            AlarmGroup::Flag => "Alarm",
            AlarmGroup::Sound => "Sound",
        }
    }
}

/// Handle bundling every input of one alarm row.
/// Built once at synthesis, shared by populate, harvest and the row rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRow {
    pub index: usize,
    pub hour: Widget,
    pub minute: Widget,
    pub day: Widget,
    pub month: Widget,
    pub weekday: Widget,
    pub is_alarm: Widget,
    pub sound: Widget,
}

impl AlarmRow {
    fn new(index: usize) -> Self {
        let make = |field: AlarmField| Widget::from_spec(WidgetId::Alarm { row: index, field }, field.spec());
        let mut sound = make(AlarmField::Sound);
        sound.autocomplete = false;
        AlarmRow {
            index,
            hour: make(AlarmField::Hour),
            minute: make(AlarmField::Minute),
            day: make(AlarmField::Day),
            month: make(AlarmField::Month),
            weekday: make(AlarmField::Weekday),
            is_alarm: make(AlarmField::IsAlarm),
            sound,
        }
    }

    /// Row 0 holds the default alarm
    pub fn is_default(&self) -> bool {
        self.index == 0
    }

    pub fn widget(&self, field: AlarmField) -> &Widget {
        match field {
            AlarmField::Hour => &self.hour,
            AlarmField::Minute => &self.minute,
            AlarmField::Day => &self.day,
            AlarmField::Month => &self.month,
            AlarmField::Weekday => &self.weekday,
            AlarmField::IsAlarm => &self.is_alarm,
            AlarmField::Sound => &self.sound,
        }
    }

    pub fn widget_mut(&mut self, field: AlarmField) -> &mut Widget {
        match field {
            AlarmField::Hour => &mut self.hour,
            AlarmField::Minute => &mut self.minute,
            AlarmField::Day => &mut self.day,
            AlarmField::Month => &mut self.month,
            AlarmField::Weekday => &mut self.weekday,
            AlarmField::IsAlarm => &mut self.is_alarm,
            AlarmField::Sound => &mut self.sound,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiTree {
    pub domain: &'static str,
    scalars: Vec<Widget>,
    rows: Vec<AlarmRow>,
}

/// Build the widget tree for a document: scalar rows first, then one row per alarm.
/// Widgets carry constraints but no values; `binding::populate` fills them.
pub fn synthesize<D: SettingsDocument>(document: &D) -> UiTree {
    let scalars = D::fields()
        .iter()
        .enumerate()
        .map(|(i, spec)| Widget::from_spec(WidgetId::Scalar(i), spec))
        .collect();

    let rows = (0..document.alarms().len()).map(AlarmRow::new).collect();

    UiTree {
        domain: D::DOMAIN,
        scalars,
        rows,
    }
}

impl UiTree {
    pub fn scalars(&self) -> &[Widget] {
        &self.scalars
    }

    pub fn scalars_mut(&mut self) -> &mut [Widget] {
        &mut self.scalars
    }

    #[cfg(test)]
    pub fn scalar(&self, name: &str) -> Option<&Widget> {
        self.scalars.iter().find(|w| w.name == name)
    }

    pub fn rows(&self) -> &[AlarmRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [AlarmRow] {
        &mut self.rows
    }

    pub fn row(&self, index: usize) -> Option<&AlarmRow> {
        self.rows.get(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut AlarmRow> {
        self.rows.get_mut(index)
    }

    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        match id {
            WidgetId::Scalar(i) => self.scalars.get(i),
            WidgetId::Alarm { row, field } => self.rows.get(row).map(|r| r.widget(field)),
        }
    }

    pub fn widget_mut(&mut self, id: WidgetId) -> Option<&mut Widget> {
        match id {
            WidgetId::Scalar(i) => self.scalars.get_mut(i),
            WidgetId::Alarm { row, field } => self.rows.get_mut(row).map(|r| r.widget_mut(field)),
        }
    }

    /// Every widget in render order
    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.scalars.iter().chain(self.rows.iter().flat_map(|row| {
            AlarmField::ALL.iter().map(move |f| row.widget(*f))
        }))
    }

    /// Navigation grid: one line per scalar, one line of seven cells per alarm row
    pub fn focus_grid(&self) -> Vec<Vec<WidgetId>> {
        let mut grid: Vec<Vec<WidgetId>> = self.scalars.iter().map(|w| vec![w.id]).collect();
        for row in &self.rows {
            grid.push(AlarmField::ALL.iter().map(|f| row.widget(*f).id).collect());
        }
        grid
    }

    /// User edit of a text or number input. Disabled and read-only inputs refuse it.
    pub fn edit(&mut self, id: WidgetId, text: impl Into<String>) -> Result<(), EditError> {
        let widget = self.widget_mut(id).ok_or(EditError::UnknownWidget(id))?;
        if widget.is_checkbox() {
            return Err(EditError::Checkbox(widget.name));
        }
        if widget.disabled {
            return Err(EditError::Disabled(widget.name));
        }
        if widget.read_only {
            return Err(EditError::ReadOnly(widget.name));
        }
        widget.value = text.into();
        Ok(())
    }

    /// User click on a checkbox. Row rules live in `rows`, this only flips the state.
    pub fn set_checked(&mut self, id: WidgetId, checked: bool) -> Result<(), EditError> {
        let widget = self.widget_mut(id).ok_or(EditError::UnknownWidget(id))?;
        if !widget.is_checkbox() {
            return Err(EditError::NotCheckbox(widget.name));
        }
        if widget.disabled {
            return Err(EditError::Disabled(widget.name));
        }
        widget.checked = checked;
        Ok(())
    }

    // Structure without values, for comparing two syntheses
    fn shape(&self) -> Vec<(WidgetId, &'static str, FieldKind)> {
        self.widgets().map(|w| (w.id, w.name, w.kind)).collect()
    }

    pub fn same_shape(&self, other: &UiTree) -> bool {
        self.domain == other.domain && self.shape() == other.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::tests::sample_clock;
    use crate::settings::{ClockSettings, NetworkSettings, ALARM_SLOTS};

    #[test]
    fn test_scalar_rows_come_first_with_constraints() {
        let tree = synthesize(&sample_clock());
        let names: Vec<&str> = tree.scalars().iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["alarm_on", "default_on", "sleep_minutes", "brightness"]);
        assert_eq!(tree.scalar("brightness").unwrap().range(), Some((0.0, 15.0)));
        assert_eq!(tree.scalar("sleep_minutes").unwrap().range(), Some((1.0, 60.0)));
        assert!(tree.scalar("alarm_on").unwrap().is_checkbox());
    }

    #[test]
    fn test_one_row_per_alarm_and_no_values() {
        let tree = synthesize(&sample_clock());
        assert_eq!(tree.rows().len(), ALARM_SLOTS);
        for (i, row) in tree.rows().iter().enumerate() {
            assert_eq!(row.index, i);
            assert_eq!(row.hour.id, WidgetId::Alarm { row: i, field: AlarmField::Hour });
            assert!(row.hour.value.is_empty());
            assert!(!row.is_alarm.checked);
            assert!(!row.sound.autocomplete);
        }
        // 4 scalars + 7 inputs per alarm row
        assert_eq!(tree.widgets().count(), 4 + 7 * ALARM_SLOTS);
    }

    #[test]
    fn test_row_count_follows_document() {
        let mut clock = ClockSettings::default();
        assert_eq!(synthesize(&clock).rows().len(), 0);
        clock.alarms = vec![Default::default(); 3];
        assert_eq!(synthesize(&clock).rows().len(), 3);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let a = sample_clock();
        let mut b = sample_clock();
        b.alarms.reverse();
        b.brightness = 15;
        assert!(synthesize(&a).same_shape(&synthesize(&b)));

        b.alarms.pop();
        assert!(!synthesize(&a).same_shape(&synthesize(&b)));
    }

    #[test]
    fn test_network_form_has_no_rows() {
        let tree = synthesize(&NetworkSettings::default());
        assert_eq!(tree.domain, "network");
        assert!(tree.rows().is_empty());
        assert_eq!(tree.scalar("appw").unwrap().kind, FieldKind::Password);
    }

    #[test]
    fn test_edit_respects_flags() {
        let mut tree = synthesize(&sample_clock());
        let hour = WidgetId::Alarm { row: 2, field: AlarmField::Hour };
        tree.edit(hour, "07").unwrap();
        assert_eq!(tree.widget(hour).unwrap().value, "07");

        tree.widget_mut(hour).unwrap().read_only = true;
        assert_eq!(tree.edit(hour, "08"), Err(EditError::ReadOnly("hour")));

        let flag = WidgetId::Alarm { row: 2, field: AlarmField::IsAlarm };
        assert_eq!(tree.edit(flag, "x"), Err(EditError::Checkbox("is_alarm")));
        assert_eq!(
            tree.edit(WidgetId::Scalar(99), "1"),
            Err(EditError::UnknownWidget(WidgetId::Scalar(99)))
        );
    }

    #[test]
    fn test_focus_grid_layout() {
        let tree = synthesize(&sample_clock());
        let grid = tree.focus_grid();
        assert_eq!(grid.len(), 4 + ALARM_SLOTS);
        assert_eq!(grid[0], vec![WidgetId::Scalar(0)]);
        assert_eq!(grid[4].len(), 7);
        assert_eq!(grid[4][6], WidgetId::Alarm { row: 0, field: AlarmField::Sound });
    }
}
