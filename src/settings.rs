// Settings Module - In-memory documents mirroring the clock's configuration schema
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::RequestType;

// The firmware stores exactly this many alarm slots; slot 0 is the default alarm
pub const ALARM_SLOTS: usize = 20;
pub const MAX_BRIGHTNESS: u8 = 15;
// Sound names are stored in a 20 byte buffer on the device (including terminator)
pub const MAX_SOUND_LENGTH: usize = 20;

/// Input shape of a field, including the client-side constraints the form declares
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Checkbox,
    Number {
        min: f64,
        max: f64,
        step: f64,
        pattern: &'static str,
    },
    Text,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

const fn number(name: &'static str, label: &'static str, min: f64, max: f64, pattern: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Number { min, max, step: 1.0, pattern },
    }
}

const fn plain(name: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, label, kind }
}

/// Loosely typed value moving between widgets and documents
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric parse: blank text is 0, anything unparsable is NaN
    pub fn as_number(&self) -> f64 {
        match self {
            FieldValue::Number(n) => *n,
            FieldValue::Bool(b) => if *b { 1.0 } else { 0.0 },
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Number(n) => *n != 0.0 && !n.is_nan(),
            FieldValue::Text(s) => matches!(s.trim(), "true" | "on" | "1"),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

/// Coerce a value into a field's integer domain.
/// NaN and infinities become 0, then the declared range is applied.
pub fn coerce_number(kind: &FieldKind, value: &FieldValue) -> f64 {
    let n = value.as_number();
    let n = if n.is_finite() { n.trunc() } else { 0.0 };
    match kind {
        FieldKind::Number { min, max, .. } => n.clamp(*min, *max),
        _ => n,
    }
}

fn coerce_u8(spec: &FieldSpec, value: &FieldValue) -> u8 {
    coerce_number(&spec.kind, value).clamp(0.0, u8::MAX as f64) as u8
}

fn spec_of(specs: &'static [FieldSpec], name: &str) -> Option<&'static FieldSpec> {
    specs.iter().find(|s| s.name == name)
}

/// A configuration domain the device exposes (clock, network)
pub trait SettingsDocument: Serialize + DeserializeOwned + Default + Clone {
    const DOMAIN: &'static str;
    const READ: RequestType;
    const WRITE: RequestType;

    /// Scalar fields in form order
    fn fields() -> &'static [FieldSpec];

    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Returns false when the document has no such field
    fn set_field(&mut self, name: &str, value: FieldValue) -> bool;

    fn alarms(&self) -> &[AlarmEntry] {
        &[]
    }

    fn alarms_mut(&mut self) -> &mut [AlarmEntry] {
        &mut []
    }

    /// Parse a full document from a device response
    fn load(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

// ---------------------------------------------------------------------------
// Clock domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmField {
    Hour,
    Minute,
    Day,
    Month,
    Weekday,
    IsAlarm,
    Sound,
}

static ALARM_FIELD_SPECS: [FieldSpec; 7] = [
    number("hour", "Hour", 0.0, 24.0, "[0-9]{2}"),
    number("minute", "Minute", 0.0, 59.0, "[0-9]{2}"),
    number("day", "Day", 0.0, 31.0, "[0-9]{2}"),
    number("month", "Month", 0.0, 12.0, "[0-9]{2}"),
    number("weekday", "Weekday", 0.0, 7.0, "[0-7]{1}"),
    plain("is_alarm", "Alarm", FieldKind::Checkbox),
    plain("sound", "Sound", FieldKind::Text),
];

impl AlarmField {
    pub const ALL: [AlarmField; 7] = [
        AlarmField::Hour,
        AlarmField::Minute,
        AlarmField::Day,
        AlarmField::Month,
        AlarmField::Weekday,
        AlarmField::IsAlarm,
        AlarmField::Sound,
    ];

    pub fn spec(&self) -> &'static FieldSpec {
        let idx = match self {
            AlarmField::Hour => 0,
            AlarmField::Minute => 1,
            AlarmField::Day => 2,
            AlarmField::Month => 3,
            AlarmField::Weekday => 4,
            AlarmField::IsAlarm => 5,
            AlarmField::Sound => 6,
        };
        &ALARM_FIELD_SPECS[idx]
    }

    /// Fields the default alarm (slot 0) never edits
    pub fn locked_on_default_row(&self) -> bool {
        matches!(
            self,
            AlarmField::Day | AlarmField::Month | AlarmField::Weekday | AlarmField::IsAlarm
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmEntry {
    pub hour: u8,
    pub minute: u8,
    pub day: u8,
    pub month: u8,
    pub weekday: u8,
    pub is_alarm: bool,
    pub sound: String,
}

impl AlarmEntry {
    pub fn get(&self, field: AlarmField) -> FieldValue {
        match field {
            AlarmField::Hour => FieldValue::Number(self.hour as f64),
            AlarmField::Minute => FieldValue::Number(self.minute as f64),
            AlarmField::Day => FieldValue::Number(self.day as f64),
            AlarmField::Month => FieldValue::Number(self.month as f64),
            AlarmField::Weekday => FieldValue::Number(self.weekday as f64),
            AlarmField::IsAlarm => FieldValue::Bool(self.is_alarm),
            AlarmField::Sound => FieldValue::Text(self.sound.clone()),
        }
    }

    pub fn set(&mut self, field: AlarmField, value: &FieldValue) {
        let spec = field.spec();
        match field {
            AlarmField::Hour => self.hour = coerce_u8(spec, value),
            AlarmField::Minute => self.minute = coerce_u8(spec, value),
            AlarmField::Day => self.day = coerce_u8(spec, value),
            AlarmField::Month => self.month = coerce_u8(spec, value),
            AlarmField::Weekday => self.weekday = coerce_u8(spec, value),
            AlarmField::IsAlarm => self.is_alarm = value.as_bool(),
            AlarmField::Sound => self.sound = value.as_text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub alarm_on: bool,
    pub default_on: bool,
    pub sleep_minutes: u8,
    pub brightness: u8,
    pub alarms: Vec<AlarmEntry>,
}

static CLOCK_FIELDS: [FieldSpec; 4] = [
    plain("alarm_on", "Alarm on", FieldKind::Checkbox),
    plain("default_on", "Default on", FieldKind::Checkbox),
    number("sleep_minutes", "Sleep minutes", 1.0, 60.0, "[0-9]{2}"),
    number("brightness", "Brightness", 0.0, 15.0, "[0-9]{2}"),
];

impl SettingsDocument for ClockSettings {
    const DOMAIN: &'static str = "clock";
    const READ: RequestType = RequestType::ClockRead;
    const WRITE: RequestType = RequestType::ClockSet;

    fn fields() -> &'static [FieldSpec] {
        &CLOCK_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "alarm_on" => FieldValue::Bool(self.alarm_on),
            "default_on" => FieldValue::Bool(self.default_on),
            "sleep_minutes" => FieldValue::Number(self.sleep_minutes as f64),
            "brightness" => FieldValue::Number(self.brightness as f64),
            _ => return None,
        };
        Some(value)
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> bool {
        let Some(spec) = spec_of(&CLOCK_FIELDS, name) else {
            return false;
        };
        match name {
            "alarm_on" => self.alarm_on = value.as_bool(),
            "default_on" => self.default_on = value.as_bool(),
            "sleep_minutes" => self.sleep_minutes = coerce_u8(spec, &value),
            "brightness" => self.brightness = coerce_u8(spec, &value),
            _ => return false,
        }
        true
    }

    fn alarms(&self) -> &[AlarmEntry] {
        &self.alarms
    }

    fn alarms_mut(&mut self) -> &mut [AlarmEntry] {
        &mut self.alarms
    }
}

// ---------------------------------------------------------------------------
// Network domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub wifimode: u8,
    pub name: String,
    pub apssid: String,
    pub appw: String,
    pub apchannel: u8,
    pub stssid: String,
    pub stpw: String,
    pub timezone: String,
    pub ntpserver: String,
    // ipmode and the ip/gateway/mask/dns byte quads; reported by the device and sent back as-is
    #[serde(flatten)]
    pub passthrough: serde_json::Map<String, serde_json::Value>,
}

static NETWORK_FIELDS: [FieldSpec; 9] = [
    plain("name", "Clock name", FieldKind::Text),
    number("wifimode", "Wifi mode", 0.0, 3.0, "[0-3]{1}"),
    plain("apssid", "AP SSID", FieldKind::Text),
    plain("appw", "AP password", FieldKind::Password),
    number("apchannel", "AP channel", 1.0, 13.0, "[0-9]{1,2}"),
    plain("stssid", "Wifi SSID", FieldKind::Text),
    plain("stpw", "Wifi password", FieldKind::Password),
    plain("timezone", "Timezone", FieldKind::Text),
    plain("ntpserver", "NTP server", FieldKind::Text),
];

impl SettingsDocument for NetworkSettings {
    const DOMAIN: &'static str = "network";
    const READ: RequestType = RequestType::SetupRead;
    const WRITE: RequestType = RequestType::SetupSet;

    fn fields() -> &'static [FieldSpec] {
        &NETWORK_FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "wifimode" => FieldValue::Number(self.wifimode as f64),
            "apchannel" => FieldValue::Number(self.apchannel as f64),
            "name" => FieldValue::Text(self.name.clone()),
            "apssid" => FieldValue::Text(self.apssid.clone()),
            "appw" => FieldValue::Text(self.appw.clone()),
            "stssid" => FieldValue::Text(self.stssid.clone()),
            "stpw" => FieldValue::Text(self.stpw.clone()),
            "timezone" => FieldValue::Text(self.timezone.clone()),
            "ntpserver" => FieldValue::Text(self.ntpserver.clone()),
            _ => return None,
        };
        Some(value)
    }

    // The passthrough map must not pick up the request tag of an echoed request
    fn load(raw: &str) -> serde_json::Result<Self> {
        let mut network: NetworkSettings = serde_json::from_str(raw)?;
        network.passthrough.remove("RequestType");
        Ok(network)
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> bool {
        let Some(spec) = spec_of(&NETWORK_FIELDS, name) else {
            return false;
        };
        match name {
            "wifimode" => self.wifimode = coerce_u8(spec, &value),
            "apchannel" => self.apchannel = coerce_u8(spec, &value),
            "name" => self.name = value.as_text(),
            "apssid" => self.apssid = value.as_text(),
            "appw" => self.appw = value.as_text(),
            "stssid" => self.stssid = value.as_text(),
            "stpw" => self.stpw = value.as_text(),
            "timezone" => self.timezone = value.as_text(),
            "ntpserver" => self.ntpserver = value.as_text(),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Trimmed copy of a real ClockRead answer, padded to the full slot count
    pub(crate) fn sample_clock() -> ClockSettings {
        let mut alarms = vec![AlarmEntry::default(); ALARM_SLOTS];
        alarms[0] = AlarmEntry { hour: 14, minute: 25, day: 0, month: 0, weekday: 0, is_alarm: true, sound: "bird1".into() };
        alarms[1] = AlarmEntry { hour: 20, minute: 58, day: 3, month: 11, weekday: 0, is_alarm: false, sound: "bird1".into() };
        alarms[2] = AlarmEntry { hour: 21, minute: 2, day: 0, month: 0, weekday: 6, is_alarm: true, sound: "JollyLaugh".into() };
        alarms[3] = AlarmEntry { hour: 14, minute: 50, day: 0, month: 0, weekday: 0, is_alarm: false, sound: "bird1".into() };
        ClockSettings {
            alarm_on: false,
            default_on: true,
            sleep_minutes: 3,
            brightness: 4,
            alarms,
        }
    }

    #[test]
    fn test_load_replaces_whole_document() {
        let raw = serde_json::to_string(&sample_clock()).unwrap();
        let loaded = ClockSettings::load(&raw).unwrap();
        assert_eq!(loaded, sample_clock());
        assert_eq!(loaded.alarms.len(), ALARM_SLOTS);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        assert!(ClockSettings::load("{\"alarm_on\": tru").is_err());
    }

    #[test]
    fn test_numeric_coercion_is_permissive() {
        let mut clock = sample_clock();
        assert!(clock.set_field("brightness", FieldValue::Text("abc".into())));
        assert_eq!(clock.brightness, 0);
        clock.set_field("brightness", FieldValue::Text(" 12 ".into()));
        assert_eq!(clock.brightness, 12);
        // Above the declared maximum
        clock.set_field("brightness", FieldValue::Text("99".into()));
        assert_eq!(clock.brightness, MAX_BRIGHTNESS);
        // Blank parses as zero, then the 1..60 range applies
        clock.set_field("sleep_minutes", FieldValue::Text("".into()));
        assert_eq!(clock.sleep_minutes, 1);
    }

    #[test]
    fn test_boolean_from_checked_signal() {
        let mut clock = sample_clock();
        clock.set_field("alarm_on", FieldValue::Bool(true));
        assert!(clock.alarm_on);
        clock.set_field("alarm_on", FieldValue::Text("garbage".into()));
        assert!(!clock.alarm_on);
    }

    #[test]
    fn test_unknown_field_is_refused() {
        let mut clock = sample_clock();
        assert!(!clock.set_field("RequestType", FieldValue::Text("ClockSet".into())));
        assert!(clock.field("RequestType").is_none());
    }

    #[test]
    fn test_alarm_entry_field_access() {
        let mut entry = AlarmEntry::default();
        entry.set(AlarmField::Hour, &FieldValue::Text("14".into()));
        entry.set(AlarmField::Weekday, &FieldValue::Text("9".into()));
        entry.set(AlarmField::Sound, &FieldValue::Text("ChurchBell".into()));
        assert_eq!(entry.hour, 14);
        assert_eq!(entry.weekday, 7);
        assert_eq!(entry.get(AlarmField::Sound), FieldValue::Text("ChurchBell".into()));
    }

    #[test]
    fn test_network_passthrough_survives_round_trip() {
        let raw = r#"{"wifimode":2,"apssid":"espclock001","appw":"","stssid":"home","stpw":"secret","name":"kitchen","apchannel":6,"ipmode":0,"ipbyte1":192,"timezone":"CET-1CES-2,M3.5.0/2,M10.5.0/3","ntpserver":"pool.ntp.org"}"#;
        let net = NetworkSettings::load(raw).unwrap();
        assert_eq!(net.wifimode, 2);
        assert_eq!(net.passthrough.get("ipbyte1"), Some(&serde_json::json!(192)));
        let back: serde_json::Value = serde_json::to_value(&net).unwrap();
        assert_eq!(back["ipmode"], 0);
        assert_eq!(back["name"], "kitchen");
    }

    #[test]
    fn test_network_load_drops_request_tag() {
        let raw = r#"{"RequestType":"SetupRead","wifimode":1,"name":"project001","apchannel":1,"ipbyte1":10}"#;
        let net = NetworkSettings::load(raw).unwrap();
        assert!(!net.passthrough.contains_key("RequestType"));
        assert_eq!(net.passthrough.get("ipbyte1"), Some(&serde_json::json!(10)));

        let body = crate::types::Envelope::new(NetworkSettings::WRITE, &net).to_json().unwrap();
        assert_eq!(body.matches("\"RequestType\"").count(), 1);
        assert!(body.contains("\"RequestType\":\"SetupSet\""));
    }

    #[test]
    fn test_number_text_formatting() {
        assert_eq!(FieldValue::Number(14.0).as_text(), "14");
        assert_eq!(FieldValue::Number(0.5).as_text(), "0.5");
    }
}
