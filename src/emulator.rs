// Emulator Module - Local stand-in for the clock's HTTP API, for development and tests
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::settings::{AlarmEntry, ClockSettings, NetworkSettings, ALARM_SLOTS, MAX_BRIGHTNESS, MAX_SOUND_LENGTH};
use crate::types::{FileEntry, RequestType};

// Longest file path the device filesystem accepts
pub const MAX_FILEPATH_LENGTH: usize = 47;
// 2000-01-01T00:00:00Z, the earliest time the clock accepts
pub const MIN_TIMESTAMP: i64 = 946_684_800;

const WAV_DIR: &str = "/www/";
const SAMPLE_SOUNDS: [&str; 6] = ["CardinalBird", "JollyLaugh", "SleighBells", "HappyBirthday", "ChurchBell", "bird1"];

#[derive(Debug, Clone)]
pub struct DeviceState {
    pub clock: ClockSettings,
    pub network: NetworkSettings,
    // Seconds between the emulated clock and the host clock
    pub time_offset: i64,
    pub files: BTreeMap<String, Vec<u8>>,
}

pub type SharedState = Arc<Mutex<DeviceState>>;

impl Default for DeviceState {
    fn default() -> Self {
        let mut alarms = vec![AlarmEntry::default(); ALARM_SLOTS];
        alarms[0] = AlarmEntry {
            hour: 10,
            minute: 15,
            is_alarm: true,
            sound: "bird1".to_string(),
            ..Default::default()
        };

        let mut passthrough = Map::new();
        passthrough.insert("ipmode".into(), json!(0));
        for prefix in ["ipbyte", "gwbyte", "maskbyte", "dns1byte", "dns2byte"] {
            for n in 1..=4 {
                passthrough.insert(format!("{}{}", prefix, n), json!(0));
            }
        }

        let mut files = BTreeMap::new();
        for name in ["index.html", "clock.html", "clock.js", "setup.html", "setup.js"] {
            files.insert(format!("{}{}", WAV_DIR, name), Vec::new());
        }
        for sound in SAMPLE_SOUNDS {
            // Bare RIFF header so sizes are non-zero
            files.insert(format!("{}{}.wav", WAV_DIR, sound), b"RIFF\0\0\0\0WAVE".to_vec());
        }

        DeviceState {
            clock: ClockSettings {
                alarm_on: false,
                default_on: true,
                sleep_minutes: 5,
                brightness: 0,
                alarms,
            },
            network: NetworkSettings {
                wifimode: 1,
                name: "project001".to_string(),
                apssid: "espclock001".to_string(),
                appw: String::new(),
                apchannel: 1,
                stssid: "DefaultStation".to_string(),
                stpw: "DefaultPassword".to_string(),
                timezone: "CET-1CES-2,M3.5.0/2,M10.5.0/3".to_string(),
                ntpserver: "pool.ntp.org".to_string(),
                passthrough,
            },
            time_offset: 0,
            files,
        }
    }
}

impl DeviceState {
    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn now(&self) -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp() + self.time_offset
    }

    fn list(&self, filesystem: &str) -> Vec<FileEntry> {
        let prefix = format!("{}/", filesystem.trim_end_matches('/'));
        self.files
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, bytes)| FileEntry {
                filename: path.clone(),
                filesize: bytes.len() as u64,
            })
            .collect()
    }

    fn wavs(&self) -> Vec<Value> {
        self.files
            .keys()
            .filter_map(|path| path.strip_prefix(WAV_DIR))
            .filter(|name| !name.contains('/'))
            .filter_map(|name| name.find(".wav").map(|dot| &name[..dot]))
            .map(|sound| json!({ "wavsound": sound }))
            .collect()
    }
}

/// Error replies mirror the device: status code plus a short text
fn http_error(status: StatusCode) -> Response {
    let text = match status {
        StatusCode::BAD_REQUEST => "Badly formed request",
        StatusCode::NOT_FOUND => "Web page not found",
        StatusCode::URI_TOO_LONG => "Request too long",
        _ => "Something went wrong with the request",
    };
    (status, text).into_response()
}

// Integer field within [min, max]; fractional values truncate like the firmware's valueint
fn number_in(object: &Value, key: &str, min: i64, max: i64) -> Option<u8> {
    let n = object.get(key)?.as_f64()?.trunc() as i64;
    if n < min || n > max {
        warn!(field = key, value = n, "value out of range");
        return None;
    }
    u8::try_from(n).ok()
}

fn flag(object: &Value, key: &str) -> Option<bool> {
    object.get(key)?.as_bool()
}

fn parse_alarm(item: &Value) -> Option<AlarmEntry> {
    let sound = item.get("sound")?.as_str()?;
    if sound.len() >= MAX_SOUND_LENGTH {
        warn!(sound, "sound name too long");
        return None;
    }
    Some(AlarmEntry {
        hour: number_in(item, "hour", 0, 23)?,
        minute: number_in(item, "minute", 0, 59)?,
        day: number_in(item, "day", 0, 31)?,
        month: number_in(item, "month", 0, 12)?,
        weekday: number_in(item, "weekday", 0, 7)?,
        is_alarm: flag(item, "is_alarm")?,
        sound: sound.to_string(),
    })
}

/// Every value must be present and valid, otherwise nothing is stored
pub fn validate_clock(request: &Value) -> Option<ClockSettings> {
    let alarms = request.get("alarms")?.as_array()?;
    if alarms.len() != ALARM_SLOTS {
        warn!(count = alarms.len(), "alarm array must have {} items", ALARM_SLOTS);
        return None;
    }
    Some(ClockSettings {
        alarm_on: flag(request, "alarm_on")?,
        default_on: flag(request, "default_on")?,
        sleep_minutes: number_in(request, "sleep_minutes", 1, 60)?,
        brightness: number_in(request, "brightness", 0, MAX_BRIGHTNESS as i64)?,
        alarms: alarms.iter().map(parse_alarm).collect::<Option<Vec<_>>>()?,
    })
}

// Optional string field with a length check; the first failure wins
fn checked_text(
    request: &Value,
    key: &str,
    valid: impl Fn(usize) -> bool,
    message: &'static str,
    target: &mut String,
) -> Result<(), &'static str> {
    if let Some(text) = request.get(key).and_then(Value::as_str) {
        if !valid(text.len()) {
            return Err(message);
        }
        *target = text.to_string();
    }
    Ok(())
}

/// Apply a network settings write onto a copy of the current settings.
/// Errors carry the device's message text.
pub fn validate_setup(request: &Value, current: &NetworkSettings) -> Result<NetworkSettings, &'static str> {
    let mut next = current.clone();

    let wifimode = request
        .get("wifimode")
        .and_then(Value::as_f64)
        .ok_or("Error 10006: wifimode should be a number")?;
    if !(0.0..=3.0).contains(&wifimode) || wifimode.fract() != 0.0 {
        return Err("Error 10005: Wifi mode not valid");
    }
    next.wifimode = wifimode as u8;

    checked_text(request, "name", |n| n < 32, "Error 10007: ESP Name is too long", &mut next.name)?;
    checked_text(request, "apssid", |n| n <= 32, "Error 10008: AP SSID is too long", &mut next.apssid)?;
    checked_text(request, "appw", |n| n <= 64, "Error 10009: AP key is too long", &mut next.appw)?;

    if let Some(channel) = request.get("apchannel").and_then(Value::as_f64) {
        if !(1.0..=13.0).contains(&channel) {
            return Err("Error 10010: AP Channel not valid 1-13");
        }
        next.apchannel = channel as u8;
    }

    checked_text(request, "stssid", |n| n <= 32, "Error 10011: Wifi client SSID is too long", &mut next.stssid)?;
    checked_text(request, "stpw", |n| n <= 64, "Error 10012: Wifi client key is too long", &mut next.stpw)?;
    checked_text(request, "timezone", |n| (4..40).contains(&n), "Error 10013: Timezone string length", &mut next.timezone)?;
    checked_text(request, "ntpserver", |n| (4..40).contains(&n), "Error 10014: NTP server name length", &mut next.ntpserver)?;

    // ip mode and address bytes
    for (key, value) in next.passthrough.iter_mut() {
        if let Some(n) = request.get(key).filter(|v| v.is_number()) {
            *value = n.clone();
        }
    }

    Ok(next)
}

async fn json_request(State(state): State<SharedState>, body: String) -> Response {
    let Ok(request) = serde_json::from_str::<Value>(&body) else {
        warn!("request body is not JSON");
        return http_error(StatusCode::BAD_REQUEST);
    };
    let Some(request_type) = request.get("RequestType").and_then(Value::as_str).and_then(RequestType::parse) else {
        warn!("no valid RequestType received");
        return http_error(StatusCode::BAD_REQUEST);
    };
    info!(request = %request_type, "emulator request");

    let mut device = state.lock().await;
    match request_type {
        RequestType::ClockRead => Json(&device.clock).into_response(),
        RequestType::ClockSet => match validate_clock(&request) {
            Some(clock) => {
                device.clock = clock;
                Json(json!({})).into_response()
            }
            None => http_error(StatusCode::BAD_REQUEST),
        },
        RequestType::SetupRead => Json(&device.network).into_response(),
        RequestType::SetupSet => match validate_setup(&request, &device.network) {
            Ok(network) => {
                device.network = network;
                Json(json!({ "message": "Settings Stored" })).into_response()
            }
            Err(message) => (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response(),
        },
        RequestType::TimeRead => Json(json!({ "utctimestamp": device.now() })).into_response(),
        RequestType::TimeSet => match request.get("utctimestamp").and_then(Value::as_f64) {
            Some(stamp) if stamp >= MIN_TIMESTAMP as f64 => {
                device.time_offset = stamp as i64 - time::OffsetDateTime::now_utc().unix_timestamp();
                Json(json!({})).into_response()
            }
            _ => http_error(StatusCode::BAD_REQUEST),
        },
        RequestType::FileList => match request.get("filesystem").and_then(Value::as_str) {
            Some(filesystem) => Json(json!({ "directory": device.list(filesystem) })).into_response(),
            None => http_error(StatusCode::BAD_REQUEST),
        },
        RequestType::WavList => Json(json!({ "wavs": device.wavs() })).into_response(),
        RequestType::DeleteFile => {
            let removed = request
                .get("filename")
                .and_then(Value::as_str)
                .and_then(|name| device.files.remove(name));
            match removed {
                Some(_) => Json(json!({})).into_response(),
                None => http_error(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    }
}

async fn file_upload(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if content_type != Some("application/octet-stream") {
        warn!(?content_type, "upload without octet-stream content type");
        return http_error(StatusCode::BAD_REQUEST);
    }
    let file_path = format!("/{}", path.trim_start_matches('/'));
    if file_path.len() > MAX_FILEPATH_LENGTH {
        warn!(path = %file_path, "upload path too long");
        return http_error(StatusCode::URI_TOO_LONG);
    }

    info!(path = %file_path, bytes = body.len(), "file uploaded");
    state.lock().await.files.insert(file_path, body.to_vec());
    (StatusCode::OK, "File uploaded").into_response()
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/json/request", post(json_request))
        .route("/api/file_upload/*path", post(file_upload))
        .with_state(state)
}

pub async fn run_emulator(ip: String, port: u16, state: SharedState) -> Result<()> {
    let addr = format!("{}:{}", ip, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🕰️  Clock emulator listening on http://{}:{}", ip, port);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn post_json(state: &SharedState, body: Value) -> (StatusCode, String) {
        let request = Request::post("/api/json/request")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn clock_request(clock: &ClockSettings) -> Value {
        let mut value = serde_json::to_value(clock).unwrap();
        value["RequestType"] = json!("ClockSet");
        value
    }

    #[tokio::test]
    async fn test_clock_read_and_set() {
        let state = DeviceState::default().shared();
        let (status, body) = post_json(&state, json!({"RequestType": "ClockRead"})).await;
        assert_eq!(status, StatusCode::OK);
        let clock: ClockSettings = serde_json::from_str(&body).unwrap();
        assert_eq!(clock.alarms.len(), ALARM_SLOTS);
        assert_eq!(clock.alarms[0].sound, "bird1");

        let current = state.lock().await.clock.clone();
        let mut request = clock_request(&current);
        request["brightness"] = json!(9);
        request["alarms"][4]["sound"] = json!("ChurchBell");
        let (status, _) = post_json(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        let device = state.lock().await;
        assert_eq!(device.clock.brightness, 9);
        assert_eq!(device.clock.alarms[4].sound, "ChurchBell");
    }

    #[tokio::test]
    async fn test_clock_set_is_all_or_nothing() {
        let state = DeviceState::default().shared();
        let before = state.lock().await.clock.clone();

        let mut request = clock_request(&before);
        request["brightness"] = json!(3);
        request["alarms"][7]["hour"] = json!(24);
        let (status, body) = post_json(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Badly formed request");
        assert_eq!(state.lock().await.clock, before);

        let mut request = clock_request(&before);
        request["alarms"].as_array_mut().unwrap().pop();
        assert_eq!(post_json(&state, request).await.0, StatusCode::BAD_REQUEST);

        let mut request = clock_request(&before);
        request["alarms"][2]["sound"] = json!("a_very_long_sound_name");
        assert_eq!(post_json(&state, request).await.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_setup_validation_messages() {
        let current = DeviceState::default().network;
        assert_eq!(
            validate_setup(&json!({"wifimode": 4}), &current).unwrap_err(),
            "Error 10005: Wifi mode not valid"
        );
        assert_eq!(
            validate_setup(&json!({"wifimode": "1"}), &current).unwrap_err(),
            "Error 10006: wifimode should be a number"
        );
        assert_eq!(
            validate_setup(&json!({"wifimode": 1, "name": "x".repeat(32)}), &current).unwrap_err(),
            "Error 10007: ESP Name is too long"
        );
        assert_eq!(
            validate_setup(&json!({"wifimode": 1, "apchannel": 14}), &current).unwrap_err(),
            "Error 10010: AP Channel not valid 1-13"
        );
        assert_eq!(
            validate_setup(&json!({"wifimode": 1, "timezone": "UTC"}), &current).unwrap_err(),
            "Error 10013: Timezone string length"
        );

        let next = validate_setup(&json!({"wifimode": 3, "stssid": "home", "apchannel": 6}), &current).unwrap();
        assert_eq!(next.wifimode, 3);
        assert_eq!(next.stssid, "home");
        assert_eq!(next.apchannel, 6);
        assert_eq!(next.name, current.name);
    }

    #[tokio::test]
    async fn test_setup_read_reports_ip_bytes() {
        let state = DeviceState::default().shared();
        let (_, body) = post_json(&state, json!({"RequestType": "SetupRead"})).await;
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["apssid"], "espclock001");
        assert_eq!(value["dns2byte4"], 0);
        assert_eq!(value["ipmode"], 0);
    }

    #[tokio::test]
    async fn test_unknown_request_type() {
        let state = DeviceState::default().shared();
        assert_eq!(post_json(&state, json!({"RequestType": "Reboot"})).await.0, StatusCode::BAD_REQUEST);
        assert_eq!(post_json(&state, json!({"brightness": 1})).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_time_set_rejects_old_timestamps() {
        let state = DeviceState::default().shared();
        let (status, _) = post_json(&state, json!({"RequestType": "TimeSet", "utctimestamp": 1000})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(&state, json!({"RequestType": "TimeSet", "utctimestamp": 1_000_000_000})).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = post_json(&state, json!({"RequestType": "TimeRead"})).await;
        let stamp: Value = serde_json::from_str(&body).unwrap();
        let read = stamp["utctimestamp"].as_i64().unwrap();
        assert!((1_000_000_000..1_000_000_010).contains(&read));
    }

    #[tokio::test]
    async fn test_files_and_wavs() {
        let state = DeviceState::default().shared();
        let (_, body) = post_json(&state, json!({"RequestType": "WavList"})).await;
        let wavs: Value = serde_json::from_str(&body).unwrap();
        let names: Vec<&str> = wavs["wavs"].as_array().unwrap().iter().map(|w| w["wavsound"].as_str().unwrap()).collect();
        assert_eq!(names.len(), SAMPLE_SOUNDS.len());
        assert!(names.contains(&"ChurchBell"));

        let (status, _) = post_json(&state, json!({"RequestType": "DeleteFile", "filename": "/www/bird1.wav"})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(&state, json!({"RequestType": "DeleteFile", "filename": "/www/bird1.wav"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (_, body) = post_json(&state, json!({"RequestType": "FileList", "filesystem": "/www"})).await;
        let listing: Value = serde_json::from_str(&body).unwrap();
        let files = listing["directory"].as_array().unwrap();
        assert_eq!(files.len(), 5 + SAMPLE_SOUNDS.len() - 1);
        assert!(files.iter().all(|f| f["filename"].as_str().unwrap().starts_with("/www/")));
    }

    #[tokio::test]
    async fn test_upload_checks() {
        let state = DeviceState::default().shared();
        let upload = |path: &str, content_type: &str| {
            Request::post(format!("/api/file_upload/{}", path))
                .header(CONTENT_TYPE, content_type)
                .body(Body::from(vec![7u8; 16]))
                .unwrap()
        };

        let response = router(state.clone()).oneshot(upload("www/bird2.wav", "application/octet-stream")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.lock().await.files["/www/bird2.wav"].len(), 16);

        let response = router(state.clone()).oneshot(upload("www/bird3.wav", "text/plain")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let long = format!("www/{}.wav", "x".repeat(40));
        let response = router(state.clone()).oneshot(upload(&long, "application/octet-stream")).await.unwrap();
        assert_eq!(response.status(), StatusCode::URI_TOO_LONG);
    }

    #[tokio::test]
    async fn test_session_round_trip_over_http() {
        use crate::device::{DeviceClient, SyncError};
        use crate::form::WidgetId;
        use crate::session::EditingSession;
        use crate::settings::AlarmField;
        use crate::transport::{HttpTransport, TransportError};
        use std::time::Duration;

        let state = DeviceState::default().shared();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let transport = HttpTransport::new(
            &format!("http://{}", addr),
            "api/json/request",
            "api/file_upload/www/",
            Duration::from_secs(5),
        )
        .unwrap();
        let client = DeviceClient::new(transport);

        let mut session = EditingSession::<ClockSettings>::new("wavsound");
        session.load(&client).await.unwrap();
        session.set_references(client.read_reference_list().await.unwrap());
        assert_eq!(session.references().len(), SAMPLE_SOUNDS.len());

        session.edit(WidgetId::Alarm { row: 3, field: AlarmField::Sound }, "ChurchBell").unwrap();
        session.edit(WidgetId::Alarm { row: 3, field: AlarmField::Hour }, "7").unwrap();
        session.toggle(WidgetId::Alarm { row: 3, field: AlarmField::IsAlarm }).unwrap();
        client.write_settings(session.commit().unwrap()).await.unwrap();
        {
            let device = state.lock().await;
            assert_eq!(device.clock.alarms[3].sound, "ChurchBell");
            assert_eq!(device.clock.alarms[3].hour, 7);
            assert!(device.clock.alarms[3].is_alarm);
        }

        let mut network = EditingSession::<crate::settings::NetworkSettings>::new("wavsound");
        network.load(&client).await.unwrap();
        network.edit(WidgetId::Scalar(0), "x".repeat(40)).unwrap();
        let rejected = network.commit().unwrap().clone();
        match client.write_settings(&rejected).await {
            Err(SyncError::Transport(TransportError::Status { status, body })) => {
                assert_eq!(status, 400);
                assert!(body.contains("Error 10007"));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(state.lock().await.network.name, "project001");

        let name = client.upload_file("sounds/bird2.wav", vec![1; 8]).await.unwrap();
        assert_eq!(name, "bird2.wav");
        assert!(state.lock().await.files.contains_key("/www/bird2.wav"));
    }
}
