//! Two-step attendance protocol: look up the student's session, then record.

use crate::transport::{HttpReply, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// `date_time_in` format expected by the record endpoint.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%y %H:%M:%S";

pub const LOOKUP_PATH: &str = "/findStudents";
pub const RECORD_PATH: &str = "/recordAttendance";

/// Human-readable outcome of one attendance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttendanceStatus {
    /// Submitted, no outcome yet.
    Processing,
    SuccessfullyRecorded,
    AlreadyRecorded,
    WaitingForAnotherMethod,
    CannotBeRecorded,
    NoDataFound,
    ApiError,
    ConnectionError,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Processing => "Processing...",
            AttendanceStatus::SuccessfullyRecorded => "Successfully Recorded",
            AttendanceStatus::AlreadyRecorded => "Attendance Already Recorded",
            AttendanceStatus::WaitingForAnotherMethod => "Waiting For Another Method",
            AttendanceStatus::CannotBeRecorded => "Attendance Can't Be Recorded",
            AttendanceStatus::NoDataFound => "No Data Found",
            AttendanceStatus::ApiError => "API Error",
            AttendanceStatus::ConnectionError => "Connection Error",
        }
    }

    /// Status for a record-endpoint reply code.
    pub fn from_record_status(code: u16) -> Self {
        match code {
            200 => AttendanceStatus::SuccessfullyRecorded,
            404 => AttendanceStatus::AlreadyRecorded,
            407 => AttendanceStatus::WaitingForAnotherMethod,
            _ => AttendanceStatus::CannotBeRecorded,
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint and fixed payload fields for this capture point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub checkpoint_id: i64,
    pub attendance_timetable_id: i64,
    pub platform: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.0.123:8000".to_string(),
            checkpoint_id: 2,
            attendance_timetable_id: 1,
            platform: "FR".to_string(),
        }
    }
}

impl ApiSettings {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Runs the lookup → record exchange for one matched name.
pub struct AttendanceNotifier<T> {
    transport: T,
    settings: ApiSettings,
}

impl<T: Transport> AttendanceNotifier<T> {
    pub fn new(transport: T, settings: ApiSettings) -> Self {
        Self { transport, settings }
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// One attempt, no retry. `date_time_in` is sent verbatim and should be
    /// formatted with [`TIMESTAMP_FORMAT`].
    pub fn notify(&self, name: &str, date_time_in: &str) -> AttendanceStatus {
        let session_id = match self.lookup(name) {
            Ok(id) => id,
            Err(status) => return status,
        };
        tracing::info!(name, session_id = %session_id, "student session found");
        self.record(name, &session_id, date_time_in)
    }

    fn lookup(&self, name: &str) -> Result<Value, AttendanceStatus> {
        let url = self.settings.url(LOOKUP_PATH);
        let reply = self
            .transport
            .post_json(&url, &json!({ "name": name }))
            .map_err(|e| {
                tracing::warn!(name, url = %url, error = %e, "error connecting to attendance API");
                AttendanceStatus::ConnectionError
            })?;

        if reply.status != 200 {
            tracing::warn!(name, status = reply.status, body = %reply.body, "student lookup failed");
            return Err(AttendanceStatus::ApiError);
        }

        session_id_from(&reply).ok_or_else(|| {
            tracing::info!(name, "no data found in lookup response");
            AttendanceStatus::NoDataFound
        })
    }

    fn record(&self, name: &str, session_id: &Value, date_time_in: &str) -> AttendanceStatus {
        let url = self.settings.url(RECORD_PATH);
        let body = json!({
            "date_time_in": date_time_in,
            "is_attend": 1,
            "checkpoint_id": self.settings.checkpoint_id,
            "attendance_timetable_id": self.settings.attendance_timetable_id,
            "student_study_session_id": session_id,
            "platform": self.settings.platform,
        });

        match self.transport.post_json(&url, &body) {
            Ok(reply) => {
                let status = AttendanceStatus::from_record_status(reply.status);
                tracing::info!(name, code = reply.status, %status, payload = %body, "attendance sent");
                status
            }
            Err(e) => {
                tracing::warn!(name, url = %url, error = %e, "error connecting to attendance API");
                AttendanceStatus::ConnectionError
            }
        }
    }
}

/// `student_study_session_id` of the first row of a JSON array body.
fn session_id_from(reply: &HttpReply) -> Option<Value> {
    let rows: Vec<Value> = serde_json::from_str(&reply.body).ok()?;
    rows.first()?.get("student_study_session_id").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::sync::Mutex;

    /// Scripted endpoints keyed by path; `None` simulates a dead server.
    struct FakeApi {
        lookup: Option<HttpReply>,
        record: Option<HttpReply>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeApi {
        fn new(lookup: Option<HttpReply>, record: Option<HttpReply>) -> Self {
            Self { lookup, record, calls: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for FakeApi {
        fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
            self.calls.lock().unwrap().push((url.to_string(), body.clone()));
            let reply = if url.ends_with(LOOKUP_PATH) { &self.lookup } else { &self.record };
            reply.clone().ok_or_else(|| TransportError::Connection("refused".into()))
        }
    }

    fn one_row(id: Value) -> Option<HttpReply> {
        Some(HttpReply::new(200, json!([{ "student_study_session_id": id }]).to_string()))
    }

    fn notify(api: &FakeApi) -> AttendanceStatus {
        AttendanceNotifier::new(api, ApiSettings::default()).notify("alice", "01/05/24 08:00:00")
    }

    #[test]
    fn test_successful_record_sends_full_payload() {
        let api = FakeApi::new(one_row(json!(7)), Some(HttpReply::new(200, "")));
        assert_eq!(notify(&api), AttendanceStatus::SuccessfullyRecorded);

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "http://192.168.0.123:8000/findStudents");
        assert_eq!(calls[0].1, json!({ "name": "alice" }));
        assert_eq!(calls[1].0, "http://192.168.0.123:8000/recordAttendance");
        assert_eq!(
            calls[1].1,
            json!({
                "date_time_in": "01/05/24 08:00:00",
                "is_attend": 1,
                "checkpoint_id": 2,
                "attendance_timetable_id": 1,
                "student_study_session_id": 7,
                "platform": "FR",
            })
        );
    }

    #[test]
    fn test_lookup_non_200_is_api_error() {
        let api = FakeApi::new(Some(HttpReply::new(500, "oops")), Some(HttpReply::new(200, "")));
        assert_eq!(notify(&api), AttendanceStatus::ApiError);
        assert_eq!(api.calls().len(), 1);
    }

    #[test]
    fn test_lookup_connection_failure() {
        let api = FakeApi::new(None, Some(HttpReply::new(200, "")));
        assert_eq!(notify(&api), AttendanceStatus::ConnectionError);
        assert_eq!(api.calls().len(), 1);
    }

    #[test]
    fn test_lookup_empty_array_skips_record() {
        let api = FakeApi::new(Some(HttpReply::new(200, "[]")), Some(HttpReply::new(200, "")));
        assert_eq!(notify(&api), AttendanceStatus::NoDataFound);
        assert_eq!(api.calls().len(), 1);
    }

    #[test]
    fn test_lookup_malformed_body_is_no_data() {
        for body in ["", "not json", "{\"student_study_session_id\": 1}", "[{\"id\": 1}]"] {
            let api = FakeApi::new(Some(HttpReply::new(200, body)), Some(HttpReply::new(200, "")));
            assert_eq!(notify(&api), AttendanceStatus::NoDataFound, "body {body:?}");
        }
    }

    #[test]
    fn test_record_status_mapping() {
        let cases = [
            (200, AttendanceStatus::SuccessfullyRecorded),
            (404, AttendanceStatus::AlreadyRecorded),
            (407, AttendanceStatus::WaitingForAnotherMethod),
            (500, AttendanceStatus::CannotBeRecorded),
            (201, AttendanceStatus::CannotBeRecorded),
        ];
        for (code, expected) in cases {
            let api = FakeApi::new(one_row(json!(7)), Some(HttpReply::new(code, "")));
            assert_eq!(notify(&api), expected, "code {code}");
        }
    }

    #[test]
    fn test_record_connection_failure() {
        let api = FakeApi::new(one_row(json!(7)), None);
        assert_eq!(notify(&api), AttendanceStatus::ConnectionError);
        assert_eq!(api.calls().len(), 2);
    }

    #[test]
    fn test_string_session_id_forwarded_verbatim() {
        let api = FakeApi::new(one_row(json!("S-42")), Some(HttpReply::new(200, "")));
        notify(&api);
        assert_eq!(api.calls()[1].1["student_study_session_id"], json!("S-42"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let settings = ApiSettings { base_url: "http://api.local/".into(), ..ApiSettings::default() };
        assert_eq!(settings.url(LOOKUP_PATH), "http://api.local/findStudents");
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(AttendanceStatus::CannotBeRecorded.to_string(), "Attendance Can't Be Recorded");
        assert_eq!(AttendanceStatus::Processing.to_string(), "Processing...");
    }
}
