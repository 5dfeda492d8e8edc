use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A production visible to the logged-in user.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// One task attached to a shot, reduced to what the sheet needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSummary {
    pub task_type: String,
    pub status: String,
    pub assignees: Vec<String>,
}

/// One shot with its tasks, assembled from several API calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotRecord {
    pub id: String,
    pub name: String,
    pub sequence: String,
    pub description: String,
    pub nb_frames: Option<i64>,
    pub preview_file_id: Option<String>,
    pub tasks: Vec<TaskSummary>,
}

/// Blocking client for the Kitsu (Zou) HTTP API.
///
/// Holds the JWT access token after a successful login and sends it as a
/// bearer header on every data call.
#[derive(Clone)]
pub struct KitsuClient {
    base_url: String,
    client: reqwest::blocking::Client,
    token: Option<String>,
}

/// Normalize a user-entered host into a full API base URL.
///
/// Adds `https://` when no scheme is given and appends `/api` when the
/// path does not already end with it.
pub fn normalize_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("https://{}", host);
    }
    let trimmed = host.trim_end_matches('/');
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{}/api", trimmed)
    }
}

/// Map transport-level login failures to something a user can act on.
fn friendly_login_error(raw: &str) -> String {
    if raw.contains("certificate") || raw.contains("SSL") || raw.contains("ssl") {
        "SSL certificate verification failed. Try enabling 'Skip SSL verification'.".to_string()
    } else if raw.contains("Connection") || raw.contains("connect") || raw.contains("dns") {
        "Could not connect to server. Check the URL and your network.".to_string()
    } else {
        raw.to_string()
    }
}

/// Read a string field, defaulting to empty when absent or not a string.
fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Read an optional non-empty string field.
fn opt_str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reduce a raw task row to a summary using the prefetched lookup maps.
///
/// Returns None for rows that are not JSON objects. Unknown status/type
/// ids render as "Unknown" rather than failing the export.
fn summarize_task(
    task: &Value,
    statuses: &HashMap<String, String>,
    types: &HashMap<String, String>,
) -> Option<TaskSummary> {
    if !task.is_object() {
        return None;
    }

    let lookup = |key: &str, map: &HashMap<String, String>| {
        task.get(key)
            .and_then(Value::as_str)
            .and_then(|id| map.get(id).cloned())
            .unwrap_or_else(|| "Unknown".to_string())
    };

    // Assignees arrive either as expanded person objects or as bare ids.
    let mut assignees = Vec::new();
    if let Some(list) = task.get("assignees").and_then(Value::as_array) {
        for person in list {
            match person {
                Value::Object(_) => {
                    let name = str_field(person, "first_name");
                    assignees.push(if name.is_empty() {
                        "Unknown".to_string()
                    } else {
                        name
                    });
                }
                Value::String(_) => assignees.push("User".to_string()),
                _ => {}
            }
        }
    }

    Some(TaskSummary {
        task_type: lookup("task_type_id", types),
        status: lookup("task_status_id", statuses),
        assignees,
    })
}

/// Build an id -> name map from a list endpoint, skipping malformed rows.
fn name_lookup(rows: &Value) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(list) = rows.as_array() {
        for row in list {
            if row.is_object() {
                let id = str_field(row, "id");
                if !id.is_empty() {
                    map.insert(id, str_field(row, "name"));
                }
            }
        }
    }
    map
}

impl KitsuClient {
    /// Create a client for the given host. `skip_ssl_verify` disables
    /// certificate checks for servers with self-signed certificates.
    pub fn new(host: &str, skip_ssl_verify: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(skip_ssl_verify)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: normalize_host(host),
            client,
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Authenticate and store the access token for subsequent calls.
    pub fn login(&mut self, email: &str, password: &str) -> Result<()> {
        let url = format!("{}/auth/login", self.base_url);
        let body = serde_json::json!({ "email": email, "password": password });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| anyhow!(friendly_login_error(&e.to_string())))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Login refused ({}). Check your email and password.",
                response.status()
            ));
        }

        let payload: Value = response.json().context("login response was not JSON")?;
        let token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("login response carried no access token"))?;

        self.token = Some(token.to_string());
        debug!(target: "api", "logged in against {}", self.base_url);
        Ok(())
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .with_context(|| format!("GET {} failed", url))?;
        if !response.status().is_success() {
            return Err(anyhow!("GET {} returned {}", url, response.status()));
        }
        response
            .json()
            .with_context(|| format!("GET {} returned invalid JSON", url))
    }

    fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .with_context(|| format!("GET {} failed", url))?;
        if !response.status().is_success() {
            return Err(anyhow!("GET {} returned {}", url, response.status()));
        }
        let bytes = response.bytes()?;
        Ok(bytes.to_vec())
    }

    /// All productions open to the logged-in user.
    pub fn get_projects(&self) -> Result<Vec<Project>> {
        let rows = self.get_json("data/projects/open")?;
        let mut projects = Vec::new();
        for row in rows.as_array().map(Vec::as_slice).unwrap_or_default() {
            // Skip rows missing an id or name instead of failing the list.
            match serde_json::from_value::<Project>(row.clone()) {
                Ok(project) => projects.push(project),
                Err(e) => warn!(target: "api", "skipping malformed project row: {}", e),
            }
        }
        Ok(projects)
    }

    pub fn get_shots_for_project(&self, project_id: &str) -> Result<Value> {
        self.get_json(&format!("data/projects/{}/shots", project_id))
    }

    pub fn get_tasks_for_shot(&self, shot_id: &str) -> Result<Value> {
        self.get_json(&format!("data/shots/{}/tasks", shot_id))
    }

    pub fn all_task_statuses(&self) -> Result<HashMap<String, String>> {
        Ok(name_lookup(&self.get_json("data/task-status")?))
    }

    pub fn all_task_types(&self) -> Result<HashMap<String, String>> {
        Ok(name_lookup(&self.get_json("data/task-types")?))
    }

    /// Download preview image bytes, preferring the high-resolution cover
    /// and falling back to the small thumbnail.
    pub fn download_preview(&self, preview_file_id: &str) -> Result<Vec<u8>> {
        let cover = format!("pictures/previews/preview-files/{}.png", preview_file_id);
        match self.get_bytes(&cover) {
            Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
            Ok(_) => debug!(target: "api", "empty cover for {}", preview_file_id),
            Err(e) => debug!(target: "api", "cover fetch failed for {}: {}", preview_file_id, e),
        }

        let thumbnail = format!("pictures/thumbnails/preview-files/{}.png", preview_file_id);
        self.get_bytes(&thumbnail)
    }

    /// Fetch every shot of a project with its tasks resolved to names.
    ///
    /// Lookup maps for task statuses and types are fetched once up front.
    /// Per-shot task failures are logged and leave the shot with an empty
    /// task list; only the initial shot listing can fail the call.
    pub fn fetch_project_shots(&self, project_id: &str) -> Result<Vec<ShotRecord>> {
        let shots = self.get_shots_for_project(project_id)?;
        let statuses = self.all_task_statuses().unwrap_or_else(|e| {
            warn!(target: "api", "task status lookup failed: {}", e);
            HashMap::new()
        });
        let types = self.all_task_types().unwrap_or_else(|e| {
            warn!(target: "api", "task type lookup failed: {}", e);
            HashMap::new()
        });

        let mut records = Vec::new();
        for shot in shots.as_array().map(Vec::as_slice).unwrap_or_default() {
            if !shot.is_object() {
                continue;
            }

            let mut record = ShotRecord {
                id: str_field(shot, "id"),
                name: {
                    let name = str_field(shot, "name");
                    if name.is_empty() {
                        "Unknown".to_string()
                    } else {
                        name
                    }
                },
                sequence: str_field(shot, "sequence_name"),
                description: str_field(shot, "description"),
                nb_frames: shot.get("nb_frames").and_then(Value::as_i64),
                preview_file_id: opt_str_field(shot, "preview_file_id"),
                tasks: Vec::new(),
            };

            if !record.id.is_empty() {
                match self.get_tasks_for_shot(&record.id) {
                    Ok(tasks) => {
                        for task in tasks.as_array().map(Vec::as_slice).unwrap_or_default() {
                            if let Some(summary) = summarize_task(task, &statuses, &types) {
                                record.tasks.push(summary);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(target: "api", "task fetch failed for shot {}: {}", record.name, e)
                    }
                }
            }

            records.push(record);
        }

        debug!(target: "api", "fetched {} shots for project {}", records.len(), project_id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_host_adds_scheme_and_api() {
        assert_eq!(
            normalize_host("kitsu.example.com"),
            "https://kitsu.example.com/api"
        );
    }

    #[test]
    fn test_normalize_host_keeps_existing_scheme() {
        assert_eq!(
            normalize_host("http://kitsu.local"),
            "http://kitsu.local/api"
        );
    }

    #[test]
    fn test_normalize_host_keeps_api_suffix() {
        assert_eq!(
            normalize_host("https://kitsu.example.com/api/"),
            "https://kitsu.example.com/api"
        );
    }

    #[test]
    fn test_friendly_login_error_ssl() {
        let msg = friendly_login_error("invalid peer certificate contents");
        assert!(msg.contains("Skip SSL verification"));
    }

    #[test]
    fn test_friendly_login_error_connection() {
        let msg = friendly_login_error("error trying to connect: dns error");
        assert!(msg.contains("Could not connect"));
    }

    #[test]
    fn test_summarize_task_resolves_names() {
        let statuses = HashMap::from([("s1".to_string(), "WIP".to_string())]);
        let types = HashMap::from([("t1".to_string(), "Compositing".to_string())]);
        let task = json!({
            "task_status_id": "s1",
            "task_type_id": "t1",
            "assignees": [{"first_name": "Ada"}, "some-id"]
        });

        let summary = summarize_task(&task, &statuses, &types).unwrap();
        assert_eq!(summary.task_type, "Compositing");
        assert_eq!(summary.status, "WIP");
        assert_eq!(
            summary.assignees,
            vec!["Ada".to_string(), "User".to_string()]
        );
    }

    #[test]
    fn test_summarize_task_unknown_ids() {
        let task = json!({ "task_status_id": "missing", "task_type_id": "missing" });
        let summary = summarize_task(&task, &HashMap::new(), &HashMap::new()).unwrap();
        assert_eq!(summary.task_type, "Unknown");
        assert_eq!(summary.status, "Unknown");
        assert!(summary.assignees.is_empty());
    }

    #[test]
    fn test_summarize_task_skips_non_objects() {
        assert!(summarize_task(&json!("just-an-id"), &HashMap::new(), &HashMap::new()).is_none());
    }

    #[test]
    fn test_name_lookup_skips_malformed_rows() {
        let rows = json!([
            {"id": "a", "name": "Alpha"},
            "not-an-object",
            {"name": "missing id"}
        ]);
        let map = name_lookup(&rows);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").map(String::as_str), Some("Alpha"));
    }
}
