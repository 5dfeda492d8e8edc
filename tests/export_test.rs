use anyhow::Result;
use httpmock::prelude::*;
use kitsu_exporter::api_client::{KitsuClient, Project, ShotRecord, TaskSummary};
use kitsu_exporter::config::config::Config;
use kitsu_exporter::export::{run_export, ExportEvent, ShotSheetExporter};
use serde_json::json;
use std::collections::HashMap;
use std::sync::mpsc;
use tempfile::TempDir;

/// 1x1 transparent PNG, enough for the embed path.
const TINY_PNG: [u8; 68] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60,
    0x00, 0x02, 0x00, 0x00, 0x05, 0x00, 0x01, 0x7a, 0x5e, 0xab, 0x3f, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

fn shot(id: &str, name: &str, preview: Option<&str>, tasks: Vec<(&str, &str)>) -> ShotRecord {
    ShotRecord {
        id: id.to_string(),
        name: name.to_string(),
        sequence: "SEQ01".to_string(),
        description: "desc".to_string(),
        nb_frames: Some(48),
        preview_file_id: preview.map(str::to_string),
        tasks: tasks
            .into_iter()
            .map(|(task_type, status)| TaskSummary {
                task_type: task_type.to_string(),
                status: status.to_string(),
                assignees: Vec::new(),
            })
            .collect(),
    }
}

#[test]
fn test_xlsx_with_embedded_thumbnail() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("Alpha_shots.xlsx");

    let records = vec![
        shot("sh1", "SH010", Some("pf1"), vec![("Animation", "WIP")]),
        shot("sh2", "SH020", None, vec![("Lighting", "Done")]),
    ];
    let thumbnails = HashMap::from([("sh1".to_string(), TINY_PNG.to_vec())]);

    let exporter = ShotSheetExporter::new(Config::default());
    let summary = exporter.export_xlsx(&records, &thumbnails, &path)?;

    assert!(summary.contains("2 rows"));
    assert!(std::fs::metadata(&path)?.len() > 0);
    Ok(())
}

#[test]
fn test_xlsx_survives_bad_image_bytes() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("broken.xlsx");

    let records = vec![shot("sh1", "SH010", Some("pf1"), vec![])];
    let thumbnails = HashMap::from([("sh1".to_string(), b"not a png".to_vec())]);

    // The row is written without an image instead of failing the export.
    let exporter = ShotSheetExporter::new(Config::default());
    exporter.export_xlsx(&records, &thumbnails, &path)?;
    assert!(std::fs::metadata(&path)?.len() > 0);
    Ok(())
}

#[test]
fn test_run_export_end_to_end() -> Result<()> {
    let server = MockServer::start();
    let dir = TempDir::new()?;

    server.mock(|when, then| {
        when.method(POST).path("/api/auth/login");
        then.status(200).json_body(json!({ "access_token": "tok" }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/projects/p1/shots");
        then.status(200).json_body(json!([
            {
                "id": "sh1",
                "name": "SH010",
                "sequence_name": "SEQ01",
                "nb_frames": 24,
                "preview_file_id": "pf1"
            }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/task-status");
        then.status(200)
            .json_body(json!([{ "id": "s1", "name": "WIP" }]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/task-types");
        then.status(200)
            .json_body(json!([{ "id": "t1", "name": "Animation" }]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/shots/sh1/tasks");
        then.status(200).json_body(json!([
            { "task_type_id": "t1", "task_status_id": "s1" }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/pictures/previews/preview-files/pf1.png");
        then.status(200).body(&TINY_PNG[..]);
    });

    let mut client = KitsuClient::new(&server.base_url(), false)?;
    client.login("jane@example.com", "secret")?;

    let project = Project {
        id: "p1".to_string(),
        name: "Alpha".to_string(),
    };
    let mut config = Config::default();
    config.export.output_dir = Some(dir.path().to_path_buf());

    let (tx, rx) = mpsc::channel();
    let path = run_export(&client, &project, &config, &tx)?;

    assert_eq!(path, dir.path().join("Alpha_shots.xlsx"));
    assert!(std::fs::metadata(&path)?.len() > 0);

    // Progress messages arrived in order for each stage.
    let progress: Vec<String> = rx
        .try_iter()
        .filter_map(|event| match event {
            ExportEvent::Progress(message) => Some(message),
            _ => None,
        })
        .collect();
    assert!(progress.iter().any(|m| m.contains("Fetching shot data")));
    assert!(progress.iter().any(|m| m.contains("Downloading thumbnails")));
    assert!(progress.iter().any(|m| m.contains("Writing spreadsheet")));
    Ok(())
}

#[test]
fn test_run_export_skips_thumbnails_when_disabled() -> Result<()> {
    let server = MockServer::start();
    let dir = TempDir::new()?;

    server.mock(|when, then| {
        when.method(POST).path("/api/auth/login");
        then.status(200).json_body(json!({ "access_token": "tok" }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/projects/p1/shots");
        then.status(200).json_body(json!([
            { "id": "sh1", "name": "SH010", "preview_file_id": "pf1" }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/task-status");
        then.status(200).json_body(json!([]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/task-types");
        then.status(200).json_body(json!([]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/data/shots/sh1/tasks");
        then.status(200).json_body(json!([]));
    });
    // No preview mock: with thumbnails disabled nothing fetches pictures.
    let preview_mock = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/api/pictures/");
        then.status(200).body(&TINY_PNG[..]);
    });

    let mut client = KitsuClient::new(&server.base_url(), false)?;
    client.login("jane@example.com", "secret")?;

    let project = Project {
        id: "p1".to_string(),
        name: "Alpha".to_string(),
    };
    let mut config = Config::default();
    config.export.output_dir = Some(dir.path().to_path_buf());
    config.export.embed_thumbnails = false;
    config.export.csv_sidecar = true;

    let (tx, _rx) = mpsc::channel();
    let path = run_export(&client, &project, &config, &tx)?;

    assert!(std::fs::metadata(&path)?.len() > 0);
    preview_mock.assert_hits(0);

    let csv_path = path.with_extension("csv");
    let csv = std::fs::read_to_string(&csv_path)?;
    assert!(csv.starts_with("Sequence,Shot Name,Description,Nb Frames"));
    assert!(csv.contains("SH010"));
    Ok(())
}
