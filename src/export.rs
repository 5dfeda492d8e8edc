use crate::api_client::{KitsuClient, Project, ShotRecord};
use crate::config::config::Config;
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Image, Workbook};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

/// Fixed leading columns; discovered task-type columns follow.
pub const FIXED_HEADERS: [&str; 5] = [
    "Thumbnail",
    "Sequence",
    "Shot Name",
    "Description",
    "Nb Frames",
];

/// Progress events sent from the export worker to the UI thread.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Progress(String),
    Done(PathBuf),
    Failed(String),
}

/// Distinct task type names across all records, sorted for stable columns.
pub fn task_type_columns(records: &[ShotRecord]) -> Vec<String> {
    let mut types: Vec<String> = records
        .iter()
        .flat_map(|r| r.tasks.iter().map(|t| t.task_type.clone()))
        .collect();
    types.sort();
    types.dedup();
    types
}

/// Status for a task type on one shot. First matching task wins; shots
/// without that task type get a blank cell.
pub fn status_for_type<'a>(record: &'a ShotRecord, task_type: &str) -> &'a str {
    record
        .tasks
        .iter()
        .find(|t| t.task_type == task_type)
        .map(|t| t.status.as_str())
        .unwrap_or("")
}

/// Keep project names usable as file names.
fn sanitize_file_stem(name: &str) -> String {
    name.replace(['/', '\\', ':'], "_")
}

/// Default output location: `{project}_shots.xlsx` in the Downloads
/// folder, or under the configured output_dir when set.
pub fn output_path_for(project_name: &str, config: &Config) -> PathBuf {
    let dir = config
        .export
        .output_dir
        .clone()
        .or_else(dirs::download_dir)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(format!("{}_shots.xlsx", sanitize_file_stem(project_name)))
}

/// Writes shot records to spreadsheet files.
pub struct ShotSheetExporter {
    config: Config,
}

impl ShotSheetExporter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Write the shot table to an xlsx file with embedded thumbnails.
    ///
    /// `thumbnails` maps shot id to downloaded PNG bytes. Rows whose bytes
    /// are missing or rejected by the library are written without an image.
    pub fn export_xlsx(
        &self,
        records: &[ShotRecord],
        thumbnails: &HashMap<String, Vec<u8>>,
        path: &Path,
    ) -> Result<String> {
        let task_types = task_type_columns(records);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Shots")?;

        let bold = Format::new().set_bold();
        for (col, header) in FIXED_HEADERS
            .iter()
            .copied()
            .chain(task_types.iter().map(String::as_str))
            .enumerate()
        {
            worksheet.write_string_with_format(0, col as u16, header, &bold)?;
        }

        // Column widths follow the sheet layout: a wide image column, then
        // sized text columns, then uniform task columns.
        worksheet.set_column_width(0, self.config.export.image_column_width)?;
        worksheet.set_column_width(1, 15)?;
        worksheet.set_column_width(2, 15)?;
        worksheet.set_column_width(3, 30)?;
        worksheet.set_column_width(4, 10)?;
        for col in 0..task_types.len() {
            worksheet.set_column_width((5 + col) as u16, 12)?;
        }

        let mut embedded = 0usize;
        for (i, record) in records.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string(row, 1, &record.sequence)?;
            worksheet.write_string(row, 2, &record.name)?;
            worksheet.write_string(row, 3, &record.description)?;
            if let Some(frames) = record.nb_frames {
                worksheet.write_number(row, 4, frames as f64)?;
            }
            for (col, task_type) in task_types.iter().enumerate() {
                worksheet.write_string(row, (5 + col) as u16, status_for_type(record, task_type))?;
            }

            if let Some(bytes) = thumbnails.get(&record.id) {
                match Image::new_from_buffer(bytes) {
                    Ok(image) => {
                        let image = image.set_scale_to_size(800.0, 448.0, true);
                        worksheet.insert_image(row, 0, &image)?;
                        worksheet.set_row_height(row, self.config.export.image_row_height)?;
                        embedded += 1;
                    }
                    Err(e) => {
                        warn!(target: "export", "image rejected for shot {}: {}", record.name, e)
                    }
                }
            }
        }

        workbook
            .save(path)
            .with_context(|| format!("failed to save workbook to {}", path.display()))?;

        info!(target: "export", "wrote {} rows ({} thumbnails) to {}", records.len(), embedded, path.display());
        Ok(format!(
            "Exported {} rows to {}",
            records.len(),
            path.display()
        ))
    }

    /// Write the same flat table without images as CSV.
    pub fn export_csv(&self, records: &[ShotRecord], path: &Path) -> Result<String> {
        let task_types = task_type_columns(records);

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let mut headers: Vec<&str> = FIXED_HEADERS[1..].to_vec();
        headers.extend(task_types.iter().map(String::as_str));
        writer.write_record(&headers)?;

        for record in records {
            let mut row = vec![
                record.sequence.clone(),
                record.name.clone(),
                record.description.clone(),
                record
                    .nb_frames
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
            ];
            for task_type in &task_types {
                row.push(status_for_type(record, task_type).to_string());
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;

        Ok(format!(
            "Exported {} rows to {}",
            records.len(),
            path.display()
        ))
    }
}

/// The fetch-and-render sequence run on the worker thread.
///
/// Progress messages go through `tx`; the caller reports Done/Failed from
/// the returned Result. Thumbnail failures are downgraded to missing
/// images and never abort the job.
pub fn run_export(
    client: &KitsuClient,
    project: &Project,
    config: &Config,
    tx: &Sender<ExportEvent>,
) -> Result<PathBuf> {
    let _ = tx.send(ExportEvent::Progress(format!(
        "Fetching shot data for {}...",
        project.name
    )));
    let records = client.fetch_project_shots(&project.id)?;

    let mut thumbnails = HashMap::new();
    if config.export.embed_thumbnails {
        let _ = tx.send(ExportEvent::Progress(
            "Downloading thumbnails...".to_string(),
        ));
        for record in &records {
            if let Some(preview_id) = &record.preview_file_id {
                match client.download_preview(preview_id) {
                    Ok(bytes) if !bytes.is_empty() => {
                        thumbnails.insert(record.id.clone(), bytes);
                    }
                    Ok(_) => debug!(target: "export", "empty preview for shot {}", record.name),
                    Err(e) => {
                        warn!(target: "export", "thumbnail download failed for {}: {}", record.name, e)
                    }
                }
            }
        }
    }

    let _ = tx.send(ExportEvent::Progress("Writing spreadsheet...".to_string()));
    let path = output_path_for(&project.name, config);
    let exporter = ShotSheetExporter::new(config.clone());
    exporter.export_xlsx(&records, &thumbnails, &path)?;

    if config.export.csv_sidecar {
        let csv_path = path.with_extension("csv");
        if let Err(e) = exporter.export_csv(&records, &csv_path) {
            warn!(target: "export", "csv sidecar failed: {}", e);
        }
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::TaskSummary;

    fn record(name: &str, tasks: Vec<(&str, &str)>) -> ShotRecord {
        ShotRecord {
            id: format!("id-{}", name),
            name: name.to_string(),
            sequence: "SEQ01".to_string(),
            description: String::new(),
            nb_frames: Some(24),
            preview_file_id: None,
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
    fn test_task_type_columns_sorted_distinct() {
        let records = vec![
            record("SH010", vec![("Lighting", "WIP"), ("Animation", "Done")]),
            record("SH020", vec![("Animation", "WIP")]),
        ];
        assert_eq!(task_type_columns(&records), vec!["Animation", "Lighting"]);
    }

    #[test]
    fn test_status_first_match_wins() {
        let shot = record("SH010", vec![("Animation", "WIP"), ("Animation", "Done")]);
        assert_eq!(status_for_type(&shot, "Animation"), "WIP");
        assert_eq!(status_for_type(&shot, "Compositing"), "");
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("My/Show: One"), "My_Show_ One");
    }

    #[test]
    fn test_export_csv_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots.csv");
        let records = vec![
            record("SH010", vec![("Animation", "Done")]),
            record("SH020", vec![("Lighting", "WIP")]),
        ];

        let exporter = ShotSheetExporter::new(Config::default());
        let summary = exporter.export_csv(&records, &path).unwrap();
        assert!(summary.contains("2 rows"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Sequence,Shot Name,Description,Nb Frames,Animation,Lighting"
        );
        assert_eq!(lines.next().unwrap(), "SEQ01,SH010,,24,Done,");
        assert_eq!(lines.next().unwrap(), "SEQ01,SH020,,24,,WIP");
    }

    #[test]
    fn test_export_xlsx_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots.xlsx");
        let records = vec![record("SH010", vec![("Animation", "Done")])];

        let exporter = ShotSheetExporter::new(Config::default());
        exporter
            .export_xlsx(&records, &HashMap::new(), &path)
            .unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0);
    }

    #[test]
    fn test_output_path_prefers_configured_dir() {
        let mut config = Config::default();
        config.export.output_dir = Some(PathBuf::from("/tmp/exports"));
        let path = output_path_for("Demo", &config);
        assert_eq!(path, PathBuf::from("/tmp/exports/Demo_shots.xlsx"));
    }
}
