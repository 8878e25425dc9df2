use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use super::*;
use crate::cli::ProcessArgs;
use crate::commands::inventory::{self, EXCEL_DIR, HTML_DIR};
use crate::model::{ProcessCounts, ProcessPaths, ProcessRunManifest};
use crate::util::{now_utc_string, read_json, utc_compact_string, write_json_pretty};

const EXPORT_FILE: &str = "fs_success_data.json";

pub fn run(args: ProcessArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let download_root = args.download_root.clone();
    let export_path = args
        .export_path
        .clone()
        .unwrap_or_else(|| download_root.join("export").join(EXPORT_FILE));
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        download_root.join("manifests").join(format!(
            "process_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    info!(download_root = %download_root.display(), run_id = %run_id, "starting process");

    let rules = ExtractionRules::load(args.rules_path.as_deref())?;
    let identities = load_identities(&args.reports_path, &args.trace_nos)?;

    let mut counts = ProcessCounts::default();
    let mut documents = Vec::with_capacity(identities.len());
    let mut reprocess_trace_nos = Vec::new();
    let mut warnings = Vec::new();

    for identity in identities {
        let Some(trace_no) = identity.trace_no() else {
            warn!("report record without trace_no skipped");
            warnings.push("report record without trace_no skipped".to_string());
            continue;
        };

        let (sources, read_failures) = load_sources(&download_root, &trace_no)?;
        for failure in &read_failures {
            warn!(trace_no = %trace_no, error = %failure, "source file unreadable");
            warnings.push(format!("{trace_no}: {failure}"));
        }

        let extraction = extract_report(identity, &sources, &rules);
        let document = extraction.document;
        let stats = extraction.stats;

        counts.report_count += 1;
        counts.sheet_file_count += sources.sheet_file_count;
        counts.sheet_count += document.sheets.len();
        counts.table_count += stats.tables;
        counts.structured_sheet_count += stats.structured_sheets;
        counts.rendered_sheet_count += stats.rendered_sheets;
        counts.secondary_sheet_count += stats.secondary_sheets;
        counts.insert_only_sheet_count += document
            .sheets
            .iter()
            .filter(|sheet| sheet.is_insert_only())
            .count();
        counts.skipped_unit_count += stats.skipped_units;
        counts.failed_unit_count += stats.failed_units + read_failures.len();
        counts.formula_count += stats.formula_count;
        counts.formula_failure_count += stats.formula_failures;

        let insert_only = document.to_insert.unwrap_or(false);
        let no_file = document.no_file.unwrap_or(false);
        if insert_only {
            counts.insert_only_report_count += 1;
        }
        if no_file {
            counts.no_file_report_count += 1;
        }
        if document.sheets.is_empty() {
            counts.empty_report_count += 1;
        }

        let failed = stats.failed_units > 0 || !read_failures.is_empty();
        if failed || (document.sheets.is_empty() && !insert_only && !no_file) {
            reprocess_trace_nos.push(trace_no.clone());
        }

        info!(
            trace_no = %trace_no,
            sheets = document.sheets.len(),
            tables = stats.tables,
            skipped = stats.skipped_units,
            failed = stats.failed_units,
            "report processed"
        );

        documents.push(document);
    }

    write_json_pretty(&export_path, &documents)?;
    info!(path = %export_path.display(), reports = documents.len(), "wrote export document");

    let manifest = ProcessRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_process_command(&args),
        paths: ProcessPaths {
            download_root: download_root.display().to_string(),
            reports_path: args.reports_path.display().to_string(),
            export_path: export_path.display().to_string(),
            rules_path: args
                .rules_path
                .as_ref()
                .map(|path| path.display().to_string()),
        },
        counts,
        reprocess_trace_nos,
        warnings,
        notes: vec![
            "Sources are tried per report in order: datasource, rendered table, secondary export."
                .to_string(),
        ],
    };

    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote process run manifest");
    info!(
        reports = manifest.counts.report_count,
        sheets = manifest.counts.sheet_count,
        tables = manifest.counts.table_count,
        reprocess = manifest.reprocess_trace_nos.len(),
        "process completed"
    );

    Ok(())
}

/// Caller identity records, optionally narrowed to the requested trace numbers.
fn load_identities(reports_path: &Path, trace_nos: &[String]) -> Result<Vec<ReportIdentity>> {
    let identities: Vec<ReportIdentity> = read_json(reports_path)?;
    if identities.is_empty() {
        bail!("no report records in {}", reports_path.display());
    }

    if trace_nos.is_empty() {
        return Ok(identities);
    }

    let wanted = trace_nos.iter().map(String::as_str).collect::<HashSet<_>>();
    let selected = identities
        .into_iter()
        .filter(|identity| {
            identity
                .trace_no()
                .map(|trace_no| wanted.contains(trace_no.as_str()))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    if selected.is_empty() {
        bail!(
            "none of the requested trace numbers are in {}",
            reports_path.display()
        );
    }
    Ok(selected)
}

/// Reads every sheet page and the secondary export of one report. Unreadable
/// files are returned as `SourceRead` errors instead of aborting the run.
fn load_sources(
    download_root: &Path,
    trace_no: &str,
) -> Result<(ReportSources, Vec<ProcessError>)> {
    let mut sources = ReportSources::default();
    let mut failures = Vec::new();

    let sheet_paths = inventory::sheet_page_paths(&download_root.join(HTML_DIR), trace_no)
        .with_context(|| format!("failed to list sheet pages for {trace_no}"))?;
    sources.sheet_file_count = sheet_paths.len();

    for path in sheet_paths {
        match read_source(&path) {
            Ok(page) => sources.sheet_pages.push(page),
            Err(err) => failures.push(err),
        }
    }

    let secondary = inventory::secondary_path(&download_root.join(EXCEL_DIR), trace_no);
    if secondary.exists() {
        match read_source(&secondary) {
            Ok(page) => sources.secondary = Some(page),
            Err(err) => failures.push(err),
        }
    } else {
        debug!(trace_no, path = %secondary.display(), "no secondary export");
    }

    Ok((sources, failures))
}

fn read_source(path: &Path) -> Result<SourcePage, ProcessError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path).map_err(|err| ProcessError::SourceRead {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    // Exported pages are occasionally not clean UTF-8.
    Ok(SourcePage::new(name, String::from_utf8_lossy(&bytes)))
}

fn render_process_command(args: &ProcessArgs) -> String {
    let mut command = vec![
        "fin-statements".to_string(),
        "process".to_string(),
        "--download-root".to_string(),
        args.download_root.display().to_string(),
        "--reports-path".to_string(),
        args.reports_path.display().to_string(),
    ];

    if let Some(path) = &args.export_path {
        command.push("--export-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.rules_path {
        command.push("--rules-path".to_string());
        command.push(path.display().to_string());
    }
    for trace_no in &args.trace_nos {
        command.push("--trace-no".to_string());
        command.push(trace_no.clone());
    }

    command.join(" ")
}
