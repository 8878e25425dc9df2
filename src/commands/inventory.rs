use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::info;

use crate::cli::InventoryArgs;
use crate::model::{ReportSourceEntry, SourceFileEntry, SourceInventoryManifest, SourceRole};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub const HTML_DIR: &str = "html";
pub const EXCEL_DIR: &str = "excel";
pub const SECONDARY_EXTENSION: &str = "xls";

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.download_root)?;

    if args.dry_run {
        info!(
            report_count = manifest.report_count,
            file_count = manifest.file_count,
            source = %manifest.download_root,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.download_root
            .join("manifests")
            .join("source_inventory.json")
    });

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(
        report_count = manifest.report_count,
        file_count = manifest.file_count,
        "inventory completed"
    );

    Ok(())
}

pub fn build_manifest(download_root: &Path) -> Result<SourceInventoryManifest> {
    let page_pattern = sheet_page_pattern()?;
    let mut by_report = BTreeMap::<String, Vec<SourceFileEntry>>::new();

    for path in list_files(&download_root.join(HTML_DIR))? {
        let filename = file_name(&path)?;
        let Some((trace_no, _)) = parse_sheet_page_name(&filename, &page_pattern) else {
            continue;
        };
        let sha256 = sha256_file(&path)?;
        by_report.entry(trace_no).or_default().push(SourceFileEntry {
            filename,
            role: SourceRole::SheetPage,
            sha256,
        });
    }

    for path in list_files(&download_root.join(EXCEL_DIR))? {
        let is_secondary = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(SECONDARY_EXTENSION))
            .unwrap_or(false);
        if !is_secondary {
            continue;
        }

        let Some(trace_no) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let filename = file_name(&path)?;
        let sha256 = sha256_file(&path)?;
        by_report
            .entry(trace_no.to_string())
            .or_default()
            .push(SourceFileEntry {
                filename,
                role: SourceRole::Secondary,
                sha256,
            });
    }

    if by_report.is_empty() {
        bail!("no report source files found in {}", download_root.display());
    }

    let reports = by_report
        .into_iter()
        .map(|(trace_no, mut files)| {
            files.sort_by(|a, b| a.filename.cmp(&b.filename));
            ReportSourceEntry { trace_no, files }
        })
        .collect::<Vec<_>>();
    let file_count = reports.iter().map(|report| report.files.len()).sum();

    Ok(SourceInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        download_root: download_root.display().to_string(),
        report_count: reports.len(),
        file_count,
        reports,
    })
}

/// Sheet pages of one report, `<trace_no>-<suffix>`, sorted by file name.
pub fn sheet_page_paths(html_dir: &Path, trace_no: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{trace_no}-");
    let mut paths = list_files(html_dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

pub fn secondary_path(excel_dir: &Path, trace_no: &str) -> PathBuf {
    excel_dir.join(format!("{trace_no}.{SECONDARY_EXTENSION}"))
}

pub fn sheet_page_pattern() -> Result<Regex> {
    Regex::new(r"^([^-]+)-(.+)$").context("failed to compile sheet page filename regex")
}

fn parse_sheet_page_name(filename: &str, pattern: &Regex) -> Option<(String, String)> {
    let captures = pattern.captures(filename)?;
    let trace_no = captures.get(1)?.as_str().to_string();
    let suffix = captures.get(2)?.as_str().to_string();
    Some((trace_no, suffix))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }

    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            files.push(path);
        }
    }

    Ok(files)
}
