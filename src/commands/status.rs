use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{ProcessRunManifest, SourceInventoryManifest};
use crate::util::{latest_json_with_prefix, read_json};

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.download_root.join("manifests");
    let inventory_path = manifest_dir.join("source_inventory.json");
    let export_path = args.download_root.join("export").join("fs_success_data.json");

    info!(download_root = %args.download_root.display(), "status requested");

    match latest_json_with_prefix(&manifest_dir, "process_run_")? {
        Some(path) => {
            let manifest: ProcessRunManifest = read_json(&path)?;
            info!(
                path = %path.display(),
                run_id = %manifest.run_id,
                status = %manifest.status,
                started_at = %manifest.started_at,
                updated_at = %manifest.updated_at,
                reports = manifest.counts.report_count,
                sheets = manifest.counts.sheet_count,
                tables = manifest.counts.table_count,
                insert_only_reports = manifest.counts.insert_only_report_count,
                no_file_reports = manifest.counts.no_file_report_count,
                failed_units = manifest.counts.failed_unit_count,
                formula_failures = manifest.counts.formula_failure_count,
                "loaded process run manifest"
            );
            if !manifest.reprocess_trace_nos.is_empty() {
                warn!(
                    count = manifest.reprocess_trace_nos.len(),
                    trace_nos = %manifest.reprocess_trace_nos.join(","),
                    "reports queued for reprocessing"
                );
            }
        }
        None => warn!(path = %manifest_dir.display(), "no process run manifest found"),
    }

    if inventory_path.exists() {
        let inventory: SourceInventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            report_count = inventory.report_count,
            file_count = inventory.file_count,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    if export_path.exists() {
        info!(path = %export_path.display(), "export document present");
    } else {
        warn!(path = %export_path.display(), "export document missing");
    }

    Ok(())
}
