//! Per-report source priority: structured datasource, then the rendered
//! page table, then the secondary export for sheets still missing.

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct SourcePage {
    pub(super) name: String,
    pub(super) content: String,
}

impl SourcePage {
    pub(super) fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Already-read inputs for one report. `sheet_file_count` counts every sheet
/// file found on disk, including ones that failed to load.
#[derive(Debug, Clone, Default)]
pub(super) struct ReportSources {
    pub(super) sheet_file_count: usize,
    pub(super) sheet_pages: Vec<SourcePage>,
    pub(super) secondary: Option<SourcePage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct ReportStats {
    pub(super) structured_sheets: usize,
    pub(super) rendered_sheets: usize,
    pub(super) secondary_sheets: usize,
    pub(super) tables: usize,
    pub(super) skipped_units: usize,
    pub(super) failed_units: usize,
    pub(super) formula_count: usize,
    pub(super) formula_failures: usize,
}

#[derive(Debug)]
pub(super) struct ReportExtraction {
    pub(super) document: ReportDocument,
    pub(super) stats: ReportStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageFlow {
    Continue,
    StopReport,
}

struct ReportRun<'a> {
    trace_no: String,
    rules: &'a ExtractionRules,
    report: ReportAssembler,
    stats: ReportStats,
}

pub(super) fn extract_report(
    identity: ReportIdentity,
    sources: &ReportSources,
    rules: &ExtractionRules,
) -> ReportExtraction {
    let mut run = ReportRun {
        trace_no: identity.trace_no().unwrap_or_default(),
        rules,
        report: ReportAssembler::new(identity),
        stats: ReportStats::default(),
    };

    for page in &sources.sheet_pages {
        match run.sheet_page(page) {
            Ok(PageFlow::Continue) => {}
            Ok(PageFlow::StopReport) => {
                info!(trace_no = %run.trace_no, file = %page.name, "child or other-company report marked insert-only");
                return run.finish();
            }
            Err(err) => {
                run.stats.failed_units += 1;
                warn!(trace_no = %run.trace_no, file = %page.name, error = %err, "sheet page abandoned");
            }
        }
    }

    if let Some(secondary) = &sources.secondary {
        run.secondary(secondary);
    }

    if sources.sheet_file_count == 0 {
        run.report.mark_no_file();
    }

    run.finish()
}

impl ReportRun<'_> {
    fn finish(self) -> ReportExtraction {
        ReportExtraction {
            document: self.report.finish(),
            stats: self.stats,
        }
    }

    fn skip(&mut self, file: &str, unit: &str, reason: SkipReason) {
        self.stats.skipped_units += 1;
        debug!(trace_no = %self.trace_no, file, unit, reason = reason.as_str(), "unit skipped");
    }

    fn sheet_page(&mut self, page: &SourcePage) -> Result<PageFlow, ProcessError> {
        match find_datasource(&page.content)? {
            Some(datasource) => Ok(self.structured_sheet(page, &datasource)),
            None => {
                info!(trace_no = %self.trace_no, file = %page.name, "no datasource, reading rendered table");
                self.rendered_sheet(page)?;
                Ok(PageFlow::Continue)
            }
        }
    }

    fn structured_sheet(&mut self, page: &SourcePage, datasource: &Datasource) -> PageFlow {
        self.report.set_metadata(report_metadata(datasource));

        let report_title = value_text(datasource.title_en.as_ref());
        if self.rules.is_child_report(&report_title) {
            self.report.mark_insert_only();
            return PageFlow::StopReport;
        }

        let Some(source_sheet) = datasource.sheets.first() else {
            info!(trace_no = %self.trace_no, file = %page.name, "empty datasource");
            self.stats.skipped_units += 1;
            return PageFlow::Continue;
        };

        let mut sheet = Sheet {
            sheet_id: sheet_code(source_sheet.code.as_ref()),
            title_fa: source_sheet.title_fa.clone(),
            title_en: source_sheet.title_en.clone(),
            ..Sheet::default()
        };

        let sheet_title = sheet.title_en.clone().unwrap_or_default();
        if self.rules.is_interpretive_sheet(&sheet_title) {
            self.report.push_sheet(sheet.insert_only());
            return PageFlow::Continue;
        }

        for table in &source_sheet.tables {
            if table.cells.is_empty() {
                continue;
            }

            let (segmented, evaluation) = extract_datasource_table(table, self.rules);
            if evaluation.formula_count > 0 {
                debug!(
                    trace_no = %self.trace_no,
                    file = %page.name,
                    formulas = evaluation.formula_count,
                    applied = evaluation.applied_count,
                    division_by_zero = evaluation.division_by_zero_count,
                    failed = evaluation.failures.len(),
                    "datasource table evaluated"
                );
            }
            self.stats.formula_count += evaluation.formula_count;
            self.stats.formula_failures += evaluation.failures.len();

            match segmented {
                Segmented::Tables(tables) => sheet.tables.extend(tables),
                Segmented::Skip(reason) => self.skip(&page.name, "datasource table", reason),
            }
        }

        if sheet.tables.is_empty() {
            debug!(trace_no = %self.trace_no, file = %page.name, "datasource sheet produced no tables");
            return PageFlow::Continue;
        }

        self.stats.structured_sheets += 1;
        self.stats.tables += sheet.tables.len();
        self.report.push_sheet(sheet);
        PageFlow::Continue
    }

    fn rendered_sheet(&mut self, page: &SourcePage) -> Result<(), ProcessError> {
        let rendered = read_rendered_page(&page.content)?;

        if self.rules.skips_sheet_code(rendered.sheet_code) {
            debug!(trace_no = %self.trace_no, file = %page.name, code = rendered.sheet_code, "sheet code skipped by policy");
            self.stats.skipped_units += 1;
            return Ok(());
        }

        if rendered.table_count == 0 {
            info!(trace_no = %self.trace_no, file = %page.name, "empty rendered table");
            return Ok(());
        }

        let table = match rendered.table {
            Ok(table) => table,
            Err(reason) => {
                self.skip(&page.name, "rendered table", reason);
                return Ok(());
            }
        };

        match segment_rendered(&table, self.rules)? {
            Segmented::Tables(tables) if !tables.is_empty() => {
                self.stats.rendered_sheets += 1;
                self.stats.tables += tables.len();
                self.report.push_sheet(Sheet {
                    sheet_id: Some(rendered.sheet_code),
                    title_fa: Some(rendered.title),
                    tables,
                    ..Sheet::default()
                });
            }
            Segmented::Tables(_) => {
                debug!(trace_no = %self.trace_no, file = %page.name, "rendered table produced no rows");
            }
            Segmented::Skip(reason) => self.skip(&page.name, "rendered table", reason),
        }

        Ok(())
    }

    fn secondary(&mut self, source: &SourcePage) {
        for section in read_secondary_sections(&source.content, self.rules) {
            let title = section.title;
            if self.report.has_title(&title) {
                debug!(trace_no = %self.trace_no, title = %title, "sheet already extracted from a primary source");
                continue;
            }
            if self.rules.is_board_report(&title) {
                continue;
            }
            if self.rules.is_narrative_title(&title) {
                self.report.push_sheet(
                    Sheet {
                        title_fa: Some(title),
                        ..Sheet::default()
                    }
                    .insert_only(),
                );
                continue;
            }

            let table = match section.content {
                Ok(SectionContent::Table(table)) => table,
                Ok(SectionContent::Empty) => continue,
                Ok(SectionContent::Skip(reason)) => {
                    self.skip(&source.name, "secondary section", reason);
                    continue;
                }
                Err(err) => {
                    self.stats.skipped_units += 1;
                    debug!(trace_no = %self.trace_no, title = %title, error = %err, "secondary section skipped");
                    continue;
                }
            };

            match segment_rendered(&table, self.rules) {
                Ok(Segmented::Tables(tables)) if !tables.is_empty() => {
                    self.stats.secondary_sheets += 1;
                    self.stats.tables += tables.len();
                    self.report.push_sheet(Sheet {
                        title_fa: Some(title),
                        tables,
                        ..Sheet::default()
                    });
                }
                Ok(Segmented::Tables(_)) => {}
                Ok(Segmented::Skip(reason)) => {
                    self.skip(&source.name, "secondary section", reason);
                }
                Err(err) => {
                    self.stats.failed_units += 1;
                    warn!(trace_no = %self.trace_no, file = %source.name, title = %title, error = %err, "secondary table failed");
                }
            }
        }
    }
}

/// Prepares, evaluates and segments one datasource table. Every produced
/// table carries the source table's version and titles.
pub(super) fn extract_datasource_table(
    table: &DatasourceTable,
    rules: &ExtractionRules,
) -> (Segmented, EvaluationSummary) {
    let mut cells = prepare_cells(cells_from_table(table), rules);
    let evaluation = evaluate_cells(&mut cells);

    let segmented = match grid_from_cells(&cells) {
        Ok(grid) => segment_grid(&grid, rules),
        Err(reason) => Segmented::Skip(reason),
    };

    let segmented = match segmented {
        Segmented::Tables(tables) => Segmented::Tables(
            tables
                .into_iter()
                .map(|extracted| Table {
                    version_no: table.version_no.clone(),
                    title_en: table.title_en.clone(),
                    title_fa: table.title_fa.clone(),
                    ..extracted
                })
                .collect(),
        ),
        skip => skip,
    };

    (segmented, evaluation)
}
