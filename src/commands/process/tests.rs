use serde_json::json;

use super::*;

const MARKER: &str = "شرح";

fn rules() -> ExtractionRules {
    ExtractionRules::default()
        .compiled()
        .expect("default rules compile")
}

fn identity(trace_no: &str) -> ReportIdentity {
    let mut fields = serde_json::Map::new();
    fields.insert("trace_no".to_string(), Value::from(trace_no));
    fields.insert("symbol".to_string(), Value::from("FOLD"));
    ReportIdentity(fields)
}

fn header(address: &str, row: i64, column: i64, text: &str) -> Cell {
    Cell::new(address, row, column, CellGroup::Header, text)
}

fn body(address: &str, row: i64, column: i64, text: &str) -> Cell {
    Cell::new(address, row, column, CellGroup::Body, text)
}

/// Two periods A and B after a marker in column 3; revenue for B is a formula.
fn statement_cells() -> Vec<Cell> {
    vec![
        header("A1", 1, 1, "Code"),
        header("B1", 1, 2, "Note"),
        header("C1", 1, 3, MARKER),
        header("D1", 1, 4, "A"),
        header("E1", 1, 5, "B"),
        body("A2", 2, 1, "101"),
        body("C2", 2, 3, "Revenue"),
        body("D2", 2, 4, "10"),
        body("E2", 2, 5, "").with_formula("=D2+5"),
        body("A3", 3, 1, "102"),
        body("C3", 3, 3, "Cost"),
        body("D3", 3, 4, "20"),
        body("E3", 3, 5, "25"),
    ]
}

fn ds_cell(group: &str, row: i64, column: i64, address: &str, value: &str, formula: &str) -> Value {
    json!({
        "cellGroupName": group,
        "rowSequence": row,
        "columnSequence": column,
        "address": address,
        "value": value,
        "formula": formula,
        "isVisible": true,
        "valueTypeName": "Text",
    })
}

fn statement_json_cells() -> Vec<Value> {
    vec![
        ds_cell("Header", 1, 1, "A1", MARKER, ""),
        ds_cell("Header", 1, 2, "B1", "1402", ""),
        ds_cell("Header", 1, 3, "C1", "1401", ""),
        ds_cell("Body", 2, 1, "A2", "Cash", ""),
        ds_cell("Body", 2, 2, "B2", "(۱,۲۰۰)", ""),
        ds_cell("Body", 2, 3, "C2", "800", ""),
        ds_cell("Body", 3, 1, "A3", "Total", ""),
        ds_cell("Body", 3, 2, "B3", "0", "=B2*2"),
        ds_cell("Body", 3, 3, "C3", "0", "=SUM(C2:C2)"),
    ]
}

fn datasource_html(datasource: Value) -> String {
    format!(
        "<html><head><script>var datasource = {datasource};\nvar ready = true;</script></head><body></body></html>"
    )
}

fn datasource_page(report_title_en: &str, sheet_title_fa: &str, sheet_title_en: &str) -> String {
    datasource_html(json!({
        "title_Fa": "صورت های مالی",
        "title_En": report_title_en,
        "period": 12,
        "yearEndToDate": "1402/12/29",
        "kind": 1,
        "type": 1,
        "isAudited": true,
        "state": 1,
        "sheets": [{
            "code": 1,
            "title_Fa": sheet_title_fa,
            "title_En": sheet_title_en,
            "tables": [{
                "versionNo": "7",
                "title_Fa": "جدول",
                "title_En": "Statement",
                "cells": statement_json_cells(),
            }],
        }],
    }))
}

fn rendered_page(code: i64, title: &str, table: &str) -> String {
    format!(
        r#"<html><body><select><option value="1">Cover</option><option value="{code}" selected="selected">
            {title}</option></select>{table}</body></html>"#
    )
}

fn section(title: &str, table: &str) -> String {
    format!("<div><div><h3>{title}</h3></div>{table}</div>")
}

fn secondary_page(sections: &[String]) -> String {
    format!("<html><body>{}</body></html>", sections.concat())
}

fn flat_statement_table() -> String {
    format!(
        "<table><tr><th>{MARKER}</th><th>1402</th></tr><tr><td>Sales</td><td>1,500</td></tr></table>"
    )
}

fn sources(pages: Vec<SourcePage>, secondary: Option<String>) -> ReportSources {
    ReportSources {
        sheet_file_count: pages.len(),
        sheet_pages: pages,
        secondary: secondary.map(|content| SourcePage::new("1.xls", content)),
    }
}

fn sheet_titled<'a>(document: &'a ReportDocument, title: &str) -> Option<&'a Sheet> {
    document
        .sheets
        .iter()
        .find(|sheet| sheet.title_fa.as_deref() == Some(title))
}

fn labels(names: &[&str]) -> Vec<ColumnLabel> {
    names
        .iter()
        .map(|name| ColumnLabel::Single(name.to_string()))
        .collect()
}

#[test]
fn statement_grid_evaluates_and_segments_into_one_table() {
    let mut cells = prepare_cells(statement_cells(), &rules());
    let summary = evaluate_cells(&mut cells);
    assert_eq!(summary.formula_count, 1);
    assert_eq!(summary.applied_count, 1);

    let grid = grid_from_cells(&cells).expect("grid");
    let Segmented::Tables(tables) = segment_grid(&grid, &rules()) else {
        panic!("expected tables");
    };

    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].columns, labels(&["A", "B"]));
    assert_eq!(
        tables[0].data,
        vec![
            TableRow {
                key: "Revenue".to_string(),
                value: vec![CellValue::Number(10.0), CellValue::Number(15.0)],
            },
            TableRow {
                key: "Cost".to_string(),
                value: vec![CellValue::Number(20.0), CellValue::Number(25.0)],
            },
        ]
    );
}

#[test]
fn segment_grid_emits_rightmost_marker_first() {
    let names = (0..12)
        .map(|index| {
            if [2, 5, 9].contains(&index) {
                MARKER.to_string()
            } else {
                format!("c{index}")
            }
        })
        .collect::<Vec<_>>();
    let row = (0..12)
        .map(|index| match index {
            2 => CellValue::text("left"),
            5 => CellValue::text("middle"),
            9 => CellValue::text("right"),
            other => CellValue::Number(other as f64),
        })
        .collect::<Vec<_>>();
    let grid = LabeledGrid {
        labels: names.into_iter().map(ColumnLabel::Single).collect(),
        rows: vec![row],
    };

    let Segmented::Tables(tables) = segment_grid(&grid, &rules()) else {
        panic!("expected tables");
    };

    assert_eq!(tables.len(), 3);
    assert_eq!(tables[0].columns, labels(&["c10", "c11"]));
    assert_eq!(tables[0].data[0].key, "right");
    assert_eq!(tables[1].columns, labels(&["c6", "c7", "c8"]));
    assert_eq!(tables[1].data[0].key, "middle");
    assert_eq!(tables[2].columns, labels(&["c3", "c4"]));
    assert_eq!(
        tables[2].data[0].value,
        vec![CellValue::Number(3.0), CellValue::Number(4.0)]
    );
}

#[test]
fn segment_grid_without_marker_skips() {
    let grid = LabeledGrid {
        labels: labels(&["Item", "1402"]),
        rows: vec![vec![CellValue::text("Cash"), CellValue::Number(1.0)]],
    };
    assert_eq!(
        segment_grid(&grid, &rules()),
        Segmented::Skip(SkipReason::NoSharh)
    );
}

#[test]
fn slices_drop_rows_with_only_missing_values_and_empty_tables() {
    let grid = LabeledGrid {
        labels: labels(&[MARKER, "1402", "1401", MARKER, "X"]),
        rows: vec![
            vec![
                CellValue::text("Cash"),
                CellValue::text("nan"),
                CellValue::Number(4.0),
                CellValue::text("Blank"),
                CellValue::Null,
            ],
            vec![
                CellValue::text("Empty"),
                CellValue::text(""),
                CellValue::text("None"),
                CellValue::text("Blank"),
                CellValue::Null,
            ],
        ],
    };

    let Segmented::Tables(tables) = segment_grid(&grid, &rules()) else {
        panic!("expected tables");
    };

    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].data.len(), 1);
    assert_eq!(
        tables[0].data[0].value,
        vec![CellValue::Null, CellValue::Number(4.0)]
    );
}

#[test]
fn fill_header_labels_prefers_vertical_fill() {
    let filled = fill_header_labels(vec![
        vec![Some("1402".to_string()), Some("1401".to_string())],
        vec![Some("Q1".to_string()), None],
    ]);
    assert_eq!(
        filled,
        vec![
            ColumnLabel::Levels(vec!["1402".to_string(), "Q1".to_string()]),
            ColumnLabel::Levels(vec!["1401".to_string(), "1401".to_string()]),
        ]
    );

    let across = fill_header_labels(vec![vec![Some("1402".to_string()), None]]);
    assert_eq!(across, labels(&["1402", "1402"]));
}

#[test]
fn evaluation_leaves_plain_cells_untouched() {
    let raw = ["(1,234)", "۲۵", "Revenue"];
    let mut cells = vec![
        body("A1", 1, 1, raw[0]),
        body("B1", 1, 2, raw[1]),
        body("C1", 1, 3, raw[2]),
        body("D1", 1, 4, "0").with_formula("A1+B1"),
    ];

    let summary = evaluate_cells(&mut cells);

    for (cell, raw) in cells.iter().zip(raw) {
        assert_eq!(cell.value, normalize_scalar(raw));
    }
    assert_eq!(cells[3].value, CellValue::Number(-1209.0));
    assert_eq!(summary.applied_count, 1);
}

#[test]
fn division_by_zero_keeps_the_original_value() {
    let mut cells = vec![
        body("A1", 1, 1, "5"),
        body("B1", 1, 2, ""),
        body("C1", 1, 3, "7").with_formula("=A1/B1"),
    ];

    let summary = evaluate_cells(&mut cells);

    assert_eq!(cells[2].value, CellValue::Number(7.0));
    assert_eq!(summary.division_by_zero_count, 1);
    assert!(summary.failures.is_empty());
}

#[test]
fn overflowing_round_keeps_the_original_value() {
    let mut cells = vec![
        body("A1", 1, 1, "5"),
        body("B1", 1, 2, "8").with_formula("=ROUND(A1, 400)"),
    ];

    let summary = evaluate_cells(&mut cells);

    assert_eq!(cells[1].value, CellValue::Number(8.0));
    assert_eq!(summary.applied_count, 0);
    assert_eq!(
        summary.failures,
        vec![(
            "B1".to_string(),
            FormulaError::TypeMismatch("non-finite result".to_string())
        )]
    );
}

#[test]
fn negation_applies_before_power_and_percent_divides_by_hundred() {
    let mut cells = vec![
        body("A1", 1, 1, "5"),
        body("B1", 1, 2, "").with_formula("=-A1^2"),
        body("C1", 1, 3, "").with_formula("=A1*20%"),
    ];

    let summary = evaluate_cells(&mut cells);

    assert_eq!(cells[1].value, CellValue::Number(25.0));
    assert_eq!(cells[2].value, CellValue::Number(1.0));
    assert!(summary.failures.is_empty());
}

#[test]
fn circular_references_fail_without_touching_values() {
    let mut cells = vec![
        body("A1", 1, 1, "1").with_formula("=B1"),
        body("B1", 1, 2, "2").with_formula("=A1"),
        body("C1", 1, 3, "3").with_formula("=A1+1"),
    ];

    let summary = evaluate_cells(&mut cells);

    let values = cells.iter().map(|cell| cell.value.clone()).collect::<Vec<_>>();
    assert_eq!(
        values,
        vec![
            CellValue::Number(1.0),
            CellValue::Number(2.0),
            CellValue::Number(3.0)
        ]
    );
    assert_eq!(summary.failures.len(), 3);
    assert!(
        summary
            .failures
            .iter()
            .all(|(_, err)| matches!(err, FormulaError::CircularReference(_)))
    );
}

#[test]
fn formulas_evaluate_in_dependency_order() {
    let mut cells = vec![
        body("A4", 4, 1, "").with_formula("=A3*2"),
        body("A3", 3, 1, "").with_formula("=SUM(A1:A2)"),
        body("A1", 1, 1, "1"),
        body("A2", 2, 1, "2"),
        body("B1", 1, 2, "9").with_formula("=Z9+1"),
        body("B2", 2, 2, "4").with_formula("=ROUND(A2/3, 2)"),
    ];

    let summary = evaluate_cells(&mut cells);

    assert_eq!(cells[0].value, CellValue::Number(6.0));
    assert_eq!(cells[1].value, CellValue::Number(3.0));
    assert_eq!(cells[4].value, CellValue::Number(9.0));
    assert_eq!(cells[5].value, CellValue::Number(0.67));
    assert_eq!(
        summary.failures,
        vec![(
            "B1".to_string(),
            FormulaError::UnresolvedReference("Z9".to_string())
        )]
    );
}

#[test]
fn prepare_cells_resolves_duplicates_and_policy_columns() {
    let cells = vec![
        header("C1", 1, 3, MARKER),
        header("D1", 1, 4, "1402"),
        header("E1", 1, 5, "1402"),
        header("F1", 1, 6, "درصد تغییر"),
        body("C2", 2, 3, "Old"),
        body("C2", 2, 3, "New"),
        body("D2", 2, 4, "5"),
        body("D2", 2, 4, "5"),
        body("E2", 2, 5, "5"),
        body("F2", 2, 6, "12"),
        body("D3", 3, 4, "").with_value_type("FormControl"),
        body("E3", 3, 5, "").with_value_type("FormControl"),
    ];

    let prepared = prepare_cells(cells, &rules());

    let mut columns = prepared
        .iter()
        .map(|cell| cell.column_sequence)
        .collect::<Vec<_>>();
    columns.sort_unstable();
    columns.dedup();
    assert_eq!(columns, vec![3, 4]);

    let c2 = prepared
        .iter()
        .filter(|cell| cell.address == "C2")
        .collect::<Vec<_>>();
    assert_eq!(c2.len(), 1);
    assert_eq!(c2[0].value, CellValue::text("New"));
    assert_eq!(
        prepared
            .iter()
            .filter(|cell| cell.address == "D2")
            .count(),
        1
    );

    let d3 = prepared
        .iter()
        .find(|cell| cell.address == "D3")
        .expect("form control cell");
    assert_eq!(d3.value, CellValue::Number(0.0));
}

#[test]
fn grid_from_cells_requires_visible_header() {
    let cells = vec![body("A1", 1, 1, MARKER), body("B1", 1, 2, "1")];
    assert_eq!(grid_from_cells(&cells), Err(SkipReason::NoHeader));

    let hidden = vec![
        header("A1", 1, 1, MARKER).hidden(),
        body("A2", 2, 1, "Cash"),
    ];
    assert_eq!(grid_from_cells(&hidden), Err(SkipReason::NoHeader));
}

#[test]
fn find_datasource_reads_embedded_object() {
    let page = datasource_page("Annual V2 - Consolidated - 1402", "ترازنامه", "Balance Sheet");
    let datasource = find_datasource(&page)
        .expect("parse")
        .expect("datasource present");

    assert_eq!(datasource.sheets.len(), 1);
    assert_eq!(datasource.sheets[0].tables[0].cells.len(), 9);

    let metadata = report_metadata(&datasource);
    assert_eq!(metadata.version, vec!["2".to_string()]);
    assert_eq!(
        metadata.title_info,
        vec!["Annual V2".to_string(), "Consolidated".to_string()]
    );

    assert!(find_datasource("<html><body><p>none</p></body></html>")
        .expect("plain page")
        .is_none());
    assert!(find_datasource("<script>var datasource = {\"sheets\": [</script>").is_err());
}

#[test]
fn structured_page_produces_evaluated_sheet() {
    let page = datasource_page("Annual V2 - Consolidated - 1402", "ترازنامه", "Balance Sheet");
    let extraction = extract_report(
        identity("1"),
        &sources(vec![SourcePage::new("1-0", page)], None),
        &rules(),
    );
    let document = extraction.document;

    assert_eq!(document.sheets.len(), 1);
    let sheet = &document.sheets[0];
    assert_eq!(sheet.sheet_id, Some(1));
    assert_eq!(sheet.title_en.as_deref(), Some("Balance Sheet"));

    let table = &sheet.tables[0];
    assert_eq!(table.columns, labels(&["1402", "1401"]));
    assert_eq!(table.version_no, Some(Value::from("7")));
    assert_eq!(table.title_en.as_deref(), Some("Statement"));
    assert_eq!(
        table.data[1],
        TableRow {
            key: "Total".to_string(),
            value: vec![CellValue::Number(-2400.0), CellValue::Number(800.0)],
        }
    );
    assert_eq!(extraction.stats.structured_sheets, 1);
    assert_eq!(extraction.stats.formula_count, 2);
    assert_eq!(
        document.metadata.map(|metadata| metadata.version),
        Some(vec!["2".to_string()])
    );
}

#[test]
fn empty_datasource_is_skipped_and_later_pages_still_extract() {
    let empty = datasource_html(json!({
        "title_En": "Annual V1",
        "period": 12,
        "sheets": [],
    }));
    let pages = vec![
        SourcePage::new("10-0", empty),
        SourcePage::new("10-1", datasource_page("Annual V1", "سود و زیان", "Income")),
    ];

    let extraction = extract_report(identity("10"), &sources(pages, None), &rules());
    let document = extraction.document;

    assert_eq!(extraction.stats.skipped_units, 1);
    assert_eq!(extraction.stats.failed_units, 0);
    assert!(document.metadata.is_some());
    assert_eq!(document.sheets.len(), 1);
    assert_eq!(document.sheets[0].title_en.as_deref(), Some("Income"));
}

#[test]
fn datasource_table_without_cells_is_passed_over() {
    let page = datasource_html(json!({
        "title_En": "Annual V1",
        "sheets": [{
            "code": 2,
            "title_Fa": "ترازنامه",
            "title_En": "Balance Sheet",
            "tables": [
                {"versionNo": "3", "title_En": "Blank", "cells": []},
                {"versionNo": "4", "title_En": "Statement", "cells": statement_json_cells()},
            ],
        }],
    }));

    let extraction = extract_report(
        identity("11"),
        &sources(vec![SourcePage::new("11-0", page)], None),
        &rules(),
    );

    let sheet = &extraction.document.sheets[0];
    assert_eq!(sheet.tables.len(), 1);
    assert_eq!(sheet.tables[0].title_en.as_deref(), Some("Statement"));
    assert_eq!(sheet.tables[0].version_no, Some(Value::from("4")));
    assert_eq!(extraction.stats.tables, 1);
    assert_eq!(extraction.stats.skipped_units, 0);
}

#[test]
fn unusable_secondary_sections_are_skipped_without_losing_siblings() {
    let secondary = secondary_page(&[
        section(
            "Notes",
            "<table><tr><th>Item</th><th>1402</th></tr><tr><td>Sales</td><td>1</td></tr></table>",
        ),
        section(
            "Quarterly",
            "<table class=\"rayanDynamicStatement\"><tr><td>Sales</td><td>1</td></tr></table>",
        ),
        section("Blank", "<p>no figures</p>"),
        section("Income", &flat_statement_table()),
    ]);

    let extraction = extract_report(
        identity("12"),
        &sources(Vec::new(), Some(secondary)),
        &rules(),
    );
    let document = extraction.document;

    let titles = document
        .sheets
        .iter()
        .map(|sheet| sheet.title_fa.as_deref().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Income"]);
    assert_eq!(extraction.stats.skipped_units, 2);
    assert_eq!(extraction.stats.failed_units, 0);
    assert_eq!(extraction.stats.secondary_sheets, 1);
}

#[test]
fn secondary_sections_never_duplicate_primary_titles() {
    let page = datasource_page("Annual V1", "Balance Sheet", "Balance Sheet");
    let secondary = secondary_page(&[
        section("Balance Sheet", &flat_statement_table()),
        section("Income", &flat_statement_table()),
        section("گزارش تفسیری مدیریت", &flat_statement_table()),
        section("گزارش هیئت مدیره", &flat_statement_table()),
    ]);

    let extraction = extract_report(
        identity("1"),
        &sources(vec![SourcePage::new("1-0", page)], Some(secondary)),
        &rules(),
    );
    let document = extraction.document;

    let titles = document
        .sheets
        .iter()
        .map(|sheet| sheet.title_fa.as_deref().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Balance Sheet", "Income", "گزارش تفسیری مدیریت"]);

    let balance = sheet_titled(&document, "Balance Sheet").expect("balance sheet");
    assert_eq!(balance.sheet_id, Some(1));

    let income = sheet_titled(&document, "Income").expect("income");
    assert_eq!(income.tables[0].data[0].value, vec![CellValue::Number(1500.0)]);

    assert!(document.sheets[2].is_insert_only());
    assert!(document.sheets[2].tables.is_empty());
    assert_eq!(extraction.stats.secondary_sheets, 1);
}

#[test]
fn rendered_page_without_header_is_skipped() {
    let page = rendered_page(5, "Notes", "<table><tr><td>a</td><td>1</td></tr></table>");
    let extraction = extract_report(
        identity("2"),
        &sources(vec![SourcePage::new("2-5", page)], None),
        &rules(),
    );

    assert!(extraction.document.sheets.is_empty());
    assert_eq!(extraction.document.no_file, None);
    assert_eq!(extraction.stats.skipped_units, 1);
    assert_eq!(extraction.stats.failed_units, 0);
}

#[test]
fn rendered_page_is_used_when_no_datasource_exists() {
    let table = format!(
        "<table class=\"Hidden\"><tr><th>ignored</th></tr></table>\
         <table><tr><th>{MARKER}</th><th>1402</th><th>درصد تغییر</th><th>1401</th></tr>\
         <tr><td>Sales</td><td>(300)</td><td>12%</td><td>250</td></tr>\
         <tr class=\"HiddenRow\"><td>Hidden</td><td>1</td><td>1</td><td>1</td></tr></table>"
    );
    let pages = vec![
        SourcePage::new("3-19", rendered_page(19, "Skipped", &flat_statement_table())),
        SourcePage::new("3-7", rendered_page(7, "Income Statement", &table)),
    ];

    let extraction = extract_report(identity("3"), &sources(pages, None), &rules());
    let document = extraction.document;

    assert_eq!(document.sheets.len(), 1);
    let sheet = &document.sheets[0];
    assert_eq!(sheet.sheet_id, Some(7));
    assert_eq!(sheet.title_fa.as_deref(), Some("Income Statement"));
    assert_eq!(sheet.tables[0].columns, labels(&["1402", "1401"]));
    assert_eq!(
        sheet.tables[0].data,
        vec![TableRow {
            key: "Sales".to_string(),
            value: vec![CellValue::Number(-300.0), CellValue::Number(250.0)],
        }]
    );
    assert_eq!(extraction.stats.rendered_sheets, 1);
    assert_eq!(extraction.stats.skipped_units, 1);
}

#[test]
fn rendered_row_wider_than_header_abandons_the_file() {
    let table = format!(
        "<table><tr><th>{MARKER}</th><th>1402</th></tr><tr><td>Sales</td><td>1</td><td>2</td></tr></table>"
    );
    let extraction = extract_report(
        identity("4"),
        &sources(
            vec![SourcePage::new("4-1", rendered_page(8, "Wide", &table))],
            None,
        ),
        &rules(),
    );

    assert!(extraction.document.sheets.is_empty());
    assert_eq!(extraction.stats.failed_units, 1);
}

#[test]
fn child_report_stops_processing() {
    let pages = vec![
        SourcePage::new("5-0", datasource_page("Child Company V1", "ترازنامه", "Balance Sheet")),
        SourcePage::new("5-1", datasource_page("Annual V1", "سود و زیان", "Income")),
    ];
    let secondary = secondary_page(&[section("Income", &flat_statement_table())]);

    let document = extract_report(identity("5"), &sources(pages, Some(secondary)), &rules()).document;

    assert_eq!(document.to_insert, Some(true));
    assert!(document.sheets.is_empty());
    assert!(document.metadata.is_some());
}

#[test]
fn interpretive_sheet_is_recorded_insert_only() {
    let page = datasource_page("Annual V1", "گزارش تفسیری", "Interpretative Report");
    let extraction = extract_report(
        identity("6"),
        &sources(vec![SourcePage::new("6-0", page)], None),
        &rules(),
    );

    let sheet = &extraction.document.sheets[0];
    assert!(sheet.is_insert_only());
    assert!(sheet.tables.is_empty());
    assert_eq!(extraction.stats.formula_count, 0);
}

#[test]
fn stacked_secondary_headers_follow_spans() {
    let table = format!(
        "<table class=\"rayanDynamicStatement\">\
         <tr><th rowspan=\"2\">{MARKER}</th><th colspan=\"2\">1402</th></tr>\
         <tr><th>Q1</th><th>Q2</th></tr>\
         <tr><td>Sales</td><td>(5)</td><td>7</td></tr></table>"
    );
    let secondary = secondary_page(&[section("Quarterly", &table)]);

    let document = extract_report(identity("7"), &sources(Vec::new(), Some(secondary)), &rules()).document;

    assert_eq!(document.no_file, Some(true));
    let sheet = sheet_titled(&document, "Quarterly").expect("quarterly sheet");
    assert_eq!(
        sheet.tables[0].columns,
        vec![
            ColumnLabel::Levels(vec!["1402".to_string(), "Q1".to_string()]),
            ColumnLabel::Levels(vec!["1402".to_string(), "Q2".to_string()]),
        ]
    );
    assert_eq!(
        sheet.tables[0].data[0].value,
        vec![CellValue::Number(-5.0), CellValue::Number(7.0)]
    );
}

#[test]
fn oversized_colspan_is_capped() {
    let table = format!(
        "<table class=\"rayanDynamicStatement\">\
         <tr><th>{MARKER}</th><th colspan=\"400000000\">1402</th></tr>\
         <tr><td>Sales</td><td>5</td></tr></table>"
    );
    let secondary = secondary_page(&[section("Wide", &table)]);

    let document = extract_report(identity("13"), &sources(Vec::new(), Some(secondary)), &rules()).document;

    let sheet = sheet_titled(&document, "Wide").expect("wide sheet");
    let table = &sheet.tables[0];
    assert_eq!(table.columns.len(), 1000);
    assert_eq!(table.columns[999], ColumnLabel::Single("1402".to_string()));
    assert_eq!(table.data[0].value.len(), 1000);
    assert_eq!(table.data[0].value[0], CellValue::Number(5.0));
    assert!(table.data[0].value[1..].iter().all(|value| *value == CellValue::Null));
}

#[test]
fn report_without_sources_is_flagged_no_file() {
    let document = extract_report(identity("8"), &ReportSources::default(), &rules()).document;

    assert_eq!(document.no_file, Some(true));
    assert!(document.sheets.is_empty());
    assert_eq!(document.identity.trace_no().as_deref(), Some("8"));
}

#[test]
fn report_document_serializes_wire_shape() {
    let mut table = Table::new(
        vec![
            ColumnLabel::Single("A".to_string()),
            ColumnLabel::Levels(vec!["1402".to_string(), "Q1".to_string()]),
        ],
        vec![TableRow {
            key: "Cash".to_string(),
            value: vec![
                CellValue::Number(12.0),
                CellValue::Null,
                CellValue::Number(1.5),
                CellValue::text("x"),
            ],
        }],
    );
    table.title_fa = Some("جدول".to_string());

    let mut assembler = ReportAssembler::new(identity("9"));
    assembler.push_sheet(Sheet {
        sheet_id: Some(3),
        title_fa: Some("ترازنامه".to_string()),
        tables: vec![table],
        ..Sheet::default()
    });
    let document = assembler.finish();

    let value = serde_json::to_value(&document).expect("serialize");
    assert_eq!(
        value,
        json!({
            "trace_no": "9",
            "symbol": "FOLD",
            "sheets": [{
                "sheet_id": 3,
                "title_Fa": "ترازنامه",
                "tables": [{
                    "columns": ["A", ["1402", "Q1"]],
                    "data": [{"key": "Cash", "value": [12, null, 1.5, "x"]}],
                    "title_Fa": "جدول",
                }],
            }],
        })
    );
}

#[test]
fn metadata_replaces_identity_fields_with_the_same_name() {
    let mut identity = identity("14");
    identity.0.insert("period".to_string(), Value::from("stale"));
    identity.0.insert("sheets".to_string(), Value::from("stale"));

    let mut assembler = ReportAssembler::new(identity);
    assembler.set_metadata(ReportMetadata {
        period: Some(Value::from(12)),
        ..ReportMetadata::default()
    });
    assembler.mark_insert_only();
    let document = assembler.finish();

    let text = serde_json::to_string(&document).expect("serialize");
    assert_eq!(text.matches("\"period\"").count(), 1);
    assert_eq!(text.matches("\"sheets\"").count(), 1);

    let value: Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(value["period"], Value::from(12));
    assert_eq!(value["sheets"], json!([]));
    assert_eq!(value["symbol"], Value::from("FOLD"));
    assert_eq!(value["to_insert"], Value::Bool(true));
}
