use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::*;

static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid table selector"));
static TR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid tr selector"));
static TH_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").expect("valid th selector"));
static TD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid td selector"));
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid cell selector"));
static OPTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option[selected]").expect("valid option selector"));
static H3_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3").expect("valid h3 selector"));

const HIDDEN: &[&str] = &["Hidden"];
const HIDDEN_ROW: &[&str] = &["Hidden", "HiddenRow"];

// Same ceilings browsers apply to table cell spans.
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

/// Header matrix (one entry per header row) plus raw body text.
#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct RenderedTable {
    pub(super) header: Vec<Vec<Option<String>>>,
    pub(super) rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub(super) struct RenderedPage {
    pub(super) sheet_code: i64,
    pub(super) title: String,
    pub(super) table_count: usize,
    pub(super) table: Result<RenderedTable, SkipReason>,
}

#[derive(Debug)]
pub(super) enum SectionContent {
    Table(RenderedTable),
    Skip(SkipReason),
    Empty,
}

#[derive(Debug)]
pub(super) struct SecondarySection {
    pub(super) title: String,
    pub(super) content: Result<SectionContent, ProcessError>,
}

fn has_class(element: &ElementRef, classes: &[&str]) -> bool {
    element
        .value()
        .classes()
        .any(|class| classes.contains(&class))
}

fn visible<'a>(
    scope: ElementRef<'a>,
    selector: &'a Selector,
    hidden: &'a [&'a str],
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    scope
        .select(selector)
        .filter(move |element| !has_class(element, hidden))
}

fn header_text(element: &ElementRef) -> String {
    let joined = element
        .text()
        .filter(|text| text.chars().any(|ch| !ch.is_whitespace()))
        .collect::<Vec<_>>()
        .join(" ");
    clean_label(&joined)
}

fn cell_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn span(element: &ElementRef, attribute: &str, max: usize) -> usize {
    element
        .value()
        .attr(attribute)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .map_or(1, |value| value.min(max))
}

fn visible_tables<'a>(scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    visible(scope, &TABLE_SELECTOR, HIDDEN).collect()
}

/// One flat header row from the first table carrying header cells; body rows
/// from the first table carrying data cells.
pub(super) fn flat_table(tables: &[ElementRef]) -> Result<RenderedTable, SkipReason> {
    let header_table = tables
        .iter()
        .find(|table| visible(**table, &TH_SELECTOR, HIDDEN).next().is_some())
        .ok_or(SkipReason::NoHeader)?;

    let header = visible(*header_table, &TH_SELECTOR, HIDDEN)
        .map(|th| Some(header_text(&th)))
        .collect::<Vec<_>>();

    let rows = tables
        .iter()
        .find(|table| visible(**table, &TD_SELECTOR, HIDDEN).next().is_some())
        .map(|table| {
            visible(*table, &TR_SELECTOR, HIDDEN_ROW)
                .map(|tr| {
                    visible(tr, &TD_SELECTOR, HIDDEN)
                        .map(|td| cell_text(&td))
                        .collect::<Vec<_>>()
                })
                .filter(|cells| !cells.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(RenderedTable {
        header: vec![header],
        rows,
    })
}

/// Multi-row header honoring `colspan`/`rowspan`: each label sits at its
/// anchor slot and the spanned slots are left for the forward fill.
pub(super) fn stacked_table(table: ElementRef) -> Result<RenderedTable, SkipReason> {
    let mut header_rows = Vec::new();
    let mut rows = Vec::new();

    for tr in visible(table, &TR_SELECTOR, HIDDEN_ROW) {
        let has_data = visible(tr, &TD_SELECTOR, HIDDEN).next().is_some();
        if has_data {
            rows.push(
                visible(tr, &CELL_SELECTOR, HIDDEN)
                    .map(|cell| cell_text(&cell))
                    .collect::<Vec<_>>(),
            );
            continue;
        }

        let cells = visible(tr, &TH_SELECTOR, HIDDEN)
            .map(|th| {
                (
                    header_text(&th),
                    span(&th, "colspan", MAX_COLSPAN),
                    span(&th, "rowspan", MAX_ROWSPAN),
                )
            })
            .collect::<Vec<_>>();
        if !cells.is_empty() {
            header_rows.push(cells);
        }
    }

    if header_rows.is_empty() {
        return Err(SkipReason::NoHeader);
    }

    Ok(RenderedTable {
        header: place_header_rows(&header_rows),
        rows,
    })
}

fn place_header_rows(rows: &[Vec<(String, usize, usize)>]) -> Vec<Vec<Option<String>>> {
    let mut matrix = vec![Vec::<Option<String>>::new(); rows.len()];
    let mut occupied = HashSet::<(usize, usize)>::new();

    for (row_index, cells) in rows.iter().enumerate() {
        let mut column = 0usize;
        for (text, colspan, rowspan) in cells {
            while occupied.contains(&(row_index, column)) {
                column += 1;
            }

            let row = &mut matrix[row_index];
            if row.len() <= column {
                row.resize(column + 1, None);
            }
            if !text.is_empty() {
                row[column] = Some(text.clone());
            }

            for covered_row in row_index..(row_index + rowspan).min(rows.len()) {
                for covered_column in column..column + colspan {
                    occupied.insert((covered_row, covered_column));
                }
            }
            column += colspan;
        }
    }

    let width = occupied.iter().map(|(_, column)| column + 1).max().unwrap_or(0);
    for row in &mut matrix {
        row.resize(width, None);
    }
    matrix
}

pub(super) fn read_rendered_page(html: &str) -> Result<RenderedPage, ProcessError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let option = root
        .select(&OPTION_SELECTOR)
        .find(|option| option.value().attr("selected") == Some("selected"))
        .or_else(|| root.select(&OPTION_SELECTOR).next())
        .ok_or_else(|| ProcessError::UnknownFormat("no selected sheet option".to_string()))?;

    let code_text = option.value().attr("value").unwrap_or_default();
    let sheet_code = code_text.trim().parse::<i64>().map_err(|_| {
        ProcessError::UnknownFormat(format!("non-numeric sheet option value {code_text:?}"))
    })?;
    let title = option
        .text()
        .collect::<String>()
        .replace(['\n', '\t'], "")
        .trim()
        .to_string();

    let tables = visible_tables(root);
    let table = flat_table(&tables);

    Ok(RenderedPage {
        sheet_code,
        title,
        table_count: tables.len(),
        table,
    })
}

pub(super) fn read_secondary_sections(html: &str, rules: &ExtractionRules) -> Vec<SecondarySection> {
    let document = Html::parse_document(html);

    document
        .select(&H3_SELECTOR)
        .map(|heading| {
            let title = heading
                .text()
                .next()
                .unwrap_or_default()
                .replace('\n', "")
                .trim()
                .to_string();
            SecondarySection {
                title,
                content: section_content(heading, rules),
            }
        })
        .collect()
}

fn section_content(
    heading: ElementRef,
    rules: &ExtractionRules,
) -> Result<SectionContent, ProcessError> {
    let container = heading
        .parent()
        .and_then(|parent| parent.parent())
        .and_then(ElementRef::wrap)
        .ok_or_else(|| ProcessError::UnknownFormat("section heading without container".to_string()))?;

    let tables = visible_tables(container);
    let Some(first) = tables.first() else {
        return Ok(SectionContent::Empty);
    };

    let stacked = container
        .select(&TABLE_SELECTOR)
        .any(|table| has_class(&table, &[rules.stacked_header_class.as_str()]));

    let table = if stacked {
        if !tables
            .iter()
            .any(|table| visible(*table, &TH_SELECTOR, HIDDEN).next().is_some())
        {
            return Ok(SectionContent::Skip(SkipReason::NoHeader));
        }
        stacked_table(*first)
    } else {
        flat_table(&tables)
    };

    Ok(match table {
        Ok(table) => SectionContent::Table(table),
        Err(reason) => SectionContent::Skip(reason),
    })
}

/// Labels, normalizes and strips deviation columns from a rendered table.
pub(super) fn grid_from_rendered(
    table: &RenderedTable,
    rules: &ExtractionRules,
) -> Result<LabeledGrid, ProcessError> {
    let labels = fill_header_labels(table.header.clone());
    let width = labels.len();

    let mut rows = Vec::with_capacity(table.rows.len());
    for cells in &table.rows {
        if cells.len() > width {
            return Err(ProcessError::UnknownFormat(format!(
                "row has {} cells but header has {width}",
                cells.len()
            )));
        }
        let mut row = cells
            .iter()
            .map(|text| normalize_scalar(text))
            .collect::<Vec<_>>();
        row.resize(width, CellValue::Null);
        rows.push(row);
    }

    let deviation = deviation_columns(&labels, rules);
    Ok(LabeledGrid { labels, rows }.without_columns(&deviation))
}

pub(super) fn segment_rendered(
    table: &RenderedTable,
    rules: &ExtractionRules,
) -> Result<Segmented, ProcessError> {
    let grid = grid_from_rendered(table, rules)?;
    Ok(segment_grid(&grid, rules))
}
