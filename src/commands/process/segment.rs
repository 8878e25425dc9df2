use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SkipReason {
    NoHeader,
    NoSharh,
}

impl SkipReason {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::NoHeader => "no_header",
            Self::NoSharh => "no_description_column",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Segmented {
    Tables(Vec<Table>),
    Skip(SkipReason),
}

/// Immutable snapshot: one label per column, every row as wide as `labels`.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct LabeledGrid {
    pub(super) labels: Vec<ColumnLabel>,
    pub(super) rows: Vec<Vec<CellValue>>,
}

impl LabeledGrid {
    pub(super) fn width(&self) -> usize {
        self.labels.len()
    }

    pub(super) fn without_columns(self, drop: &HashSet<usize>) -> Self {
        let keep = |index: &usize| !drop.contains(index);
        let labels = self
            .labels
            .into_iter()
            .enumerate()
            .filter(|(index, _)| keep(index))
            .map(|(_, label)| label)
            .collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .filter(|(index, _)| keep(index))
                    .map(|(_, value)| value)
                    .collect()
            })
            .collect();
        Self { labels, rows }
    }
}

/// Forward-fills a header matrix down each column, then across each row.
/// A slot filled vertically is never overwritten by the horizontal pass.
pub(super) fn fill_header_labels(mut matrix: Vec<Vec<Option<String>>>) -> Vec<ColumnLabel> {
    let width = matrix.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut matrix {
        row.resize(width, None);
    }

    for row_index in 1..matrix.len() {
        for column in 0..width {
            if matrix[row_index][column].is_none() {
                matrix[row_index][column] = matrix[row_index - 1][column].clone();
            }
        }
    }

    for row in &mut matrix {
        for column in 1..width {
            if row[column].is_none() {
                row[column] = row[column - 1].clone();
            }
        }
    }

    (0..width)
        .map(|column| {
            ColumnLabel::from_levels(
                matrix
                    .iter()
                    .map(|row| row[column].clone().unwrap_or_default())
                    .collect(),
            )
        })
        .collect()
}

pub(super) fn marker_columns(labels: &[ColumnLabel], rules: &ExtractionRules) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, label)| label.levels().iter().any(|level| rules.is_description(level)))
        .map(|(index, _)| index)
        .collect()
}

pub(super) fn deviation_columns(labels: &[ColumnLabel], rules: &ExtractionRules) -> HashSet<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, label)| label.levels().iter().any(|level| rules.is_deviation(level)))
        .map(|(index, _)| index)
        .collect()
}

/// Splits the grid at every description marker, rightmost first. Each table
/// spans from its marker to the start of the previously extracted one.
pub(super) fn segment_grid(grid: &LabeledGrid, rules: &ExtractionRules) -> Segmented {
    let mut markers = marker_columns(&grid.labels, rules);
    if markers.is_empty() {
        return Segmented::Skip(SkipReason::NoSharh);
    }
    markers.sort_unstable_by(|a, b| b.cmp(a));

    let mut tables = Vec::new();
    let mut end = grid.width();
    for marker in markers {
        if marker >= end {
            continue;
        }
        if let Some(table) = slice_table(grid, marker, end) {
            tables.push(table);
        }
        end = marker;
    }

    Segmented::Tables(tables)
}

fn slice_table(grid: &LabeledGrid, marker: usize, end: usize) -> Option<Table> {
    let columns = grid.labels[marker + 1..end].to_vec();

    let data = grid
        .rows
        .iter()
        .filter_map(|row| {
            let values = row[marker + 1..end]
                .iter()
                .cloned()
                .map(CellValue::into_output)
                .collect::<Vec<_>>();
            if values.iter().all(|value| *value == CellValue::Null) {
                return None;
            }
            Some(TableRow {
                key: row[marker].label(),
                value: values,
            })
        })
        .collect::<Vec<_>>();

    if data.is_empty() {
        return None;
    }

    Some(Table::new(columns, data))
}

/// Pivots visible, evaluated cells into a labeled grid. Rows after the last
/// header row become data rows; absent positions are `Null`.
pub(super) fn grid_from_cells(cells: &[Cell]) -> Result<LabeledGrid, SkipReason> {
    let visible = cells.iter().filter(|cell| cell.visible).collect::<Vec<_>>();

    let mut header_rows = visible
        .iter()
        .filter(|cell| cell.group == CellGroup::Header)
        .map(|cell| cell.row_sequence)
        .collect::<Vec<_>>();
    header_rows.sort_unstable();
    header_rows.dedup();
    let Some(last_header_row) = header_rows.last().copied() else {
        return Err(SkipReason::NoHeader);
    };

    let mut columns = visible
        .iter()
        .map(|cell| cell.column_sequence)
        .collect::<Vec<_>>();
    columns.sort_unstable();
    columns.dedup();
    let column_position = columns
        .iter()
        .enumerate()
        .map(|(position, column)| (*column, position))
        .collect::<HashMap<_, _>>();

    let mut by_position = HashMap::<(i64, usize), &Cell>::new();
    for cell in &visible {
        if let Some(position) = column_position.get(&cell.column_sequence) {
            by_position.insert((cell.row_sequence, *position), cell);
        }
    }

    let header_matrix = header_rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|position| {
                    by_position
                        .get(&(*row, position))
                        .map(|cell| clean_label(&cell.value.label()))
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut data_rows = visible
        .iter()
        .map(|cell| cell.row_sequence)
        .filter(|row| *row > last_header_row)
        .collect::<Vec<_>>();
    data_rows.sort_unstable();
    data_rows.dedup();

    let rows = data_rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|position| {
                    by_position
                        .get(&(*row, position))
                        .map(|cell| cell.value.clone())
                        .unwrap_or(CellValue::Null)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    Ok(LabeledGrid {
        labels: fill_header_labels(header_matrix),
        rows,
    })
}
