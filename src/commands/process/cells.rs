use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum CellGroup {
    Header,
    Body,
    FormControl,
    Other,
}

impl CellGroup {
    pub(super) fn from_name(name: &str) -> Self {
        match name.trim() {
            "Header" => Self::Header,
            "Body" => Self::Body,
            "FormControl" => Self::FormControl,
            _ => Self::Other,
        }
    }
}

type CellKey = (CellGroup, i64, i64, String, String, Option<String>, bool, String);

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Cell {
    pub(super) address: String,
    pub(super) row_sequence: i64,
    pub(super) column_sequence: i64,
    pub(super) group: CellGroup,
    pub(super) raw_value: String,
    pub(super) value: CellValue,
    pub(super) formula: Option<String>,
    pub(super) visible: bool,
    pub(super) value_type: String,
}

impl Cell {
    pub(super) fn new(
        address: &str,
        row_sequence: i64,
        column_sequence: i64,
        group: CellGroup,
        raw_value: &str,
    ) -> Self {
        Self {
            address: address.trim().to_string(),
            row_sequence,
            column_sequence,
            group,
            raw_value: raw_value.to_string(),
            value: normalize_scalar(raw_value),
            formula: None,
            visible: true,
            value_type: String::new(),
        }
    }

    pub(super) fn with_formula(mut self, formula: &str) -> Self {
        self.formula = normalize_formula_text(formula);
        self
    }

    pub(super) fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub(super) fn with_value_type(mut self, value_type: &str) -> Self {
        self.value_type = value_type.trim().to_string();
        self
    }

    fn key(&self) -> CellKey {
        (
            self.group,
            self.row_sequence,
            self.column_sequence,
            self.raw_value.clone(),
            self.address.clone(),
            self.formula.clone(),
            self.visible,
            self.value_type.clone(),
        )
    }
}

/// Single leading `=`, or `None` when there is no formula body.
pub(super) fn normalize_formula_text(formula: &str) -> Option<String> {
    let body = formula.trim().trim_start_matches('=').trim();
    if body.is_empty() {
        None
    } else {
        Some(format!("={body}"))
    }
}

/// Resolves duplicates and policy-excluded columns before evaluation.
pub(super) fn prepare_cells(cells: Vec<Cell>, rules: &ExtractionRules) -> Vec<Cell> {
    let cells = drop_exact_duplicates(cells);
    let cells = drop_duplicate_columns(cells);
    let cells = keep_last_per_position(cells);
    let cells = drop_deviation_columns(cells, rules);

    cells
        .into_iter()
        .map(|mut cell| {
            if cell.value_type == "FormControl" && cell.raw_value.trim().is_empty() {
                cell.value = CellValue::Number(0.0);
            }
            cell
        })
        .collect()
}

fn drop_exact_duplicates(cells: Vec<Cell>) -> Vec<Cell> {
    let mut seen = HashSet::new();
    cells
        .into_iter()
        .filter(|cell| seen.insert(cell.key()))
        .collect()
}

fn column_order(cells: &[Cell]) -> Vec<i64> {
    let mut columns = cells
        .iter()
        .map(|cell| cell.column_sequence)
        .collect::<Vec<_>>();
    columns.sort_unstable();
    columns.dedup();
    columns
}

/// A column whose full `(value, row)` content repeats an earlier column is dropped.
fn drop_duplicate_columns(cells: Vec<Cell>) -> Vec<Cell> {
    let mut signatures = HashMap::<i64, Vec<(String, i64)>>::new();
    for cell in &cells {
        signatures
            .entry(cell.column_sequence)
            .or_default()
            .push((cell.raw_value.clone(), cell.row_sequence));
    }

    let mut seen = HashSet::new();
    let mut kept = HashSet::new();
    for column in column_order(&cells) {
        if let Some(signature) = signatures.remove(&column)
            && seen.insert(signature)
        {
            kept.insert(column);
        }
    }

    cells
        .into_iter()
        .filter(|cell| kept.contains(&cell.column_sequence))
        .collect()
}

fn keep_last_per_position(cells: Vec<Cell>) -> Vec<Cell> {
    let mut last = HashMap::<(i64, i64), usize>::new();
    for (index, cell) in cells.iter().enumerate() {
        last.insert((cell.column_sequence, cell.row_sequence), index);
    }

    cells
        .into_iter()
        .enumerate()
        .filter(|(index, cell)| {
            last.get(&(cell.column_sequence, cell.row_sequence)) == Some(index)
        })
        .map(|(_, cell)| cell)
        .collect()
}

fn drop_deviation_columns(cells: Vec<Cell>, rules: &ExtractionRules) -> Vec<Cell> {
    let deviation = cells
        .iter()
        .filter(|cell| cell.group == CellGroup::Header && rules.is_deviation(&cell.raw_value))
        .map(|cell| cell.column_sequence)
        .collect::<HashSet<_>>();

    if !deviation.is_empty() {
        debug!(columns = deviation.len(), "dropping deviation columns");
    }

    cells
        .into_iter()
        .filter(|cell| !deviation.contains(&cell.column_sequence))
        .collect()
}
