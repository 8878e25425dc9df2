//! Dependency-ordered formula evaluation over one datasource grid.
//!
//! Formula cells form a graph keyed by grid coordinate. A depth-first walk
//! yields a single evaluation order; cells caught in a cycle resolve to
//! `CircularReference` up front and everything downstream of them inherits
//! the error. Each formula fails on its own: only numeric results are written
//! back, every error leaves the cell's original value in place.

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum EvalValue {
    Number(f64),
    Text(String),
    Blank,
}

impl EvalValue {
    fn from_cell(value: &CellValue) -> Self {
        match value {
            CellValue::Number(number) => Self::Number(*number),
            CellValue::Text(text) if text.trim().is_empty() => Self::Blank,
            CellValue::Text(text) => Self::Text(text.clone()),
            CellValue::Null => Self::Blank,
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct EvaluationSummary {
    pub(super) formula_count: usize,
    pub(super) applied_count: usize,
    pub(super) division_by_zero_count: usize,
    pub(super) failures: Vec<(String, FormulaError)>,
}

#[derive(Debug)]
struct CompiledFormula {
    cell: usize,
    expr: Result<Expr, FormulaError>,
    deps: Vec<usize>,
}

#[derive(Debug)]
pub(super) struct FormulaModel {
    index: HashMap<CellRef, usize>,
    formulas: Vec<CompiledFormula>,
    by_cell: HashMap<usize, usize>,
}

#[derive(Debug, Default)]
pub(super) struct EvaluationPlan {
    pub(super) order: Vec<usize>,
    pub(super) cyclic: HashSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl FormulaModel {
    pub(super) fn compile(cells: &[Cell]) -> Self {
        let mut index = HashMap::new();
        for (position, cell) in cells.iter().enumerate() {
            if let Some(cell_ref) = CellRef::parse(&cell.address) {
                index.insert(cell_ref, position);
            }
        }

        let mut formulas = Vec::new();
        let mut by_cell = HashMap::new();
        for (position, cell) in cells.iter().enumerate() {
            let Some(formula) = cell.formula.as_deref() else {
                continue;
            };
            by_cell.insert(position, formulas.len());
            formulas.push(CompiledFormula {
                cell: position,
                expr: parse_formula(formula),
                deps: Vec::new(),
            });
        }

        let mut model = Self {
            index,
            formulas,
            by_cell,
        };

        for slot in 0..model.formulas.len() {
            let mut refs = Vec::new();
            if let Ok(expr) = &model.formulas[slot].expr {
                expr.collect_refs(&mut refs);
            }

            let mut deps = refs
                .iter()
                .flat_map(|reference| model.referenced_cells(reference))
                .filter_map(|cell| model.by_cell.get(&cell).copied())
                .collect::<Vec<_>>();
            deps.sort_unstable();
            deps.dedup();
            model.formulas[slot].deps = deps;
        }

        model
    }

    pub(super) fn formula_count(&self) -> usize {
        self.formulas.len()
    }

    fn referenced_cells(&self, reference: &Expr) -> Vec<usize> {
        match reference {
            Expr::Ref(cell_ref) => self.index.get(cell_ref).copied().into_iter().collect(),
            Expr::Range(start, end) => self.range_members(*start, *end),
            _ => Vec::new(),
        }
    }

    fn range_members(&self, start: CellRef, end: CellRef) -> Vec<usize> {
        let (top, bottom) = (start.row.min(end.row), start.row.max(end.row));
        let (left, right) = (start.col.min(end.col), start.col.max(end.col));

        let mut members = self
            .index
            .iter()
            .filter(|(cell_ref, _)| {
                (top..=bottom).contains(&cell_ref.row) && (left..=right).contains(&cell_ref.col)
            })
            .map(|(cell_ref, position)| (*cell_ref, *position))
            .collect::<Vec<_>>();
        members.sort();
        members.into_iter().map(|(_, position)| position).collect()
    }

    pub(super) fn plan(&self) -> EvaluationPlan {
        let mut plan = EvaluationPlan::default();
        let mut marks = vec![Mark::Unvisited; self.formulas.len()];
        let mut stack = Vec::new();

        for slot in 0..self.formulas.len() {
            self.visit(slot, &mut marks, &mut stack, &mut plan);
        }

        plan
    }

    fn visit(
        &self,
        slot: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        plan: &mut EvaluationPlan,
    ) {
        match marks[slot] {
            Mark::Done => return,
            Mark::Visiting => {
                if let Some(start) = stack.iter().position(|entry| *entry == slot) {
                    plan.cyclic.extend(stack[start..].iter().copied());
                }
                return;
            }
            Mark::Unvisited => {}
        }

        marks[slot] = Mark::Visiting;
        stack.push(slot);
        for dep in &self.formulas[slot].deps {
            self.visit(*dep, marks, stack, plan);
        }
        stack.pop();
        marks[slot] = Mark::Done;
        plan.order.push(slot);
    }

    /// Results keyed by cell position, in evaluation order.
    pub(super) fn evaluate(
        &self,
        cells: &[Cell],
    ) -> Vec<(usize, Result<EvalValue, FormulaError>)> {
        let plan = self.plan();
        let mut results = HashMap::<usize, Result<EvalValue, FormulaError>>::new();

        for slot in &plan.cyclic {
            let address = cells[self.formulas[*slot].cell].address.clone();
            results.insert(*slot, Err(FormulaError::CircularReference(address)));
        }

        for slot in &plan.order {
            if plan.cyclic.contains(slot) {
                continue;
            }

            let result = match &self.formulas[*slot].expr {
                Ok(expr) => {
                    let context = EvalContext {
                        model: self,
                        cells,
                        results: &results,
                    };
                    context.eval(expr)
                }
                Err(err) => Err(err.clone()),
            };
            results.insert(*slot, result);
        }

        plan.order
            .iter()
            .filter_map(|slot| {
                results
                    .remove(slot)
                    .map(|result| (self.formulas[*slot].cell, result))
            })
            .collect()
    }
}

struct EvalContext<'a> {
    model: &'a FormulaModel,
    cells: &'a [Cell],
    results: &'a HashMap<usize, Result<EvalValue, FormulaError>>,
}

impl EvalContext<'_> {
    fn cell_value(&self, position: usize) -> Result<EvalValue, FormulaError> {
        match self.model.by_cell.get(&position) {
            Some(slot) => self.results.get(slot).cloned().unwrap_or_else(|| {
                Err(FormulaError::UnresolvedReference(
                    self.cells[position].address.clone(),
                ))
            }),
            None => Ok(EvalValue::from_cell(&self.cells[position].value)),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<EvalValue, FormulaError> {
        match expr {
            Expr::Number(number) => Ok(EvalValue::Number(*number)),
            Expr::Text(text) => Ok(EvalValue::Text(text.clone())),
            Expr::Ref(cell_ref) => match self.model.index.get(cell_ref) {
                Some(position) => self.cell_value(*position),
                None => Err(FormulaError::UnresolvedReference(cell_ref.to_string())),
            },
            Expr::Range(start, end) => Err(FormulaError::TypeMismatch(format!(
                "range {start}:{end} used as a single value"
            ))),
            Expr::Negate(operand) => Ok(EvalValue::Number(-self.number(operand)?)),
            Expr::Binary { op, left, right } => {
                let left = self.number(left)?;
                let right = self.number(right)?;
                apply_binary(*op, left, right).map(EvalValue::Number)
            }
            Expr::Call { name, args } => self
                .call(name, args)
                .and_then(finite)
                .map(EvalValue::Number),
        }
    }

    fn number(&self, expr: &Expr) -> Result<f64, FormulaError> {
        match self.eval(expr)? {
            EvalValue::Number(number) => Ok(number),
            EvalValue::Blank => Ok(0.0),
            EvalValue::Text(text) => match parse_numeric(&text) {
                CellValue::Number(number) => Ok(number),
                _ => Err(FormulaError::TypeMismatch(format!(
                    "text {text:?} in arithmetic"
                ))),
            },
        }
    }

    /// Range members and direct references contribute numbers only; other
    /// arguments are coerced.
    fn numbers(&self, args: &[Expr]) -> Result<Vec<f64>, FormulaError> {
        let mut numbers = Vec::new();
        for arg in args {
            let positions = match arg {
                Expr::Range(start, end) => self.model.range_members(*start, *end),
                Expr::Ref(cell_ref) => match self.model.index.get(cell_ref) {
                    Some(position) => vec![*position],
                    None => return Err(FormulaError::UnresolvedReference(cell_ref.to_string())),
                },
                other => {
                    numbers.push(self.number(other)?);
                    continue;
                }
            };

            for position in positions {
                if let EvalValue::Number(number) = self.cell_value(position)? {
                    numbers.push(number);
                }
            }
        }
        Ok(numbers)
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<f64, FormulaError> {
        match name {
            "SUM" => Ok(self.numbers(args)?.iter().sum()),
            "MIN" => Ok(self
                .numbers(args)?
                .into_iter()
                .reduce(f64::min)
                .unwrap_or(0.0)),
            "MAX" => Ok(self
                .numbers(args)?
                .into_iter()
                .reduce(f64::max)
                .unwrap_or(0.0)),
            "AVERAGE" => {
                let numbers = self.numbers(args)?;
                if numbers.is_empty() {
                    return Err(FormulaError::DivisionByZero);
                }
                Ok(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
            "ABS" => {
                let [value] = args else {
                    return Err(arity(name, "1"));
                };
                Ok(self.number(value)?.abs())
            }
            "ROUND" => {
                let (value, digits) = match args {
                    [value] => (self.number(value)?, 0.0),
                    [value, digits] => (self.number(value)?, self.number(digits)?.trunc()),
                    _ => return Err(arity(name, "1 or 2")),
                };
                let scale = 10f64.powf(digits);
                Ok((value * scale).round() / scale)
            }
            other => Err(FormulaError::UnsupportedFunction(other.to_string())),
        }
    }
}

fn arity(name: &str, expected: &str) -> FormulaError {
    FormulaError::TypeMismatch(format!("{name} expects {expected} argument(s)"))
}

fn apply_binary(op: BinaryOp, left: f64, right: f64) -> Result<f64, FormulaError> {
    let value = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Subtract => left - right,
        BinaryOp::Multiply => left * right,
        BinaryOp::Divide => {
            if right == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            left / right
        }
        BinaryOp::Power => left.powf(right),
    };
    finite(value)
}

fn finite(value: f64) -> Result<f64, FormulaError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::TypeMismatch("non-finite result".to_string()))
    }
}

/// Evaluates every formula cell and writes numeric results back.
pub(super) fn evaluate_cells(cells: &mut [Cell]) -> EvaluationSummary {
    let model = FormulaModel::compile(cells);
    let mut summary = EvaluationSummary {
        formula_count: model.formula_count(),
        ..EvaluationSummary::default()
    };

    for (position, result) in model.evaluate(cells) {
        match result {
            Ok(EvalValue::Number(number)) => {
                cells[position].value = CellValue::Number(number);
                summary.applied_count += 1;
            }
            Ok(_) => {}
            Err(FormulaError::DivisionByZero) => summary.division_by_zero_count += 1,
            Err(err) => {
                debug!(address = %cells[position].address, error = %err, "formula left unevaluated");
                summary.failures.push((cells[position].address.clone(), err));
            }
        }
    }

    summary
}
