use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::*;

static DATASOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var\s+datasource\s*=\s*").expect("valid datasource regex"));
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"V(\d)").expect("valid version regex"));
static TITLE_INFO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\b[^-]+\b)\s*-").expect("valid title info regex"));
static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid script selector"));

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct Datasource {
    #[serde(rename = "title_Fa", default)]
    pub(super) title_fa: Option<Value>,
    #[serde(rename = "title_En", default)]
    pub(super) title_en: Option<Value>,
    #[serde(default)]
    pub(super) period: Option<Value>,
    #[serde(rename = "yearEndToDate", default)]
    pub(super) year_end_to_date: Option<Value>,
    #[serde(default)]
    pub(super) kind: Option<Value>,
    #[serde(rename = "type", default)]
    pub(super) report_type: Option<Value>,
    #[serde(rename = "isAudited", default)]
    pub(super) is_audited: Option<Value>,
    #[serde(default)]
    pub(super) state: Option<Value>,
    #[serde(default)]
    pub(super) sheets: Vec<DatasourceSheet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct DatasourceSheet {
    #[serde(default)]
    pub(super) code: Option<Value>,
    #[serde(rename = "title_Fa", default)]
    pub(super) title_fa: Option<String>,
    #[serde(rename = "title_En", default)]
    pub(super) title_en: Option<String>,
    #[serde(default)]
    pub(super) tables: Vec<DatasourceTable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct DatasourceTable {
    #[serde(rename = "versionNo", default)]
    pub(super) version_no: Option<Value>,
    #[serde(rename = "title_Fa", default)]
    pub(super) title_fa: Option<String>,
    #[serde(rename = "title_En", default)]
    pub(super) title_en: Option<String>,
    #[serde(default)]
    pub(super) cells: Vec<DatasourceCell>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatasourceCell {
    #[serde(default)]
    pub(super) cell_group_name: Option<String>,
    pub(super) column_sequence: i64,
    pub(super) row_sequence: i64,
    #[serde(default)]
    pub(super) value: Option<Value>,
    #[serde(default)]
    pub(super) address: String,
    #[serde(default)]
    pub(super) formula: Option<String>,
    #[serde(default = "default_visible")]
    pub(super) is_visible: bool,
    #[serde(default)]
    pub(super) value_type_name: Option<String>,
}

fn default_visible() -> bool {
    true
}

pub(super) fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

pub(super) fn sheet_code(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// The `var datasource = {...};` object embedded in a page script, if any.
pub(super) fn find_datasource(html: &str) -> Result<Option<Datasource>, ProcessError> {
    let document = Html::parse_document(html);

    for script in document.select(&SCRIPT_SELECTOR) {
        let text = script.text().collect::<String>();
        if !text.contains("datasource") {
            continue;
        }
        let Some(found) = DATASOURCE_RE.find(&text) else {
            continue;
        };

        let rest = &text[found.end()..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Datasource>();
        return match stream.next() {
            Some(parsed) => Ok(Some(parsed?)),
            None => Err(ProcessError::UnknownFormat(
                "datasource assignment without a value".to_string(),
            )),
        };
    }

    Ok(None)
}

pub(super) fn report_metadata(datasource: &Datasource) -> ReportMetadata {
    let title_en = value_text(datasource.title_en.as_ref());

    ReportMetadata {
        title_fa: datasource.title_fa.clone(),
        title_en: datasource.title_en.clone(),
        period: datasource.period.clone(),
        year_end_to_date: datasource.year_end_to_date.clone(),
        kind: datasource.kind.clone(),
        report_type: datasource.report_type.clone(),
        is_audited: datasource.is_audited.clone(),
        state: datasource.state.clone(),
        version: VERSION_RE
            .captures_iter(&title_en)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        title_info: TITLE_INFO_RE
            .captures_iter(&title_en)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect(),
    }
}

pub(super) fn cells_from_table(table: &DatasourceTable) -> Vec<Cell> {
    table
        .cells
        .iter()
        .map(|source| {
            let group = CellGroup::from_name(source.cell_group_name.as_deref().unwrap_or_default());
            let raw = value_text(source.value.as_ref());
            let mut cell = Cell::new(
                &source.address,
                source.row_sequence,
                source.column_sequence,
                group,
                &raw,
            )
            .with_formula(source.formula.as_deref().unwrap_or_default())
            .with_value_type(source.value_type_name.as_deref().unwrap_or_default());
            if !source.is_visible {
                cell = cell.hidden();
            }
            cell
        })
        .collect()
}
