use std::path::Path;

use anyhow::{Context, Result};

use super::*;
use crate::util::read_json;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ExtractionRules {
    pub description_marker: String,
    pub deviation_pattern: String,
    pub skipped_sheet_codes: Vec<i64>,
    pub child_report_markers: Vec<String>,
    pub interpretive_sheet_marker: String,
    pub narrative_title_marker: String,
    pub board_report_marker: String,
    pub stacked_header_class: String,
    #[serde(skip)]
    deviation_regex: Option<Regex>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            description_marker: "شرح".to_string(),
            deviation_pattern: "درصد|تغییر".to_string(),
            skipped_sheet_codes: vec![19, 30],
            child_report_markers: vec!["Other".to_string(), "Child".to_string()],
            interpretive_sheet_marker: "Interpretative".to_string(),
            narrative_title_marker: "تفسیری".to_string(),
            board_report_marker: "مدیره".to_string(),
            stacked_header_class: "rayanDynamicStatement".to_string(),
            deviation_regex: None,
        }
    }
}

impl ExtractionRules {
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let rules = match path {
            Some(path) => read_json::<ExtractionRules>(path)?,
            None => ExtractionRules::default(),
        };
        rules.compiled()
    }

    pub(crate) fn compiled(mut self) -> Result<Self> {
        let regex = Regex::new(&self.deviation_pattern).with_context(|| {
            format!(
                "failed to compile deviation pattern: {}",
                self.deviation_pattern
            )
        })?;
        self.deviation_regex = Some(regex);
        Ok(self)
    }

    pub(super) fn is_deviation(&self, label: &str) -> bool {
        match &self.deviation_regex {
            Some(regex) => regex.is_match(label),
            None => false,
        }
    }

    pub(super) fn is_description(&self, label: &str) -> bool {
        clean_label(label) == self.description_marker
    }

    pub(super) fn is_child_report(&self, title_en: &str) -> bool {
        self.child_report_markers
            .iter()
            .any(|marker| title_en.contains(marker.as_str()))
    }

    pub(super) fn is_interpretive_sheet(&self, title_en: &str) -> bool {
        title_en.contains(&self.interpretive_sheet_marker)
    }

    pub(super) fn is_narrative_title(&self, title: &str) -> bool {
        title.contains(&self.narrative_title_marker)
    }

    pub(super) fn is_board_report(&self, title: &str) -> bool {
        title.contains(&self.board_report_marker)
    }

    pub(super) fn skips_sheet_code(&self, code: i64) -> bool {
        self.skipped_sheet_codes.contains(&code)
    }
}
