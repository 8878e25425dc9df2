use super::*;

/// Accumulates sheets for one report in emission order.
#[derive(Debug)]
pub(super) struct ReportAssembler {
    identity: ReportIdentity,
    metadata: Option<ReportMetadata>,
    sheets: Vec<Sheet>,
    insert_only: bool,
    no_file: bool,
}

impl ReportAssembler {
    pub(super) fn new(identity: ReportIdentity) -> Self {
        Self {
            identity,
            metadata: None,
            sheets: Vec::new(),
            insert_only: false,
            no_file: false,
        }
    }

    /// Later datasources overwrite earlier ones.
    pub(super) fn set_metadata(&mut self, metadata: ReportMetadata) {
        self.metadata = Some(metadata);
    }

    pub(super) fn push_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    pub(super) fn has_title(&self, title: &str) -> bool {
        self.sheets
            .iter()
            .any(|sheet| sheet.title_fa.as_deref() == Some(title))
    }

    pub(super) fn mark_insert_only(&mut self) {
        self.insert_only = true;
    }

    pub(super) fn mark_no_file(&mut self) {
        self.no_file = true;
    }

    pub(super) fn finish(self) -> ReportDocument {
        ReportDocument {
            identity: self.identity,
            metadata: self.metadata,
            sheets: self.sheets,
            to_insert: self.insert_only.then_some(true),
            no_file: self.no_file.then_some(true),
        }
    }
}
