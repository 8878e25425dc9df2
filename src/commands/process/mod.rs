use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{
    CellValue, ColumnLabel, ReportDocument, ReportIdentity, ReportMetadata, Sheet, Table, TableRow,
};

mod assemble;
mod cells;
mod datasource;
mod evaluate;
mod formula;
mod markup;
mod normalize;
mod pipeline;
mod rules;
mod run;
mod segment;
#[cfg(test)]
mod tests;

pub use run::run;

use assemble::*;
use cells::*;
use datasource::*;
use evaluate::*;
use formula::*;
use markup::*;
use normalize::*;
use pipeline::*;
use rules::*;
use segment::*;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to read source {path}: {message}")]
    SourceRead { path: String, message: String },

    #[error("unexpected source structure: {0}")]
    UnknownFormat(String),

    #[error("invalid datasource json: {0}")]
    Json(#[from] serde_json::Error),
}
