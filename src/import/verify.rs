//! Post-import verification
//!
//! One read-only `information_schema` query. The result is advisory: a failed
//! or suspicious check becomes a warning, the import itself has already
//! committed.

use serde::Serialize;
use tracing::{info, warn};

use crate::artifact::validate_schema;
use crate::engine::SqlClient;

/// What the engine reports about the imported schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub schema_present: bool,
    pub tables: u64,
    /// `information_schema.TABLES.TABLE_ROWS` sum; an estimate for InnoDB
    pub approx_rows: u64,
}

/// Verification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Passed(VerifyReport),
    Warning {
        reason: String,
        report: Option<VerifyReport>,
    },
}

impl VerifyOutcome {
    pub fn is_warning(&self) -> bool {
        matches!(self, VerifyOutcome::Warning { .. })
    }

    pub fn report(&self) -> Option<&VerifyReport> {
        match self {
            VerifyOutcome::Passed(report) => Some(report),
            VerifyOutcome::Warning { report, .. } => report.as_ref(),
        }
    }
}

/// Runs the post-import sanity query.
pub struct Verifier<'a> {
    client: &'a dyn SqlClient,
}

impl<'a> Verifier<'a> {
    pub fn new(client: &'a dyn SqlClient) -> Self {
        Self { client }
    }

    /// Introspection query for `schema`. The name must already be validated.
    pub fn query_for(schema: &str) -> String {
        format!(
            "SELECT \
             (SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = '{s}'), \
             COUNT(*), \
             COALESCE(SUM(TABLE_ROWS), 0) \
             FROM information_schema.TABLES WHERE TABLE_SCHEMA = '{s}'",
            s = schema
        )
    }

    /// Check that `schema` exists and has tables.
    pub fn verify(&self, schema: &str) -> VerifyOutcome {
        if let Err(e) = validate_schema(schema) {
            return warning(e.to_string(), None);
        }

        let rows = match self.client.query(&Self::query_for(schema)) {
            Ok(rows) => rows,
            Err(e) => return warning(format!("verification query failed: {}", e), None),
        };

        let report = match parse_report(&rows) {
            Some(report) => report,
            None => return warning(format!("unexpected verification output: {:?}", rows), None),
        };

        if !report.schema_present {
            return warning(format!("schema '{}' not found after import", schema), Some(report));
        }
        if report.tables == 0 {
            return warning(format!("schema '{}' has no tables after import", schema), Some(report));
        }

        info!(
            schema,
            tables = report.tables,
            approx_rows = report.approx_rows,
            "import verified"
        );
        VerifyOutcome::Passed(report)
    }
}

fn warning(reason: String, report: Option<VerifyReport>) -> VerifyOutcome {
    warn!(
        reason = %reason,
        "VERIFY WARNING: import applied but verification did not pass; operator attention required"
    );
    VerifyOutcome::Warning { reason, report }
}

fn parse_report(rows: &[Vec<String>]) -> Option<VerifyReport> {
    let row = rows.first()?;
    if row.len() != 3 {
        return None;
    }
    let field = |i: usize| row[i].trim().parse::<u64>().ok();
    Some(VerifyReport {
        schema_present: field(0)? > 0,
        tables: field(1)?,
        approx_rows: field(2)?,
    })
}
