//! In-memory SQLite database used for one query execution

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::limits::Limit;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle};
use tracing::{debug, warn};

use super::statements::split_statements;
use crate::domain::SandboxResult;

/// Everything a batch of statements produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    /// Header and row lines in emission order
    pub lines: Vec<String>,
    /// Row lines only
    pub rows: Vec<String>,
    /// One message per failed statement
    pub errors: Vec<String>,
    pub truncated: bool,
    max_bytes: usize,
    bytes: usize,
}

impl QueryOutput {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    /// Record a failure prefixed with the phase it happened in
    pub fn error(&mut self, prefix: &str, message: impl std::fmt::Display) {
        self.errors.push(format!("{} {}", prefix, message));
    }

    fn push_header(&mut self, line: String) -> bool {
        if !self.reserve(&line) {
            return false;
        }
        self.lines.push(line);
        true
    }

    fn push_row(&mut self, line: String) -> bool {
        if !self.reserve(&line) {
            return false;
        }
        self.rows.push(line.clone());
        self.lines.push(line);
        true
    }

    fn reserve(&mut self, line: &str) -> bool {
        let needed = line.len() + 1;
        if self.truncated || self.bytes + needed > self.max_bytes {
            self.truncated = true;
            return false;
        }
        self.bytes += needed;
        true
    }
}

pub struct QueryEngine {
    conn: Connection,
}

impl QueryEngine {
    /// Fresh private database, nothing shared with other executions
    ///
    /// The connection cannot reach the host filesystem: attaching another
    /// database (which `VACUUM INTO` also does) is refused and temporary
    /// tables stay in memory.
    pub fn open_in_memory() -> SandboxResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY")?;
        conn.set_limit(Limit::SQLITE_LIMIT_ATTACHED, 0);
        conn.authorizer(Some(deny_file_access));
        Ok(Self { conn })
    }

    /// Handle that aborts the running statement from another thread
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Reject any statement that writes from now on
    pub fn enable_read_only(&self) -> SandboxResult<()> {
        self.conn.execute_batch("PRAGMA query_only = ON")?;
        Ok(())
    }

    /// Run every statement of `script`, collecting failures instead of stopping
    pub fn run_script(
        &self,
        script: &str,
        error_prefix: &str,
        output: &mut QueryOutput,
        cancelled: &AtomicBool,
    ) {
        for sql in split_statements(script) {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            if let Err(e) = self.run_statement(&sql, output, cancelled) {
                debug!("Statement failed: {}", e);
                output.error(error_prefix, e);
            }
        }
    }

    fn run_statement(
        &self,
        sql: &str,
        output: &mut QueryOutput,
        cancelled: &AtomicBool,
    ) -> rusqlite::Result<()> {
        let mut stmt = self.conn.prepare(sql)?;

        if stmt.column_count() == 0 {
            stmt.execute([])?;
            return Ok(());
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut header_written = false;

        while let Some(row) = rows.next()? {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            if !header_written {
                if !output.push_header(columns.join("|")) {
                    break;
                }
                header_written = true;
            }

            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(format_value(row.get_ref(i)?));
            }
            if !output.push_row(values.join("|")) {
                break;
            }
        }

        Ok(())
    }
}

fn deny_file_access(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Attach { filename } => {
            warn!("Refused ATTACH of {:?}", filename);
            Authorization::Deny
        }
        AuthAction::Pragma { pragma_name, .. } if is_storage_pragma(pragma_name) => {
            warn!("Refused PRAGMA {}", pragma_name);
            Authorization::Deny
        }
        _ => Authorization::Allow,
    }
}

fn is_storage_pragma(name: &str) -> bool {
    ["temp_store", "temp_store_directory", "data_store_directory"]
        .iter()
        .any(|pragma| name.eq_ignore_ascii_case(pragma))
}

/// Render one column value the way rows are printed
pub fn format_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format_real(f),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            hex
        }
    }
}

/// Reals always carry a fractional part so they read differently from integers
fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
