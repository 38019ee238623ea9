//! Bounded table walks.
//!
//! A column is walked with repeated GETNEXT until the agent leaves the
//! subtree or reports end-of-MIB. Agents that never leave the subtree, or
//! that answer with the same OID over and over, are cut off by the row
//! bound and reported as `TableWalkOverflow`.

use super::{compare_oids, subtree_suffix, RawVariable, SnmpTransport};
use crate::error::{MonitorError, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

static ABSENT: RawVariable = RawVariable::NoSuchInstance;

/// One column of a conceptual table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableColumn {
    pub name: &'static str,
    pub oid: &'static str,
}

/// One correlated row. Cells missing from a column walk read as `NoSuchInstance`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub index: u32,
    cells: BTreeMap<&'static str, RawVariable>,
}

impl TableRow {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> &RawVariable {
        self.cells.get(column).unwrap_or(&ABSENT)
    }

    /// Whether every listed column holds data for this row.
    pub fn is_complete(&self, columns: &[TableColumn]) -> bool {
        columns.iter().all(|c| !self.get(c.name).is_exception())
    }
}

/// Walks table columns with a row bound and a per-walk deadline.
#[derive(Debug, Clone, Copy)]
pub struct TableWalker {
    max_rows: usize,
    deadline: Duration,
}

impl TableWalker {
    pub fn new(max_rows: usize, deadline: Duration) -> Self {
        Self { max_rows, deadline }
    }

    /// Walk one column, returning its cells keyed by row index.
    pub async fn walk_column(
        &self,
        session: &mut dyn SnmpTransport,
        root: &str,
    ) -> Result<BTreeMap<u32, RawVariable>> {
        tokio::time::timeout(self.deadline, self.walk_unbounded_time(session, root))
            .await
            .map_err(|_| MonitorError::timeout(format!("walk of {}", root)))?
    }

    async fn walk_unbounded_time(
        &self,
        session: &mut dyn SnmpTransport,
        root: &str,
    ) -> Result<BTreeMap<u32, RawVariable>> {
        let mut rows = BTreeMap::new();
        let mut cursor = root.to_string();

        // Each request may add at most one row; one extra is allowed to see the end.
        for _ in 0..=self.max_rows {
            let binding = session.get_next(&cursor).await?;
            if binding.value == RawVariable::EndOfMibView {
                debug!(root, rows = rows.len(), "walk reached end of MIB view");
                return Ok(rows);
            }
            let Some(suffix) = subtree_suffix(root, &binding.oid) else {
                debug!(root, rows = rows.len(), "walk left subtree");
                return Ok(rows);
            };
            if compare_oids(&binding.oid, &cursor) != Ordering::Greater {
                warn!(root, oid = %binding.oid, "agent returned a non-increasing OID");
            }

            match suffix.as_slice() {
                [index] if *index > 0 => {
                    rows.insert(*index, binding.value);
                }
                _ => warn!(root, oid = %binding.oid, "skipping row with malformed index"),
            }
            cursor = binding.oid;
        }

        Err(MonitorError::TableWalkOverflow {
            root: root.to_string(),
            limit: self.max_rows,
        })
    }

    /// Walk several columns and correlate them by row index.
    ///
    /// The first column is the index column: failing to walk it fails the
    /// table. Other columns that fail with an item-level error are treated
    /// as absent for every row. Only the index column creates rows; cells
    /// other columns report for unknown indices are dropped.
    pub async fn walk_table(
        &self,
        session: &mut dyn SnmpTransport,
        columns: &[TableColumn],
    ) -> Result<BTreeMap<u32, TableRow>> {
        let mut table: BTreeMap<u32, TableRow> = BTreeMap::new();

        for (position, column) in columns.iter().enumerate() {
            let cells = match self.walk_column(session, column.oid).await {
                Ok(cells) => cells,
                Err(err) if position == 0 || err.is_session_level() => return Err(err),
                Err(err) => {
                    warn!(column = column.name, error = %err, "column walk failed, marking cells absent");
                    continue;
                }
            };
            for (index, value) in cells {
                if position == 0 {
                    table.entry(index).or_insert_with(|| TableRow::new(index));
                }
                match table.get_mut(&index) {
                    Some(row) => {
                        row.cells.insert(column.name, value);
                    }
                    None => debug!(column = column.name, index, "dropping cell with no index row"),
                }
            }
        }

        for row in table.values() {
            if !row.is_complete(columns) {
                warn!(index = row.index, "degraded table row: some columns absent");
            }
        }
        Ok(table)
    }
}
