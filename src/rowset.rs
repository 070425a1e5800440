//! Batch iteration over a cursor.
//!
//! [`RowSet`] binds every column of a cursor with one batch size and drives
//! fetch cycles. Each [`RowSet::fetch`] lends out a [`Batch`] that borrows
//! the bound columns, so rows from one cycle cannot be read after the next
//! cycle has overwritten the buffers.
//!
//! ```rust,ignore
//! let mut rows = RowSet::new(cursor, &env, 100)?;
//! while let Some(batch) = rows.fetch()? {
//!     for row in batch.iter() {
//!         let id: i64 = row.get(0)?;
//!         let name: Option<String> = row.get_opt_by_name("name")?;
//!     }
//! }
//! ```

use std::rc::Rc;

use tracing::debug;

use crate::column::BoundColumn;
use crate::engine::{ColumnSlot, Cursor, Environment, Status};
use crate::error::{FetchError, FetchResult};
use crate::extract::FromColumn;
use crate::report::check;

/// Rows fetched per cycle when no size is configured.
pub const DEFAULT_BATCH: usize = 100;

pub struct RowSet<C: Cursor> {
    columns: Vec<BoundColumn>,
    cursor: C,
    batch: usize,
    fetched: u64,
    done: bool,
}

impl<C: Cursor> RowSet<C> {
    /// Bind every column of `cursor` for `batch` rows per fetch.
    pub fn new(mut cursor: C, env: &Rc<dyn Environment>, batch: usize) -> FetchResult<Self> {
        let count = check(&cursor, cursor.column_count(), "column_count")?;
        let columns = (0..count)
            .map(|position| BoundColumn::bind(&mut cursor, env, position, batch))
            .collect::<FetchResult<Vec<_>>>()?;
        debug!("bound {} columns, batch size {}", count, batch);

        Ok(Self {
            columns,
            cursor,
            batch,
            fetched: 0,
            done: false,
        })
    }

    pub fn columns(&self) -> &[BoundColumn] {
        &self.columns
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    /// Rows fetched so far over all cycles.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Position of the column called `name`.
    ///
    /// Exact matches win; otherwise names are compared ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        column_index(&self.columns, name)
    }

    /// Run one fetch cycle.
    ///
    /// Returns `None` once the cursor is exhausted.
    pub fn fetch(&mut self) -> FetchResult<Option<Batch<'_>>> {
        if self.done {
            return Ok(None);
        }

        let mut slots: Vec<ColumnSlot<'_>> =
            self.columns.iter_mut().map(BoundColumn::slot).collect();
        let reply = self.cursor.fetch(self.batch, &mut slots);
        drop(slots);

        let status = reply.status;
        let rows = check(&self.cursor, reply, "fetch")?;
        if status == Status::NoData || rows < self.batch {
            self.done = true;
        }
        if rows == 0 {
            return Ok(None);
        }

        self.fetched += rows as u64;
        debug!("fetch cycle: {} rows ({} total)", rows, self.fetched);
        Ok(Some(Batch {
            columns: &self.columns,
            rows,
        }))
    }
}

fn column_index(columns: &[BoundColumn], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c.name() == name)
        .or_else(|| columns.iter().position(|c| c.name().eq_ignore_ascii_case(name)))
}

/// The rows of one fetch cycle.
#[derive(Clone, Copy)]
pub struct Batch<'a> {
    columns: &'a [BoundColumn],
    rows: usize,
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &'a [BoundColumn] {
        self.columns
    }

    /// # Panics
    /// If `index` is not below [`len`](Self::len).
    pub fn row(&self, index: usize) -> Row<'a> {
        assert!(index < self.rows, "row {} out of range for {} rows", index, self.rows);
        Row {
            columns: self.columns,
            index,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'a>> + use<'a> {
        let columns = self.columns;
        (0..self.rows).map(move |index| Row { columns, index })
    }
}

/// One row of a batch.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [BoundColumn],
    index: usize,
}

impl<'a> Row<'a> {
    /// Slot of this row within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, position: usize) -> &'a BoundColumn {
        &self.columns[position]
    }

    pub fn column_by_name(&self, name: &str) -> FetchResult<&'a BoundColumn> {
        column_index(self.columns, name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| FetchError::UnknownColumn(name.to_string()))
    }

    pub fn is_null(&self, position: usize) -> bool {
        self.columns[position].is_null(self.index)
    }

    pub fn get<T: FromColumn>(&self, position: usize) -> FetchResult<T> {
        self.columns[position].get(self.index)
    }

    pub fn get_opt<T: FromColumn>(&self, position: usize) -> FetchResult<Option<T>> {
        self.columns[position].get_opt(self.index)
    }

    pub fn get_by_name<T: FromColumn>(&self, name: &str) -> FetchResult<T> {
        self.column_by_name(name)?.get(self.index)
    }

    pub fn get_opt_by_name<T: FromColumn>(&self, name: &str) -> FetchResult<Option<T>> {
        self.column_by_name(name)?.get_opt(self.index)
    }
}
