//! In-process engine.
//!
//! [`MemoryEnv`] and [`MemoryCursor`] implement the engine boundary over rows
//! held in memory. Fetch cycles write into bound buffers exactly as a native
//! driver would: native-endian integers and doubles, 22-byte decimal
//! elements, descriptor handles for timestamps and large objects, and
//! unterminated bytes for text.
//!
//! Used by the test suite, by the CLI's fixture mode, and as the row store
//! behind [`super::any`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use super::{
    ColumnMetadata, ColumnSlot, Cursor, DefineId, DefineSpec, Descriptor, DescriptorKind,
    Diagnostic, Diagnostics, Environment, Reply, Status, TypeTag,
};
use crate::error::{FetchError, FetchResult};
use crate::number::{self, Decimal, NUMBER_SIZE};
use crate::repr::Repr;

/// A single stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Uint(u64),
    Float(f64),
    Number(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Cell {
    fn kind(&self) -> &'static str {
        match self {
            Cell::Null => "NULL",
            Cell::Int(_) => "INT",
            Cell::Uint(_) => "UIN",
            Cell::Float(_) => "FLT",
            Cell::Number(_) => "NUMBER",
            Cell::Text(_) => "CHAR",
            Cell::Bytes(_) => "RAW",
            Cell::Timestamp(_) => "TIMESTAMP",
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<Decimal> for Cell {
    fn from(v: Decimal) -> Self {
        Cell::Number(v)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(v: NaiveDateTime) -> Self {
        Cell::Timestamp(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Empty,
    Timestamp(NaiveDateTime),
    Lob(Vec<u8>),
}

#[derive(Default)]
struct EnvState {
    next_id: u64,
    descriptors: HashMap<u64, (DescriptorKind, Payload)>,
    defines: HashMap<u64, DefineSpec>,
    last_error: Option<Diagnostic>,
    fail_alloc_after: Option<usize>,
    fail_next_define: bool,
    fail_next_free: bool,
    allocated: usize,
    freed: usize,
}

impl EnvState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn fail<T>(&mut self, code: i32, message: impl Into<String>) -> Reply<T> {
        self.last_error = Some(Diagnostic::new(code, message));
        Reply::fail(Status::Error)
    }
}

/// In-memory engine environment. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryEnv {
    state: Rc<RefCell<EnvState>>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every descriptor allocation after the first `n` fail.
    pub fn fail_alloc_after(&self, n: usize) {
        self.state.borrow_mut().fail_alloc_after = Some(n);
    }

    /// Make the next [`Cursor::define`] call fail.
    pub fn fail_next_define(&self) {
        self.state.borrow_mut().fail_next_define = true;
    }

    /// Make the next descriptor release fail. The descriptor stays live.
    pub fn fail_next_free(&self) {
        self.state.borrow_mut().fail_next_free = true;
    }

    /// Descriptors allocated and not yet freed.
    pub fn live_descriptors(&self) -> usize {
        self.state.borrow().descriptors.len()
    }

    /// Descriptors freed so far.
    pub fn freed_descriptors(&self) -> usize {
        self.state.borrow().freed
    }

    /// Buffer registrations not yet released.
    pub fn live_defines(&self) -> usize {
        self.state.borrow().defines.len()
    }
}

impl Diagnostics for MemoryEnv {
    fn last_error(&self) -> Option<Diagnostic> {
        self.state.borrow().last_error.clone()
    }
}

impl Environment for MemoryEnv {
    fn alloc_descriptor(&self, kind: DescriptorKind) -> Reply<Descriptor> {
        let mut state = self.state.borrow_mut();
        if state.fail_alloc_after.is_some_and(|n| state.allocated >= n) {
            return state.fail(1019, "ORA-01019: unable to allocate memory in the user side");
        }
        state.allocated += 1;
        let id = state.next_id();
        state.descriptors.insert(id, (kind, Payload::Empty));
        Reply::ok(Descriptor(id))
    }

    fn free_descriptor(&self, descriptor: Descriptor, kind: DescriptorKind) -> Status {
        let mut state = self.state.borrow_mut();
        let known = matches!(state.descriptors.get(&descriptor.0), Some((k, _)) if *k == kind);
        if !known {
            return Status::InvalidHandle;
        }
        if std::mem::take(&mut state.fail_next_free) {
            return state
                .fail::<()>(21500, "ORA-21500: internal error code")
                .status;
        }
        state.descriptors.remove(&descriptor.0);
        state.freed += 1;
        Status::Success
    }

    fn free_define(&self, define: DefineId) -> Status {
        match self.state.borrow_mut().defines.remove(&define.0) {
            Some(_) => Status::Success,
            None => Status::InvalidHandle,
        }
    }

    fn lob_read(&self, descriptor: Descriptor) -> Reply<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        let bytes = match state.descriptors.get(&descriptor.0) {
            Some((DescriptorKind::Lob, Payload::Lob(bytes))) => Some(bytes.clone()),
            Some((DescriptorKind::Lob, _)) => None,
            _ => return Reply::fail(Status::InvalidHandle),
        };
        match bytes {
            Some(bytes) => Reply::ok(bytes),
            None => state.fail(22275, "ORA-22275: invalid LOB locator specified"),
        }
    }

    fn datetime_read(&self, descriptor: Descriptor) -> Reply<NaiveDateTime> {
        let mut state = self.state.borrow_mut();
        let value = match state.descriptors.get(&descriptor.0) {
            Some((DescriptorKind::Timestamp, Payload::Timestamp(dt))) => Some(*dt),
            Some((DescriptorKind::Timestamp, _)) => None,
            _ => return Reply::fail(Status::InvalidHandle),
        };
        match value {
            Some(dt) => Reply::ok(dt),
            None => state.fail(1405, "ORA-01405: fetched column value is NULL"),
        }
    }
}

/// Cursor over rows held in memory.
pub struct MemoryCursor {
    env: MemoryEnv,
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<Cell>>,
    position: usize,
}

impl MemoryCursor {
    pub fn new(env: &MemoryEnv, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            env: env.clone(),
            columns,
            rows: Vec::new(),
            position: 0,
        }
    }

    /// Append a row. Missing trailing values are NULL.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    pub fn with_rows<I>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<Cell>>,
    {
        for row in rows {
            self.push_row(row);
        }
        self
    }

    /// Build a cursor from a parsed fixture.
    pub fn from_fixture(env: &MemoryEnv, fixture: Fixture) -> FetchResult<Self> {
        let mut columns = Vec::with_capacity(fixture.columns.len());
        let mut reprs = Vec::with_capacity(fixture.columns.len());
        for col in &fixture.columns {
            let tag = TypeTag::from_name(&col.type_name).ok_or_else(|| {
                FetchError::Config(format!(
                    "unknown type '{}' for column '{}'",
                    col.type_name, col.name
                ))
            })?;
            reprs.push(Repr::of(tag));
            columns.push(ColumnMetadata::new(col.name.clone(), tag, col.width.unwrap_or(0)));
        }

        let mut rows = Vec::with_capacity(fixture.rows.len());
        for values in &fixture.rows {
            let mut row = Vec::with_capacity(columns.len());
            for (value, repr) in values.iter().zip(&reprs) {
                row.push(cell_from_json(value, *repr)?);
            }
            rows.push(row);
        }

        // Text widths default to the longest value.
        for (i, col) in fixture.columns.iter().enumerate() {
            if col.width.is_none() {
                columns[i].width = match reprs[i] {
                    Repr::Text | Repr::Raw => rows
                        .iter()
                        .filter_map(|r: &Vec<Cell>| r.get(i))
                        .map(|c| text_bytes(c).map(|b| b.len()).unwrap_or(0))
                        .max()
                        .unwrap_or(0)
                        .max(1),
                    repr => repr.element_width(0),
                };
            }
        }

        Ok(MemoryCursor::new(env, columns).with_rows(rows))
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn remaining(&self) -> usize {
        self.rows.len() - self.position
    }
}

impl Diagnostics for MemoryCursor {
    fn last_error(&self) -> Option<Diagnostic> {
        self.env.last_error()
    }
}

impl Cursor for MemoryCursor {
    fn column_count(&self) -> Reply<usize> {
        Reply::ok(self.columns.len())
    }

    fn describe(&self, position: usize) -> Reply<ColumnMetadata> {
        match self.columns.get(position) {
            Some(meta) => Reply::ok(meta.clone()),
            None => self
                .env
                .state
                .borrow_mut()
                .fail(1007, "ORA-01007: variable not in select list"),
        }
    }

    fn define(&mut self, position: usize, spec: &DefineSpec) -> Reply<DefineId> {
        let mut state = self.env.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_define) {
            return state.fail(1008, "ORA-01008: not all variables bound");
        }
        if position >= self.columns.len() || spec.position != position {
            return state.fail(1007, "ORA-01007: variable not in select list");
        }
        if spec.batch == 0 || spec.element_width == 0 {
            return state.fail(24329, "ORA-24329: invalid character set identifier");
        }
        let id = state.next_id();
        state.defines.insert(id, *spec);
        debug!(
            "define column {} as {} width={} batch={}",
            position, spec.wire, spec.element_width, spec.batch
        );
        Reply::ok(DefineId(id))
    }

    fn fetch(&mut self, rows: usize, slots: &mut [ColumnSlot<'_>]) -> Reply<usize> {
        let count = rows.min(self.remaining());
        if count == 0 {
            return Reply::no_data(0);
        }

        let mut state = self.env.state.borrow_mut();
        for slot in slots.iter_mut() {
            let Some(spec) = state.defines.get(&slot.define.0).copied() else {
                return Reply::fail(Status::InvalidHandle);
            };
            if count > spec.batch
                || slot.data.len() < spec.batch * spec.element_width
                || slot.indicators.len() < spec.batch
                || slot.lengths.len() < spec.batch
            {
                return state.fail(1002, "ORA-01002: fetch out of sequence");
            }
            for r in 0..count {
                let cell = &self.rows[self.position + r][spec.position];
                let element =
                    &mut slot.data[r * spec.element_width..(r + 1) * spec.element_width];
                if let Err(diag) = write_cell(
                    &mut state,
                    &spec,
                    cell,
                    element,
                    &mut slot.indicators[r],
                    &mut slot.lengths[r],
                ) {
                    state.last_error = Some(diag);
                    return Reply::fail(Status::Error);
                }
            }
        }
        drop(state);

        self.position += count;
        debug!("fetched {} rows ({} remaining)", count, self.remaining());
        Reply::ok(count)
    }
}

fn mismatch(wire: TypeTag, cell: &Cell) -> Diagnostic {
    Diagnostic::new(
        932,
        format!(
            "ORA-00932: inconsistent datatypes: expected {} got {}",
            wire,
            cell.kind()
        ),
    )
}

fn invalid_number() -> Diagnostic {
    Diagnostic::new(1722, "ORA-01722: invalid number")
}

fn int_overflow() -> Diagnostic {
    Diagnostic::new(1455, "ORA-01455: converting column overflows integer datatype")
}

fn write_cell(
    state: &mut EnvState,
    spec: &DefineSpec,
    cell: &Cell,
    element: &mut [u8],
    indicator: &mut i16,
    length: &mut u32,
) -> Result<(), Diagnostic> {
    if *cell == Cell::Null {
        *indicator = -1;
        *length = 0;
        return Ok(());
    }
    *indicator = 0;

    let written = match spec.wire {
        TypeTag::INT => {
            let v: i64 = match cell {
                Cell::Int(v) => *v,
                Cell::Uint(v) => i64::try_from(*v).map_err(|_| int_overflow())?,
                Cell::Float(f) if f.is_finite() && f.abs() < 9.2e18 => f.trunc() as i64,
                Cell::Float(_) => return Err(int_overflow()),
                Cell::Number(d) => d
                    .round_half_away()
                    .and_then(|v| i64::try_from(v).ok())
                    .ok_or_else(int_overflow)?,
                Cell::Text(s) => s.trim().parse().map_err(|_| invalid_number())?,
                other => return Err(mismatch(spec.wire, other)),
            };
            put(element, &v.to_ne_bytes())?
        }
        TypeTag::UIN => {
            let v: u64 = match cell {
                Cell::Int(v) => u64::try_from(*v).map_err(|_| int_overflow())?,
                Cell::Uint(v) => *v,
                Cell::Float(f) if f.is_finite() && *f > -1.0 && *f < 1.8e19 => f.trunc() as u64,
                Cell::Float(_) => return Err(int_overflow()),
                Cell::Number(d) => d
                    .round_half_away()
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(int_overflow)?,
                Cell::Text(s) => s.trim().parse().map_err(|_| invalid_number())?,
                other => return Err(mismatch(spec.wire, other)),
            };
            put(element, &v.to_ne_bytes())?
        }
        TypeTag::FLT => {
            let v: f64 = match cell {
                Cell::Int(v) => *v as f64,
                Cell::Uint(v) => *v as f64,
                Cell::Float(f) => *f,
                Cell::Number(d) => d.to_f64(),
                Cell::Text(s) => s.trim().parse().map_err(|_| invalid_number())?,
                other => return Err(mismatch(spec.wire, other)),
            };
            put(element, &v.to_ne_bytes())?
        }
        TypeTag::VNU => {
            let d = match cell {
                Cell::Int(v) => Decimal::from(*v),
                Cell::Uint(v) => Decimal::from(*v),
                Cell::Float(f) => Decimal::from_f64(*f).map_err(|_| invalid_number())?,
                Cell::Number(d) => *d,
                Cell::Text(s) => s.parse().map_err(|_| invalid_number())?,
                other => return Err(mismatch(spec.wire, other)),
            };
            let encoded = number::encode(&d)
                .map_err(|_| Diagnostic::new(1426, "ORA-01426: numeric overflow"))?;
            put(element, &encoded[..NUMBER_SIZE])?
        }
        TypeTag::TIMESTAMP => {
            let dt = match cell {
                Cell::Timestamp(dt) => *dt,
                Cell::Text(s) => parse_timestamp(s).ok_or_else(|| {
                    Diagnostic::new(1861, "ORA-01861: literal does not match format string")
                })?,
                other => return Err(mismatch(spec.wire, other)),
            };
            set_payload(state, element, DescriptorKind::Timestamp, Payload::Timestamp(dt))?;
            Descriptor::WIDTH
        }
        TypeTag::BLOB => {
            let bytes = match cell {
                Cell::Bytes(b) => b.clone(),
                Cell::Text(s) => s.as_bytes().to_vec(),
                other => return Err(mismatch(spec.wire, other)),
            };
            set_payload(state, element, DescriptorKind::Lob, Payload::Lob(bytes))?;
            Descriptor::WIDTH
        }
        TypeTag::AFC | TypeTag::BIN => {
            let bytes = text_bytes(cell).ok_or_else(|| mismatch(spec.wire, cell))?;
            put(element, &bytes)?
        }
        other => return Err(mismatch(other, cell)),
    };
    *length = written as u32;
    Ok(())
}

fn put(element: &mut [u8], bytes: &[u8]) -> Result<usize, Diagnostic> {
    if bytes.len() > element.len() {
        return Err(Diagnostic::new(
            1406,
            "ORA-01406: fetched column value was truncated",
        ));
    }
    element[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

fn set_payload(
    state: &mut EnvState,
    element: &[u8],
    kind: DescriptorKind,
    payload: Payload,
) -> Result<(), Diagnostic> {
    let invalid = || Diagnostic::new(22275, "ORA-22275: invalid LOB locator specified");
    let descriptor = Descriptor::from_bytes(element).ok_or_else(invalid)?;
    match state.descriptors.get_mut(&descriptor.0) {
        Some((k, slot)) if *k == kind => {
            *slot = payload;
            Ok(())
        }
        _ => Err(invalid()),
    }
}

/// Character rendering of a cell, as written for text defines.
fn text_bytes(cell: &Cell) -> Option<Vec<u8>> {
    let bytes = match cell {
        Cell::Null => return None,
        Cell::Int(v) => v.to_string().into_bytes(),
        Cell::Uint(v) => v.to_string().into_bytes(),
        Cell::Float(v) => v.to_string().into_bytes(),
        Cell::Number(d) => d.to_string().into_bytes(),
        Cell::Text(s) => s.as_bytes().to_vec(),
        Cell::Bytes(b) => b.clone(),
        Cell::Timestamp(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes(),
    };
    Some(bytes)
}

/// Parse `YYYY-MM-DD[( |T)HH:MM:SS[.f]]`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Column declaration in a fixture file.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub width: Option<usize>,
}

/// A result set described in JSON.
///
/// ```json
/// {
///   "columns": [{"name": "id", "type": "INT"}, {"name": "label", "type": "VARCHAR2"}],
///   "rows": [[1, "one"], [2, null]]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub columns: Vec<FixtureColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Fixture {
    pub fn from_json(text: &str) -> FetchResult<Self> {
        serde_json::from_str(text).map_err(|e| FetchError::Config(format!("invalid fixture: {}", e)))
    }
}

fn cell_from_json(value: &serde_json::Value, repr: Repr) -> FetchResult<Cell> {
    use serde_json::Value;

    let bad = || FetchError::Config(format!("cannot store {} in a {} column", value, repr));
    let cell = match (value, repr) {
        (Value::Null, _) => Cell::Null,
        (Value::Bool(b), Repr::Signed | Repr::Unsigned | Repr::Float | Repr::Decimal) => {
            Cell::Int(*b as i64)
        }
        (Value::Number(n), Repr::Signed) => Cell::Int(n.as_i64().ok_or_else(bad)?),
        (Value::Number(n), Repr::Unsigned) => Cell::Uint(n.as_u64().ok_or_else(bad)?),
        (Value::Number(n), Repr::Float) => Cell::Float(n.as_f64().ok_or_else(bad)?),
        (Value::Number(n), Repr::Decimal) => Cell::Number(n.to_string().parse()?),
        (Value::String(s), Repr::Decimal) => Cell::Number(s.parse()?),
        (Value::String(s), Repr::Temporal) => Cell::Timestamp(parse_timestamp(s).ok_or_else(bad)?),
        (Value::String(s), Repr::Lob) => Cell::Bytes(s.as_bytes().to_vec()),
        (Value::Array(items), Repr::Lob | Repr::Raw) => Cell::Bytes(
            items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(bad)?,
        ),
        (Value::String(s), _) => Cell::Text(s.clone()),
        (other, Repr::Text | Repr::Raw) => Cell::Text(other.to_string()),
        _ => return Err(bad()),
    };
    Ok(cell)
}
