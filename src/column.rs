//! Column buffer binding.
//!
//! [`BoundColumn`] owns everything one result column needs across fetch
//! cycles: the batch buffer, the null-indicator and length arrays, and the
//! descriptor table for out-of-line kinds. It is created by [`BoundColumn::bind`]
//! and released as a unit when dropped.

use std::rc::Rc;

use tracing::debug;

use crate::engine::{
    ColumnMetadata, ColumnSlot, Cursor, DefineId, DefineSpec, Descriptor, Environment,
};
use crate::error::{FetchError, FetchResult};
use crate::handles::HandleTable;
use crate::number::{self, Decimal};
use crate::repr::Repr;
use crate::report::{check, report_teardown};

/// A column bound to a batch buffer.
pub struct BoundColumn {
    meta: ColumnMetadata,
    repr: Repr,
    batch: usize,
    define: DefineId,
    // Dropped before `buffer`: descriptors are released ahead of the memory
    // that holds their handles.
    handles: Option<HandleTable>,
    buffer: ColumnBuffer,
    env: Rc<dyn Environment>,
}

struct ColumnBuffer {
    data: Vec<u8>,
    element_width: usize,
    indicators: Vec<i16>,
    lengths: Vec<u32>,
}

/// Raw value at one batch slot, decoded by representation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stored<'a> {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Decimal(Decimal),
    /// Declared character data, trimmed to the fetched length.
    Text(&'a [u8]),
    /// Binary or unrecognised data, trimmed to the fetched length.
    Raw(&'a [u8]),
    Temporal(Descriptor),
    Lob(Descriptor),
}

impl BoundColumn {
    /// Bind column `position` of `cursor` to a buffer for `batch` rows.
    ///
    /// On failure every resource acquired so far is released before the
    /// error is returned.
    pub fn bind<C>(
        cursor: &mut C,
        env: &Rc<dyn Environment>,
        position: usize,
        batch: usize,
    ) -> FetchResult<Self>
    where
        C: Cursor + ?Sized,
    {
        if batch == 0 {
            return Err(FetchError::Config("batch size must be at least 1".into()));
        }

        let meta = check(&*cursor, cursor.describe(position), "describe")?;
        let repr = Repr::of(meta.type_tag);
        let element_width = repr.element_width(meta.width);
        let wire = repr.wire_tag(meta.type_tag);
        debug!(
            "bind column {} '{}' type={} width={} as {} ({} x {} bytes)",
            position, meta.name, meta.type_tag, meta.width, repr, batch, element_width
        );

        let handles = match repr.descriptor_kind() {
            Some(kind) => Some(HandleTable::allocate(env, kind, batch)?),
            None => None,
        };

        // Zeroed memory is a valid decimal zero in every slot.
        let mut buffer = ColumnBuffer {
            data: vec![0u8; batch * element_width],
            element_width,
            indicators: vec![0; batch],
            lengths: vec![0; batch],
        };
        if let Some(handles) = &handles {
            handles.write_into(&mut buffer.data);
        }

        let spec = DefineSpec {
            position,
            wire,
            element_width,
            batch,
        };
        let reply = cursor.define(position, &spec);
        let define = check(&*cursor, reply, "define")?;

        Ok(BoundColumn {
            meta,
            repr,
            batch,
            define,
            handles,
            buffer,
            env: Rc::clone(env),
        })
    }

    pub fn meta(&self) -> &ColumnMetadata {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn repr(&self) -> Repr {
        self.repr
    }

    /// Batch capacity. Fixed for the lifetime of the binding.
    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn element_width(&self) -> usize {
        self.buffer.element_width
    }

    /// Mutable view handed to the cursor for a fetch cycle.
    pub(crate) fn slot(&mut self) -> ColumnSlot<'_> {
        ColumnSlot {
            define: self.define,
            data: &mut self.buffer.data,
            indicators: &mut self.buffer.indicators,
            lengths: &mut self.buffer.lengths,
        }
    }

    fn check_row(&self, row: usize) {
        assert!(
            row < self.batch,
            "row {} out of range for batch of {}",
            row,
            self.batch
        );
    }

    /// Whether the value at `row` is NULL.
    ///
    /// # Panics
    /// If `row` is not below the batch capacity.
    pub fn is_null(&self, row: usize) -> bool {
        self.check_row(row);
        self.buffer.indicators[row] != 0
    }

    /// Bytes the engine wrote for `row` in the last fetch cycle.
    pub fn length(&self, row: usize) -> usize {
        self.check_row(row);
        self.buffer.lengths[row] as usize
    }

    fn element(&self, row: usize) -> &[u8] {
        let width = self.buffer.element_width;
        &self.buffer.data[row * width..(row + 1) * width]
    }

    /// Out-of-line handle bound to batch slot `row`.
    ///
    /// Returns `None` for inline kinds.
    pub fn handle_at(&self, row: usize) -> Option<Descriptor> {
        self.check_row(row);
        self.handles.as_ref().map(|h| h.handle_at(row))
    }

    pub(crate) fn handles(&self) -> FetchResult<&HandleTable> {
        self.handles.as_ref().ok_or_else(|| {
            FetchError::type_error(format!("column '{}' has no out-of-line handles", self.meta.name))
        })
    }

    /// Decode the raw value at `row`. The row must not be NULL.
    pub(crate) fn stored(&self, row: usize) -> FetchResult<Stored<'_>> {
        self.check_row(row);
        let element = self.element(row);
        let inline = &element[..self.length(row).min(element.len())];

        let stored = match self.repr {
            Repr::Signed => Stored::Signed(i64::from_ne_bytes(native(element))),
            Repr::Unsigned => Stored::Unsigned(u64::from_ne_bytes(native(element))),
            Repr::Float => Stored::Float(f64::from_ne_bytes(native(element))),
            Repr::Decimal => Stored::Decimal(number::decode(element)?),
            Repr::Text => Stored::Text(inline),
            Repr::Raw => Stored::Raw(inline),
            Repr::Temporal => Stored::Temporal(self.handles()?.handle_at(row)),
            Repr::Lob => Stored::Lob(self.handles()?.handle_at(row)),
        };
        Ok(stored)
    }
}

fn native(element: &[u8]) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&element[..8]);
    bytes
}

impl Drop for BoundColumn {
    fn drop(&mut self) {
        let status = self.env.free_define(self.define);
        report_teardown(self.env.as_ref(), status, "free_define");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{Cell, MemoryCursor, MemoryEnv};
    use crate::engine::{Reply, TypeTag};

    fn env() -> (MemoryEnv, Rc<dyn Environment>) {
        let mem = MemoryEnv::new();
        let env: Rc<dyn Environment> = Rc::new(mem.clone());
        (mem, env)
    }

    fn fetch(cursor: &mut MemoryCursor, column: &mut BoundColumn) -> Reply<usize> {
        let batch = column.batch();
        cursor.fetch(batch, &mut [column.slot()])
    }

    #[test]
    fn test_bind_integer_column() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("n", TypeTag::INT, 8)])
            .with_rows([vec![Cell::Int(42)], vec![Cell::Null], vec![Cell::Int(-7)]]);
        let mut column = BoundColumn::bind(&mut cursor, &env, 0, 3).unwrap();
        assert_eq!(column.repr(), Repr::Signed);
        assert_eq!(column.element_width(), 8);
        assert_eq!(mem.live_defines(), 1);

        assert_eq!(fetch(&mut cursor, &mut column), Reply::ok(3));
        assert!(!column.is_null(0));
        assert!(column.is_null(1));
        assert_eq!(column.stored(0).unwrap(), Stored::Signed(42));
        assert_eq!(column.stored(2).unwrap(), Stored::Signed(-7));

        drop(column);
        assert_eq!(mem.live_defines(), 0);
    }

    #[test]
    fn test_unfetched_decimal_slot_is_zero() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("d", TypeTag::NUM, 22)]);
        let column = BoundColumn::bind(&mut cursor, &env, 0, 4).unwrap();
        assert_eq!(column.element_width(), number::NUMBER_SIZE);
        for row in 0..4 {
            assert_eq!(column.stored(row).unwrap(), Stored::Decimal(Decimal::ZERO));
        }
    }

    #[test]
    fn test_text_trimmed_to_length() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("s", TypeTag::VCS, 4)])
            .with_rows([vec![Cell::from("ab")]]);
        let mut column = BoundColumn::bind(&mut cursor, &env, 0, 2).unwrap();
        assert_eq!(column.element_width(), 4 + crate::repr::TEXT_MARGIN);
        assert_eq!(fetch(&mut cursor, &mut column), Reply::ok(1));
        assert_eq!(column.length(0), 2);
        assert_eq!(column.stored(0).unwrap(), Stored::Text(b"ab"));
    }

    #[test]
    fn test_handles_released_with_column() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(
            &mem,
            vec![
                ColumnMetadata::new("at", TypeTag::TIMESTAMP, 11),
                ColumnMetadata::new("doc", TypeTag::BLOB, 4000),
            ],
        );
        let at = BoundColumn::bind(&mut cursor, &env, 0, 5).unwrap();
        let doc = BoundColumn::bind(&mut cursor, &env, 1, 5).unwrap();
        assert_eq!(mem.live_descriptors(), 10);
        assert!(at.handle_at(4).is_some());
        assert_eq!(doc.element_width(), Descriptor::WIDTH);

        drop(at);
        drop(doc);
        assert_eq!(mem.live_descriptors(), 0);
        assert_eq!(mem.freed_descriptors(), 10);
        assert_eq!(mem.live_defines(), 0);
    }

    #[test]
    fn test_failed_release_keeps_tearing_down() {
        let (mem, env) = env();
        let mut cursor =
            MemoryCursor::new(&mem, vec![ColumnMetadata::new("doc", TypeTag::BLOB, 4000)])
                .with_rows([vec![Cell::Bytes(vec![1, 2, 3])]]);
        let mut column = BoundColumn::bind(&mut cursor, &env, 0, 4).unwrap();
        assert_eq!(fetch(&mut cursor, &mut column), Reply::ok(1));

        mem.fail_next_free();
        drop(column);
        assert_eq!(mem.live_defines(), 0);
        assert_eq!(mem.freed_descriptors(), 3);
        assert_eq!(mem.live_descriptors(), 1);
    }

    #[test]
    fn test_failed_define_releases_handles() {
        let (mem, env) = env();
        let mut cursor =
            MemoryCursor::new(&mem, vec![ColumnMetadata::new("doc", TypeTag::BLOB, 0)]);
        mem.fail_next_define();
        let err = BoundColumn::bind(&mut cursor, &env, 0, 3).err().unwrap();
        assert!(err.to_string().starts_with("define:"));
        assert_eq!(mem.live_descriptors(), 0);
        assert_eq!(mem.freed_descriptors(), 3);
    }

    #[test]
    fn test_describe_failure() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(&mem, vec![]);
        let err = BoundColumn::bind(&mut cursor, &env, 0, 1).err().unwrap();
        match err {
            FetchError::Engine { operation, code, .. } => {
                assert_eq!(operation, "describe");
                assert_eq!(code, 1007);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_zero_batch_rejected() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("n", TypeTag::INT, 8)]);
        assert!(BoundColumn::bind(&mut cursor, &env, 0, 0).is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_row_out_of_range_panics() {
        let (mem, env) = env();
        let mut cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("n", TypeTag::INT, 8)]);
        let column = BoundColumn::bind(&mut cursor, &env, 0, 2).unwrap();
        column.is_null(2);
    }
}
