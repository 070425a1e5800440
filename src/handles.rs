//! Out-of-line resource handles.
//!
//! Timestamp and large-object columns are fetched into engine descriptors
//! rather than inline bytes. A [`HandleTable`] allocates one descriptor per
//! batch slot when the column is bound, reuses them for every fetch cycle and
//! frees them exactly once when dropped.
//!
//! Descriptors are allocated for the full batch capacity, not for the rows
//! actually fetched, so an oversized batch costs one descriptor per unused
//! slot.

use std::rc::Rc;

use chrono::NaiveDateTime;
use tracing::{debug, trace};

use crate::engine::{Descriptor, DescriptorKind, Environment};
use crate::error::FetchResult;
use crate::report::{check, report_teardown};

pub struct HandleTable {
    kind: DescriptorKind,
    descriptors: Vec<Descriptor>,
    env: Rc<dyn Environment>,
}

impl HandleTable {
    /// Allocate `count` descriptors of `kind`.
    ///
    /// If an allocation fails, the descriptors already allocated are freed
    /// before the error is returned.
    pub fn allocate(env: &Rc<dyn Environment>, kind: DescriptorKind, count: usize) -> FetchResult<Self> {
        debug!("alloc_descriptor({}) ({} times)", kind, count);
        let mut table = HandleTable {
            kind,
            descriptors: Vec::with_capacity(count),
            env: Rc::clone(env),
        };
        let operation = format!("alloc_descriptor({})", kind);
        for _ in 0..count {
            let descriptor = check(env.as_ref(), env.alloc_descriptor(kind), &operation)?;
            table.descriptors.push(descriptor);
        }
        Ok(table)
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptor bound to batch slot `row`.
    ///
    /// # Panics
    /// If `row` is not below the batch capacity.
    pub fn handle_at(&self, row: usize) -> Descriptor {
        self.descriptors[row]
    }

    /// Store every handle into its element of a batch buffer.
    pub(crate) fn write_into(&self, data: &mut [u8]) {
        for (element, descriptor) in data
            .chunks_exact_mut(Descriptor::WIDTH)
            .zip(&self.descriptors)
        {
            element.copy_from_slice(&descriptor.to_bytes());
        }
    }

    /// Read the full payload of a large object.
    ///
    /// The payload size is not limited by the column's declared width.
    pub fn materialize_blob(&self, descriptor: Descriptor) -> FetchResult<Vec<u8>> {
        trace!("lob_read({:?})", descriptor);
        check(self.env.as_ref(), self.env.lob_read(descriptor), "lob_read")
    }

    /// Decode a timestamp descriptor.
    pub fn read_datetime(&self, descriptor: Descriptor) -> FetchResult<NaiveDateTime> {
        trace!("datetime_read({:?})", descriptor);
        check(
            self.env.as_ref(),
            self.env.datetime_read(descriptor),
            "datetime_read",
        )
    }
}

impl Drop for HandleTable {
    fn drop(&mut self) {
        if self.descriptors.is_empty() {
            return;
        }
        debug!(
            "free_descriptor({}) ({} times)",
            self.kind,
            self.descriptors.len()
        );
        let operation = format!("free_descriptor({})", self.kind);
        for descriptor in self.descriptors.drain(..) {
            let status = self.env.free_descriptor(descriptor, self.kind);
            report_teardown(self.env.as_ref(), status, &operation);
        }
    }
}
