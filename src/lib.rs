//! # rowset: typed values from batch-bound cursors
//!
//! rowset binds each column of a database cursor to a batch buffer, drives
//! fetch cycles that fill many rows per round trip, and reads every slot back
//! as a typed Rust value.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::rc::Rc;
//! use rowset::prelude::*;
//!
//! let mem = MemoryEnv::new();
//! let env: Rc<dyn Environment> = Rc::new(mem.clone());
//! let cursor = MemoryCursor::new(&mem, vec![ColumnMetadata::new("n", TypeTag::INT, 8)])
//!     .with_rows([vec![Cell::Int(42)], vec![Cell::Null]]);
//!
//! let mut rows = RowSet::new(cursor, &env, 100).unwrap();
//! let batch = rows.fetch().unwrap().unwrap();
//! assert_eq!(batch.row(0).get::<i32>(0).unwrap(), 42);
//! assert_eq!(batch.row(0).get::<String>(0).unwrap(), "42");
//! assert!(batch.row(1).get::<i32>(0).unwrap_err().is_null_value());
//! ```
//!
//! ## Representation kinds
//!
//! | Kind     | Buffer element        | Readable as                      |
//! |----------|-----------------------|----------------------------------|
//! | temporal | descriptor handle     | date, time, datetime, ISO text   |
//! | signed   | `i64`                 | numbers, text                    |
//! | unsigned | `u64`                 | numbers, text                    |
//! | float    | `f64`                 | numbers, text                    |
//! | decimal  | 22-byte engine number | numbers, text                    |
//! | lob      | descriptor handle     | blob                             |
//! | text     | bytes + 16 margin     | numbers (parsed), char, text     |
//! | raw      | bytes + 16 margin     | numbers (parsed), char, text, blob |

pub mod column;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod handles;
pub mod number;
pub mod numeric;
pub mod report;
pub mod repr;
pub mod rowset;

pub mod prelude {
    pub use crate::column::BoundColumn;
    pub use crate::engine::memory::{Cell, MemoryCursor, MemoryEnv};
    pub use crate::engine::{
        ColumnMetadata, Cursor, Diagnostics, Environment, Reply, Status, TypeTag,
    };
    pub use crate::error::*;
    pub use crate::extract::FromColumn;
    pub use crate::number::Decimal;
    pub use crate::repr::Repr;
    pub use crate::rowset::{Batch, Row, RowSet};
}

pub use crate::error::{FetchError, FetchResult};
pub use crate::rowset::RowSet;
