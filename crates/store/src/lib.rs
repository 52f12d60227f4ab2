//! `SQLite` execution for Stratus resource tables.
//!
//! Runs the statements compiled by `stratus-orm`: connection options, the
//! [`Connection`] execution trait, transactions, batch identifier allocation and
//! a generic [`Dao`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use stratus_orm::{Expression, FieldPolicy, ListOption, Page};
//! use stratus_store::{Backend, Dao, Database, Kit, SqlIdAllocator};
//!
//! let db = Database::connect()?;
//! let kit = Kit::new("rid-1");
//! SqlIdAllocator::migrate(&db, &kit)?;
//!
//! let dao = Dao::<Subnet>::new(db, Arc::new(SqlIdAllocator));
//! let ids = dao.batch_create(&kit, &mut [subnet])?;
//!
//! let found = dao.list(&kit, &ListOption::new(Expression::r#in("id", ids), Page::new(0, 50)))?;
//! ```

mod config;
mod dao;
mod database;
mod error;
mod id;
mod kit;
mod traits;
mod txn;

pub use config::ConnectOptions;
pub use dao::{Dao, ListResult};
pub use database::{Connection, Database};
pub use error::{Error, Result};
pub use id::{IdAllocator, MAX_BATCH, MemoryIdAllocator, SqlIdAllocator};
pub use kit::Kit;
pub use traits::{Backend, FromEnv};
pub use txn::Txn;
