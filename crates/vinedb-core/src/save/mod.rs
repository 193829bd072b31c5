mod executor;

#[cfg(test)]
mod tests;

pub use executor::SaveExecutor;

use crate::{
    backend::FileRef,
    entity::{DataSet, NodeEntity, Operate},
    error::SaveError,
};

///
/// SaveOptions
///
/// Per-batch settings: a fallback verb for entities that carry none,
/// and the file array binary properties index into.
///

#[derive(Debug, Default)]
pub struct SaveOptions {
    pub default_operate: Option<Operate>,
    pub files: Vec<FileRef>,
}

impl SaveOptions {
    #[must_use]
    pub fn with_default(verb: Operate) -> Self {
        Self {
            default_operate: Some(verb),
            ..Self::default()
        }
    }
}

///
/// SaveResult
///
/// The synced batch handed back to the caller: ids rewritten to their
/// persisted form, transient properties stripped, deleted entities
/// tagged, plus mutation counts.
///

#[derive(Debug, Default)]
pub struct SaveResult {
    pub data: DataSet,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
}

///
/// ChangeListener
///
/// Lifecycle hooks around node persistence. Every method defaults to a
/// no-op; a returned error aborts the batch, it is never swallowed.
///

#[allow(unused_variables)]
pub trait ChangeListener {
    fn on_save(&mut self, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_create(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_created(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_update(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_updated(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_delete(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_deleted(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }

    fn on_query(&mut self, node: &NodeEntity, data: &DataSet) -> Result<(), SaveError> {
        Ok(())
    }
}
