//! Per-type parameter tables mirrored to device memory
//!
//! The host copy is the source of truth. Every `set` marks the table dirty;
//! computes call [`ParamTable::take_dirty`] right before a launch and upload
//! the returned records, so a launch never reads a stale record.

use crate::ComputeError;

#[derive(Debug, Clone)]
pub struct ParamTable<T> {
    records: Vec<T>,
    dirty: bool,
}

impl<T: Clone + Default> ParamTable<T> {
    /// One default record per type, dirty so the first launch uploads it
    pub fn new(n_types: u32) -> Self {
        Self {
            records: vec![T::default(); n_types as usize],
            dirty: true,
        }
    }
}

impl<T> ParamTable<T> {
    pub fn n_types(&self) -> u32 {
        self.records.len() as u32
    }

    fn check(&self, type_id: u32) -> Result<usize, ComputeError> {
        if type_id < self.n_types() {
            Ok(type_id as usize)
        } else {
            Err(ComputeError::TypeOutOfRange {
                type_id,
                n_types: self.n_types(),
            })
        }
    }

    pub fn get(&self, type_id: u32) -> Result<&T, ComputeError> {
        let index = self.check(type_id)?;
        Ok(&self.records[index])
    }

    /// Replace the whole record for `type_id`
    pub fn set(&mut self, type_id: u32, record: T) -> Result<(), ComputeError> {
        let index = self.check(type_id)?;
        self.records[index] = record;
        self.dirty = true;
        Ok(())
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Records to publish, if anything changed since the last call
    pub fn take_dirty(&mut self) -> Option<&[T]> {
        if self.dirty {
            self.dirty = false;
            Some(&self.records)
        } else {
            None
        }
    }
}
