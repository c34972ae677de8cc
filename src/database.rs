use crate::error::SiteError;
use actix_session::Session;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};

/// String-keyed slots, each holding one serialized record or collection.
pub trait SlotStore {
    fn read_slot<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>, SiteError>;
    fn write_slot<T: Serialize>(&self, slot: &str, value: &T) -> Result<(), SiteError>;
    fn remove_slot(&self, slot: &str) -> Result<(), SiteError>;
}

/// Read-modify-write of a single slot that cannot lose concurrent updates.
pub trait SlotUpdate {
    fn update_slot<T, R, F>(&self, slot: &str, f: F) -> Result<R, SiteError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: Fn(&mut T) -> Result<R, SiteError>;
}

impl SlotStore for sled::Tree {
    fn read_slot<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>, SiteError> {
        match self.get(slot)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_slot<T: Serialize>(&self, slot: &str, value: &T) -> Result<(), SiteError> {
        self.insert(slot, bincode::serialize(value)?)?;
        Ok(())
    }

    fn remove_slot(&self, slot: &str) -> Result<(), SiteError> {
        self.remove(slot)?;
        Ok(())
    }
}

fn abort<E: Into<SiteError>>(err: E) -> ConflictableTransactionError<SiteError> {
    ConflictableTransactionError::Abort(err.into())
}

impl SlotUpdate for sled::Tree {
    fn update_slot<T, R, F>(&self, slot: &str, f: F) -> Result<R, SiteError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: Fn(&mut T) -> Result<R, SiteError>,
    {
        // sled retries the closure when another writer touched the slot
        let result = self.transaction(|tree| {
            let mut value: T = match tree.get(slot)? {
                Some(bytes) => bincode::deserialize(&bytes).map_err(abort)?,
                None => T::default(),
            };
            let out = f(&mut value).map_err(ConflictableTransactionError::Abort)?;
            tree.insert(slot, bincode::serialize(&value).map_err(abort)?)?;
            Ok(out)
        });
        match result {
            Ok(out) => Ok(out),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl SlotStore for Session {
    fn read_slot<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>, SiteError> {
        self.get(slot)
            .map_err(|err| SiteError::Storage(err.to_string()))
    }

    fn write_slot<T: Serialize>(&self, slot: &str, value: &T) -> Result<(), SiteError> {
        self.insert(slot, value)
            .map_err(|err| SiteError::Storage(err.to_string()))
    }

    fn remove_slot(&self, slot: &str) -> Result<(), SiteError> {
        self.remove(slot);
        Ok(())
    }
}

#[cfg(test)]
pub fn temporary_tree() -> sled::Tree {
    temporary_db().open_tree("test").unwrap()
}

#[cfg(test)]
pub fn temporary_db() -> sled::Db {
    sled::Config::new().temporary(true).open().unwrap()
}
