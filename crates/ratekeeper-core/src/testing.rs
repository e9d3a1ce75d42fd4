//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::ports::CounterStore;

/// Map-backed store relying on the default `hit`. Expiry is recorded but
/// never enforced.
#[derive(Default)]
pub struct MapStore {
    data: Mutex<HashMap<String, (i64, Option<Duration>)>>,
}

#[async_trait]
impl CounterStore for MapStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.data.lock().unwrap().get(key).map(|(v, _)| *v))
    }

    async fn set(&self, key: &str, value: i64, expire: Option<Duration>) -> Result<(), StoreError> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, expire));
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut data = self.data.lock().unwrap();
        let entry = data.entry(key.to_string()).or_insert((0, None));
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut data = self.data.lock().unwrap();
        match data.get_mut(key) {
            Some(entry) => {
                entry.1 = Some(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        Ok(self.data.lock().unwrap().get(key).and_then(|(_, ttl)| *ttl))
    }
}
