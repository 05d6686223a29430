//! Named cache stores.
//!
//! One store exists per cache generation. Stores are only created and
//! deleted by the lifecycle controller; deleting a store cascades to every
//! entry it owns.

use super::connection::CacheDb;
use super::entries::CacheStore;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Open the store with the given name, creating it if it doesn't exist.
    pub async fn open_store(&self, name: &str) -> Result<CacheStore, Error> {
        let store_name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_stores (name, created_at) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING",
                    params![store_name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheStore::new(self.clone(), name))
    }

    /// Handle on an existing store, or `None` if there is no store with that name.
    ///
    /// Never creates a store.
    pub async fn store(&self, name: &str) -> Result<Option<CacheStore>, Error> {
        if self.has_store(name).await? { Ok(Some(CacheStore::new(self.clone(), name))) } else { Ok(None) }
    }

    /// Names of every existing store, in creation order.
    pub async fn store_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Check whether a store with the given name exists.
    pub async fn has_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all of its entries.
    ///
    /// Returns false if no store with that name existed.
    pub async fn delete_store(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_stores WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;

    #[tokio::test]
    async fn test_open_store_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("offgrid-cache-v1").await.unwrap();
        db.open_store("offgrid-cache-v1").await.unwrap();

        assert_eq!(db.store_names().await.unwrap(), vec!["offgrid-cache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_store_names_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("offgrid-cache-v1").await.unwrap();
        db.open_store("offgrid-cache-v2").await.unwrap();
        db.open_store("other-app").await.unwrap();

        let names = db.store_names().await.unwrap();
        assert_eq!(names, vec!["offgrid-cache-v1", "offgrid-cache-v2", "other-app"]);
    }

    #[tokio::test]
    async fn test_delete_store_cascades_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();
        store
            .put(&CacheEntry::new("GET", "http://localhost/app.js", 200, Vec::new(), b"js".to_vec()))
            .await
            .unwrap();

        assert!(db.delete_store("offgrid-cache-v1").await.unwrap());
        assert!(!db.has_store("offgrid-cache-v1").await.unwrap());

        let orphans: i64 = db
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_store_lookup_does_not_create() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.store("offgrid-cache-v1").await.unwrap().is_none());
        assert!(db.store_names().await.unwrap().is_empty());

        db.open_store("offgrid-cache-v1").await.unwrap();
        let store = db.store("offgrid-cache-v1").await.unwrap().unwrap();
        assert_eq!(store.name(), "offgrid-cache-v1");
    }

    #[tokio::test]
    async fn test_delete_missing_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(!db.delete_store("nope").await.unwrap());
    }
}
