//! Cache entry operations on a single store.
//!
//! Every entry is keyed by request identity (method + URL). Writes are
//! single-key overwrites; `put_all` is the only multi-key write and runs in
//! one transaction.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response snapshot together with the request identity it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Header values are raw bytes; HTTP allows values that are not UTF-8.
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        method: impl Into<String>, url: impl Into<String>, status: u16, headers: Vec<(String, Vec<u8>)>, body: Vec<u8>,
    ) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status,
            headers,
            body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn key(&self) -> String {
        compute_cache_key(&self.method, &self.url)
    }
}

/// Handle on one named store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

fn ensure_store(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cache_stores WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )?;
    if exists { Ok(()) } else { Err(Error::UnknownStore(name.to_string())) }
}

fn ensure_get(entry: &CacheEntry) -> Result<(), Error> {
    if entry.method.eq_ignore_ascii_case("GET") {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("only GET requests can be cached, got {} {}", entry.method, entry.url)))
    }
}

fn insert(conn: &rusqlite::Connection, store: &str, entry: &CacheEntry) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)
        .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;
    conn.execute(
        "INSERT INTO cache_entries (store_name, key_hash, method, url, status, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(store_name, key_hash) DO UPDATE SET
             method = excluded.method,
             url = excluded.url,
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             stored_at = excluded.stored_at",
        params![
            store,
            entry.key(),
            entry.method.to_ascii_uppercase(),
            &entry.url,
            entry.status,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

impl CacheStore {
    pub(crate) fn new(db: CacheDb, name: &str) -> Self {
        Self { db, name: name.to_string() }
    }

    /// Name of this store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the entry for a request identity.
    ///
    /// A miss is `Ok(None)`, never an error.
    pub async fn get(&self, method: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let store = self.name.clone();
        let key = compute_cache_key(method, url);
        self.db
            .conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, headers_json, body, stored_at
                     FROM cache_entries WHERE store_name = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![store, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                match result {
                    Ok((method, url, status, headers_json, body, stored_at)) => {
                        let headers = serde_json::from_str(&headers_json).unwrap_or_else(|e| {
                            tracing::warn!(%url, error = %e, "dropping unreadable cached headers");
                            Vec::new()
                        });
                        Ok(Some(CacheEntry { method, url, status, headers, body, stored_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite one entry.
    ///
    /// Rejects non-GET entries and stores that have been deleted.
    pub async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
        ensure_get(entry)?;
        let store = self.name.clone();
        let entry = entry.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                ensure_store(conn, &store)?;
                insert(conn, &store, &entry)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite a batch of entries atomically.
    ///
    /// Either every entry is written or none is.
    pub async fn put_all(&self, entries: Vec<CacheEntry>) -> Result<usize, Error> {
        for entry in &entries {
            ensure_get(entry)?;
        }
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                ensure_store(&tx, &store)?;
                for entry in &entries {
                    insert(&tx, &store, entry)?;
                }
                tx.commit()?;
                Ok(entries.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this store.
    pub async fn entry_count(&self) -> Result<u64, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?1",
                    params![store],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs cached in this store, sorted.
    pub async fn urls(&self) -> Result<Vec<String>, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE store_name = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![store], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry::new(
            "GET",
            url,
            200,
            vec![("content-type".to_string(), b"text/css".to_vec())],
            body.as_bytes().to_vec(),
        )
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();
        let stored = entry("http://localhost/style.css", "body{}");

        store.put(&stored).await.unwrap();

        let retrieved = store.get("GET", "http://localhost/style.css").await.unwrap().unwrap();
        assert_eq!(retrieved, stored);
    }

    #[tokio::test]
    async fn test_opaque_header_bytes_preserved() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();
        let headers = vec![("x-legacy".to_string(), vec![b'a', 0xfe, 0x80])];
        let stored = CacheEntry::new("GET", "http://localhost/legacy", 200, headers, b"ok".to_vec());

        store.put(&stored).await.unwrap();

        let retrieved = store.get("GET", "http://localhost/legacy").await.unwrap().unwrap();
        assert_eq!(retrieved.headers, vec![("x-legacy".to_string(), vec![b'a', 0xfe, 0x80])]);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();
        assert!(store.get("GET", "http://localhost/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();

        store.put(&entry("http://localhost/api/items", "[1]")).await.unwrap();
        store.put(&entry("http://localhost/api/items", "[1,2]")).await.unwrap();

        let retrieved = store.get("GET", "http://localhost/api/items").await.unwrap().unwrap();
        assert_eq!(retrieved.body, b"[1,2]");
        assert_eq!(store.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();
        let post = CacheEntry::new("POST", "http://localhost/api/items", 200, Vec::new(), Vec::new());

        let result = store.put(&post).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open_store("offgrid-cache-v1").await.unwrap();
        let v2 = db.open_store("offgrid-cache-v2").await.unwrap();

        v1.put(&entry("http://localhost/app.js", "old")).await.unwrap();

        assert!(v2.get("GET", "http://localhost/app.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_into_deleted_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();
        db.delete_store("offgrid-cache-v1").await.unwrap();

        let result = store.put(&entry("http://localhost/app.js", "x")).await;
        assert!(matches!(result, Err(Error::UnknownStore(name)) if name == "offgrid-cache-v1"));
    }

    #[tokio::test]
    async fn test_put_all_is_atomic() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_store("offgrid-cache-v1").await.unwrap();

        let written = store
            .put_all(vec![entry("http://localhost/", "<html>"), entry("http://localhost/index.html", "<html>")])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let mixed = vec![
            entry("http://localhost/manifest.json", "{}"),
            CacheEntry::new("PUT", "http://localhost/upload", 200, Vec::new(), Vec::new()),
        ];
        assert!(store.put_all(mixed).await.is_err());

        assert_eq!(store.entry_count().await.unwrap(), 2);
        assert_eq!(store.urls().await.unwrap(), vec!["http://localhost/", "http://localhost/index.html"]);
    }
}
