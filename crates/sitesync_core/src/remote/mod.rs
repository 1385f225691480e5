//! Remote store access.
//!
//! The site's content lives remotely as a single row
//! ([`RemoteRecord`]) in a managed table. [`RemoteTable`] abstracts the
//! table so the same client works against PostgREST in production,
//! SQLite for self-hosting, and memory in tests. [`RemoteStoreClient`]
//! adds the local backup and the fallback rules on top.

mod client;
#[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
mod postgrest;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite_table;
mod table;

pub use client::{
    LoadSource, LoadedContent, LocalBackupRecord, RemoteConnector, RemoteStoreClient,
    RemoteWriteStatus,
};
#[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
pub use postgrest::PostgrestTable;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite_table::SqliteTable;
pub use table::{CachePolicy, MAIN_RECORD_ID, MemoryTable, RemoteRecord, RemoteTable};

use url::Url;

/// Copy of `url` with `param` set to the current time in milliseconds.
///
/// Any previous value of `param` is replaced.
pub fn cache_busted(url: &Url, param: &str) -> Url {
    let mut busted = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = busted.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(param, &chrono::Utc::now().timestamp_millis().to_string());
    }
    busted
}
