//! # GrowLab Storage
//!
//! Key-addressed record stores with atomic per-key read-modify-write, plus
//! snapshot persistence to a single file.
//!
//! ## Storage Layout
//!
//! - `record_db` - generic keyed store guarding every mutation with a write lock
//! - `snapshot_db` - bincode snapshot of accounts and payments, written atomically
//!
//! Flush cadence (on every write, periodically, on shutdown) is decided by
//! the owner of a [`LabStorage`].
//!
//! A file-backed [`LabStorage`] holds an exclusive lock on a sibling `.lock` file for
//! its whole lifetime, so only one process at a time loads and rewrites a
//! snapshot.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use growlab_core::{Account, AccountId, PaymentRecord, TxReference};
use parking_lot::Mutex;
use thiserror::Error;

pub mod record_db {
    //! Generic keyed record store

    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::hash::Hash;

    /// In-memory keyed store.
    ///
    /// Every mutation holds the write lock for its full duration, so a
    /// read-modify-write on one key never interleaves with another writer.
    pub struct RecordStore<K, V> {
        data: RwLock<HashMap<K, V>>,
    }

    impl<K, V> RecordStore<K, V>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        pub fn new() -> Self {
            Self {
                data: RwLock::new(HashMap::new()),
            }
        }

        /// Build a store from existing records
        pub fn from_records(records: impl IntoIterator<Item = (K, V)>) -> Self {
            Self {
                data: RwLock::new(records.into_iter().collect()),
            }
        }

        pub fn get(&self, key: &K) -> Option<V> {
            self.data.read().get(key).cloned()
        }

        pub fn contains(&self, key: &K) -> bool {
            self.data.read().contains_key(key)
        }

        /// Insert unless the key is present. Returns the stored value and
        /// whether it was newly inserted.
        pub fn insert_if_absent(&self, key: K, value: V) -> (V, bool) {
            let mut data = self.data.write();
            if let Some(existing) = data.get(&key) {
                return (existing.clone(), false);
            }
            data.insert(key, value.clone());
            (value, true)
        }

        /// Atomic read-modify-write of one record. `None` if the key is absent.
        pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
            let mut data = self.data.write();
            data.get_mut(key).map(f)
        }

        /// Run `f` over every record while holding the read lock
        pub fn read<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
            f(&self.data.read())
        }

        /// Consistent copy of every record
        pub fn values(&self) -> Vec<V> {
            self.data.read().values().cloned().collect()
        }

        pub fn len(&self) -> usize {
            self.data.read().len()
        }

        pub fn is_empty(&self) -> bool {
            self.data.read().is_empty()
        }
    }

    impl<K, V> Default for RecordStore<K, V>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        fn default() -> Self {
            Self::new()
        }
    }
}

pub mod snapshot_db {
    //! Snapshot file format

    use growlab_core::{Account, PaymentRecord};
    use serde::{Deserialize, Serialize};

    /// Current snapshot format version
    pub const SNAPSHOT_VERSION: u32 = 2;

    /// Everything persisted by a lab
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Snapshot {
        pub version: u32,
        pub accounts: Vec<Account>,
        pub payments: Vec<PaymentRecord>,
    }
}

pub use record_db::RecordStore;
pub use snapshot_db::{Snapshot, SNAPSHOT_VERSION};

/// Account store keyed by identity
pub type AccountStore = RecordStore<AccountId, Account>;

/// Payment store keyed by transaction reference
pub type PaymentStore = RecordStore<TxReference, PaymentRecord>;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("Storage {path} is locked by another process")]
    Locked { path: PathBuf },
}

/// Accounts and payments, optionally backed by a snapshot file
pub struct LabStorage {
    accounts: AccountStore,
    payments: PaymentStore,
    path: Option<PathBuf>,
    flush_lock: Mutex<()>,
    _lock_file: Option<File>,
}

impl LabStorage {
    /// Purely in-memory storage
    pub fn in_memory() -> Self {
        Self {
            accounts: AccountStore::new(),
            payments: PaymentStore::new(),
            path: None,
            flush_lock: Mutex::new(()),
            _lock_file: None,
        }
    }

    /// Open storage backed by `path`, loading the snapshot if the file exists.
    ///
    /// Fails with [`StorageError::Locked`] while another `LabStorage` holds
    /// the same path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let lock_file = Self::acquire_lock(&path)?;
        let snapshot = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            let snapshot: Snapshot = bincode::deserialize(&bytes)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StorageError::Version {
                    found: snapshot.version,
                    expected: SNAPSHOT_VERSION,
                });
            }
            snapshot
        } else {
            Snapshot::default()
        };

        tracing::info!(
            path = %path.display(),
            accounts = snapshot.accounts.len(),
            payments = snapshot.payments.len(),
            "Storage opened"
        );

        Ok(Self {
            accounts: AccountStore::from_records(
                snapshot.accounts.into_iter().map(|a| (a.id.clone(), a)),
            ),
            payments: PaymentStore::from_records(
                snapshot.payments.into_iter().map(|p| (p.reference.clone(), p)),
            ),
            path: Some(path),
            flush_lock: Mutex::new(()),
            _lock_file: Some(lock_file),
        })
    }

    fn acquire_lock(path: &Path) -> Result<File, StorageError> {
        let lock_path = path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| StorageError::Io {
                path: lock_path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                tracing::warn!(path = %lock_path.display(), "Storage already locked");
                Err(StorageError::Locked { path: path.to_path_buf() })
            }
            Err(source) => Err(StorageError::Io {
                path: lock_path,
                source,
            }),
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn payments(&self) -> &PaymentStore {
        &self.payments
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current state.
    ///
    /// Payments are read under the accounts read lock, so a payment change
    /// made inside an account update lands in the same snapshot as that update.
    pub fn snapshot(&self) -> Snapshot {
        self.accounts.read(|accounts| Snapshot {
            version: SNAPSHOT_VERSION,
            accounts: accounts.values().cloned().collect(),
            payments: self.payments.values(),
        })
    }

    /// Write the snapshot file (no-op for in-memory storage).
    ///
    /// The file is replaced atomically: written to a sibling temp file, then renamed.
    /// Snapshots are small and written synchronously, also from async callers.
    pub fn flush(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock();

        let bytes = bincode::serialize(&self.snapshot())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Snapshot flushed");
        Ok(())
    }
}

impl Default for LabStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}
