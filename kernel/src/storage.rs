// Durable key/value records
//
// Two keys: the versioned settings record and the retry count. Each
// `store` is a single last-write-wins commit. The firmware backs this
// with a sequential-storage map on the internal flash.

use log::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Key {
    Settings = 0,
    RetryCount = 1,
}

impl Key {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Settings),
            1 => Some(Self::RetryCount),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying flash read/write/erase failed.
    Flash,
    /// Stored value is larger than the caller's buffer.
    BufferTooSmall,
    /// No room left even after garbage collection.
    Full,
    /// Record framing failed its checks.
    Corrupted,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Flash => write!(f, "flash access failed"),
            Self::BufferTooSmall => write!(f, "record larger than buffer"),
            Self::Full => write!(f, "storage full"),
            Self::Corrupted => write!(f, "storage corrupted"),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Storage {
    /// Copies the record for `key` into `buf`; `Ok(None)` if absent.
    async fn load(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, StorageError>;

    async fn store(&mut self, key: Key, data: &[u8]) -> Result<(), StorageError>;
}

/// Persisted failure count; missing or unreadable reads as zero.
pub async fn load_retry_count<S: Storage>(storage: &mut S) -> u8 {
    let mut buf = [0u8; 1];
    match storage.load(Key::RetryCount, &mut buf).await {
        Ok(Some(1)) => buf[0],
        Ok(_) => 0,
        Err(e) => {
            warn!("storage: retry count unreadable: {}", e);
            0
        }
    }
}

pub async fn store_retry_count<S: Storage>(storage: &mut S, count: u8) -> Result<(), StorageError> {
    storage.store(Key::RetryCount, &[count]).await
}
