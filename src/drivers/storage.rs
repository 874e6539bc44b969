// Settings and retry count on internal flash
//
// sequential-storage map over the last 64 KiB of the 4 MiB flash. Each
// store appends a new record for its key; garbage collection happens
// inside the map when a page fills. Reads go through a scratch buffer
// sized for the largest settings record.

use embassy_embedded_hal::adapter::BlockingAsync;
use esp_storage::FlashStorage;
use inkframe_kernel::config::RECORD_CAP;
use inkframe_kernel::storage::{Key, Storage, StorageError};
use log::warn;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{self, SerializationError};

use crate::board::pins::SETTINGS_RANGE;

// record plus item header and word alignment
const SCRATCH_LEN: usize = RECORD_CAP + 64;

/// `Key` as a one-byte map key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FlashKey(Key);

impl map::Key for FlashKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let slot = buffer.first_mut().ok_or(SerializationError::BufferTooSmall)?;
        *slot = self.0 as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
        let raw = *buffer.first().ok_or(SerializationError::BufferTooSmall)?;
        Key::from_u8(raw)
            .map(|k| (FlashKey(k), 1))
            .ok_or(SerializationError::InvalidFormat)
    }
}

pub struct FlashStore {
    flash: BlockingAsync<FlashStorage<'static>>,
    scratch: [u8; SCRATCH_LEN],
}

impl FlashStore {
    pub fn new(flash: FlashStorage<'static>) -> Self {
        Self {
            flash: BlockingAsync::new(flash),
            scratch: [0u8; SCRATCH_LEN],
        }
    }
}

fn map_err<E: core::fmt::Debug>(e: sequential_storage::Error<E>) -> StorageError {
    match e {
        sequential_storage::Error::FullStorage => StorageError::Full,
        sequential_storage::Error::Corrupted { .. } => StorageError::Corrupted,
        other => {
            warn!("flash: {:?}", other);
            StorageError::Flash
        }
    }
}

impl Storage for FlashStore {
    async fn load(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        let item = map::fetch_item::<FlashKey, &[u8], _>(
            &mut self.flash,
            SETTINGS_RANGE,
            &mut NoCache::new(),
            &mut self.scratch,
            &FlashKey(key),
        )
        .await
        .map_err(map_err)?;

        match item {
            Some(data) if data.len() > buf.len() => Err(StorageError::BufferTooSmall),
            Some(data) => {
                buf[..data.len()].copy_from_slice(data);
                Ok(Some(data.len()))
            }
            None => Ok(None),
        }
    }

    async fn store(&mut self, key: Key, data: &[u8]) -> Result<(), StorageError> {
        map::store_item(
            &mut self.flash,
            SETTINGS_RANGE,
            &mut NoCache::new(),
            &mut self.scratch,
            &FlashKey(key),
            &data,
        )
        .await
        .map_err(map_err)
    }
}
