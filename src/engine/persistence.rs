use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zeroize::Zeroizing;
use log::{info, warn};
use crate::engine::kdf::{self, DerivedKey, KdfParams, Salt, SALT_LENGTH};
use crate::engine::records::RecordSet;
use crate::engine::vault;
use crate::{Result, Error};

/// File name used when no path is configured.
pub const DEFAULT_FILE_NAME: &str = "agent_history.alog";

const MAGIC: &[u8; 4] = b"ALOG";
const FORMAT_VERSION: u8 = 1;
/// magic, version, three u32 KDF parameters, salt.
pub const HEADER_LENGTH: usize = 4 + 1 + 4 * 3 + SALT_LENGTH;

// Bounds applied to parameters read back from disk, so a damaged header
// cannot make key derivation allocate without limit.
const MAX_MEMORY_KIB: u32 = 1 << 20;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Unencrypted file header. Authenticated as associated data of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    params: KdfParams,
    salt: Salt,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut out = [0u8; HEADER_LENGTH];
        out[0..4].copy_from_slice(MAGIC);
        out[4] = FORMAT_VERSION;
        out[5..9].copy_from_slice(&self.params.memory_kib.to_le_bytes());
        out[9..13].copy_from_slice(&self.params.iterations.to_le_bytes());
        out[13..17].copy_from_slice(&self.params.parallelism.to_le_bytes());
        out[17..].copy_from_slice(&self.salt);
        out
    }

    /// Malformed headers are reported as [`Error::Unlock`]: a damaged file is
    /// not told apart from a wrong password.
    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LENGTH + vault::NONCE_LENGTH + vault::TAG_LENGTH {
            warn!("Log store file is too short");
            return Err(Error::Unlock);
        }
        if &bytes[0..4] != MAGIC || bytes[4] != FORMAT_VERSION {
            warn!("Log store file has an unknown header");
            return Err(Error::Unlock);
        }

        let read_u32 = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(b)
        };
        let params = KdfParams {
            memory_kib: read_u32(5),
            iterations: read_u32(9),
            parallelism: read_u32(13),
        };
        if params.memory_kib > MAX_MEMORY_KIB
            || params.memory_kib < 8 * params.parallelism.min(MAX_PARALLELISM)
            || params.iterations == 0
            || params.iterations > MAX_ITERATIONS
            || params.parallelism == 0
            || params.parallelism > MAX_PARALLELISM
        {
            warn!("Log store file has out-of-range key derivation parameters");
            return Err(Error::Unlock);
        }

        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&bytes[17..HEADER_LENGTH]);
        Ok(Self { params, salt })
    }
}

/// Everything needed to re-seal the store: the derived key and the header it
/// was derived under.
#[derive(Debug, Clone)]
pub struct StoreKey {
    key: DerivedKey,
    header: Header,
}

impl StoreKey {
    pub fn salt(&self) -> &Salt {
        &self.header.salt
    }

    pub fn params(&self) -> &KdfParams {
        &self.header.params
    }
}

/// The encrypted log file.
///
/// Layout: `header (33 bytes) || nonce (12) || ciphertext || tag (16)`.
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader sees either the previous file or the new one.
#[derive(Debug, Clone)]
pub struct EncryptedStore {
    path: PathBuf,
    params: KdfParams,
}

impl EncryptedStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_kdf_params(path, KdfParams::default())
    }

    /// Uses `params` when a new store has to be created. Existing stores always
    /// use the parameters recorded in their header.
    pub fn with_kdf_params<P: AsRef<Path>>(path: P, params: KdfParams) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            params,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Derives the key and decrypts the store, creating an empty one (with a
    /// fresh salt, persisted immediately) when no file exists yet.
    pub fn open_or_create(&self, password: &str) -> Result<(StoreKey, RecordSet)> {
        match fs::read(&self.path) {
            Ok(bytes) => self.open_existing(password, &bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => self.create(password),
            Err(e) => Err(e.into()),
        }
    }

    /// Serializes, seals under a fresh nonce and atomically replaces the file.
    pub fn persist(&self, key: &StoreKey, records: &RecordSet) -> Result<()> {
        let staged = self.stage(key, records)?;
        self.commit(staged)
    }

    fn create(&self, password: &str) -> Result<(StoreKey, RecordSet)> {
        let header = Header {
            params: self.params,
            salt: kdf::generate_salt(),
        };
        let key = StoreKey {
            key: kdf::derive_key(password, &header.salt, &header.params)?,
            header,
        };
        let records = RecordSet::new();

        let dir = self.dir();
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        self.persist(&key, &records)?;
        info!("Created new log store at {:?}", self.path);

        Ok((key, records))
    }

    fn open_existing(&self, password: &str, bytes: &[u8]) -> Result<(StoreKey, RecordSet)> {
        let header = Header::decode(bytes)?;
        let key = kdf::derive_key(password, &header.salt, &header.params).map_err(|e| match e {
            Error::Crypto(msg) => {
                warn!("Key derivation rejected the stored parameters: {}", msg);
                Error::Unlock
            }
            other => other,
        })?;
        let (aad, sealed) = bytes.split_at(HEADER_LENGTH);
        let plaintext = Zeroizing::new(vault::open(sealed, aad, &key)?);

        let mut records: RecordSet = serde_json::from_slice(&plaintext).map_err(|e| {
            warn!("Log store decrypted but its payload is unreadable: {}", e);
            Error::Unlock
        })?;
        records.normalize();

        Ok((StoreKey { key, header }, records))
    }

    /// Writes the sealed store to a synced temporary file next to the target.
    /// Dropping the result without [`commit`](Self::commit) discards it.
    fn stage(&self, key: &StoreKey, records: &RecordSet) -> Result<NamedTempFile> {
        let plaintext = Zeroizing::new(serde_json::to_vec(records)?);
        let header = key.header.encode();
        let sealed = vault::seal(&plaintext, &header, &key.key)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".agentlog")
            .suffix(".tmp")
            .tempfile_in(self.dir())?;
        tmp.write_all(&header)?;
        tmp.write_all(&sealed)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn commit(&self, staged: NamedTempFile) -> Result<()> {
        staged.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        // Make the rename itself durable where the platform allows syncing a directory.
        if let Ok(dir) = fs::File::open(self.dir()) {
            if let Err(e) = dir.sync_all() {
                warn!("Could not sync directory of {:?} after rename: {}", self.path, e);
            }
        }
        Ok(())
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::kdf::test_params;
    use crate::engine::records::{EventType, Meta};
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> EncryptedStore {
        EncryptedStore::with_kdf_params(dir.join(DEFAULT_FILE_NAME), test_params())
    }

    #[test]
    fn test_create_then_reopen() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.exists());

        let (key, mut records) = store.open_or_create("hunter2").unwrap();
        assert!(records.is_empty());
        assert!(store.exists());

        records.append(EventType::EmailSummary, Meta::new(), "subj A");
        store.persist(&key, &records).unwrap();

        let (_, reopened) = store.open_or_create("hunter2").unwrap();
        assert_eq!(reopened, records);
    }

    #[test]
    fn test_wrong_password_fails() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.open_or_create("hunter2").unwrap();
        assert!(matches!(store.open_or_create("wrong"), Err(Error::Unlock)));
    }

    #[test]
    fn test_salt_survives_persists() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (key, mut records) = store.open_or_create("hunter2").unwrap();
        let salt = *key.salt();

        records.append(EventType::Other, Meta::new(), "x");
        store.persist(&key, &records).unwrap();

        let (key2, _) = store.open_or_create("hunter2").unwrap();
        assert_eq!(key2.salt(), &salt);
        assert_eq!(key2.params(), &test_params());
    }

    #[test]
    fn test_file_holds_no_plaintext_and_fresh_nonce() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (key, mut records) = store.open_or_create("hunter2").unwrap();
        records.append(EventType::Other, Meta::new(), "very secret preview");

        store.persist(&key, &records).unwrap();
        let first = fs::read(store.path()).unwrap();
        store.persist(&key, &records).unwrap();
        let second = fs::read(store.path()).unwrap();

        let needle = b"very secret preview";
        assert!(!first.windows(needle.len()).any(|w| w == needle));
        assert_eq!(first[..HEADER_LENGTH], second[..HEADER_LENGTH]);
        assert_ne!(first[HEADER_LENGTH..], second[HEADER_LENGTH..]);
    }

    #[test]
    fn test_tampered_file_fails() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.open_or_create("hunter2").unwrap();

        let original = fs::read(store.path()).unwrap();

        // flip a ciphertext byte
        let mut bytes = original.clone();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));

        // flip a salt byte (authenticated as associated data)
        let mut bytes = original.clone();
        bytes[20] ^= 0x01;
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));

        // truncate
        fs::write(store.path(), &original[..HEADER_LENGTH + 4]).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));

        // garbage magic
        fs::write(store.path(), vec![0u8; 128]).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));
    }

    #[test]
    fn test_damaged_params_rejected_before_derivation() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.open_or_create("hunter2").unwrap();
        let original = fs::read(store.path()).unwrap();

        // memory cost below argon2's minimum
        let mut bytes = original.clone();
        bytes[5..9].copy_from_slice(&0u32.to_le_bytes());
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));
        fs::write(store.path(), &original).unwrap();

        let mut bytes = fs::read(store.path()).unwrap();
        bytes[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));
    }

    #[test]
    fn test_in_range_param_change_fails_authentication() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.open_or_create("hunter2").unwrap();

        // iterations 1 -> 2 passes the bounds check but not the header authentication
        let mut bytes = fs::read(store.path()).unwrap();
        bytes[9..13].copy_from_slice(&2u32.to_le_bytes());
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));

        // memory 1024 -> 2048 KiB, likewise
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.open_or_create("hunter2").unwrap();
        let mut bytes = fs::read(store.path()).unwrap();
        bytes[5..9].copy_from_slice(&2048u32.to_le_bytes());
        fs::write(store.path(), &bytes).unwrap();
        assert!(matches!(store.open_or_create("hunter2"), Err(Error::Unlock)));
    }

    #[test]
    fn test_interrupted_persist_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (key, mut records) = store.open_or_create("hunter2").unwrap();
        records.append(EventType::EmailSummary, Meta::new(), "committed");
        store.persist(&key, &records).unwrap();

        let mut pending = records.clone();
        pending.append(EventType::Other, Meta::new(), "never committed");
        let staged = store.stage(&key, &pending).unwrap();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());
        // crash before the rename
        drop(staged);
        assert!(!staged_path.exists());

        let (_, loaded) = store.open_or_create("hunter2").unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_stray_temp_file_is_ignored() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (key, mut records) = store.open_or_create("hunter2").unwrap();
        records.append(EventType::Other, Meta::new(), "kept");
        store.persist(&key, &records).unwrap();

        fs::write(dir.path().join(".agentlog-half.tmp"), b"ALOG\x01partial").unwrap();

        let (_, loaded) = store.open_or_create("hunter2").unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let (key, records) = store.open_or_create("hunter2").unwrap();
        store.persist(&key, &records).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![DEFAULT_FILE_NAME.to_string()]);
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let dir = tempdir().unwrap();
        let store = EncryptedStore::with_kdf_params(dir.path().join("a/b/log.alog"), test_params());
        store.open_or_create("hunter2").unwrap();
        assert!(store.exists());
    }
}
