use crate::*;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Restricted storage for poll private keys.
///
/// Kept apart from the [`Store`] so that code that can read poll metadata cannot read private keys.
/// Only poll creation, deletion and the tally should be handed a vault.
pub trait KeyVault {
    /// Store the serialized private key for a poll, replacing any previous one
    fn write_private_key(&self, poll_id: PollId, key: &[u8]) -> Result<(), Error>;

    /// Read the serialized private key for a poll
    fn read_private_key(&self, poll_id: PollId) -> Result<Option<Vec<u8>>, Error>;

    /// Remove a poll's private key. Removing a missing key is not an error.
    fn delete_private_key(&self, poll_id: PollId) -> Result<(), Error>;
}

/// A vault that keeps keys in memory
#[derive(Default)]
pub struct MemKeyVault {
    inner: RwLock<HashMap<PollId, Vec<u8>>>,
}

impl KeyVault for MemKeyVault {
    fn write_private_key(&self, poll_id: PollId, key: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.insert(poll_id, key.to_vec());
        Ok(())
    }

    fn read_private_key(&self, poll_id: PollId) -> Result<Option<Vec<u8>>, Error> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.get(&poll_id).cloned())
    }

    fn delete_private_key(&self, poll_id: PollId) -> Result<(), Error> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.remove(&poll_id);
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::Store("key vault lock poisoned".to_owned())
}

/// A vault that keeps one file per poll in a directory.
///
/// On unix the directory is created `0700` and key files `0600`.
pub struct FileKeyVault {
    dir: PathBuf,
}

impl FileKeyVault {
    /// Open (creating if needed) a vault rooted at `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        restrict_permissions(&dir, 0o700)?;
        Ok(FileKeyVault { dir })
    }

    fn key_path(&self, poll_id: PollId) -> PathBuf {
        self.dir.join(format!("{}.key", poll_id))
    }
}

impl KeyVault for FileKeyVault {
    fn write_private_key(&self, poll_id: PollId, key: &[u8]) -> Result<(), Error> {
        let path = self.key_path(poll_id);
        let tmp = path.with_extension("key.tmp");

        let mut file = create_owner_only(&tmp)?;
        file.write_all(key)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        log::debug!("wrote private key for poll {} to {}", poll_id, path.display());
        Ok(())
    }

    fn read_private_key(&self, poll_id: PollId) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(self.key_path(poll_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_private_key(&self, poll_id: PollId) -> Result<(), Error> {
        match fs::remove_file(self.key_path(poll_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn create_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_vault<V: KeyVault>(vault: &V) {
        let poll_id = PollId::new();

        assert_eq!(vault.read_private_key(poll_id).unwrap(), None);

        vault.write_private_key(poll_id, b"17:19").unwrap();
        assert_eq!(
            vault.read_private_key(poll_id).unwrap(),
            Some(b"17:19".to_vec())
        );

        vault.write_private_key(poll_id, b"23:29").unwrap();
        assert_eq!(
            vault.read_private_key(poll_id).unwrap(),
            Some(b"23:29".to_vec())
        );

        vault.delete_private_key(poll_id).unwrap();
        assert_eq!(vault.read_private_key(poll_id).unwrap(), None);
        vault.delete_private_key(poll_id).unwrap();
    }

    #[test]
    fn test_mem_vault() {
        exercise_vault(&MemKeyVault::default());
    }

    #[test]
    fn test_file_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileKeyVault::open(dir.path().join("keys")).unwrap();
        exercise_vault(&vault);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_vault_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let vault = FileKeyVault::open(dir.path().join("keys")).unwrap();
        let poll_id = PollId::new();
        vault.write_private_key(poll_id, b"17:19").unwrap();

        let mode = fs::metadata(vault.key_path(poll_id))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
