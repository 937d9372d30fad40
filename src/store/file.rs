//! Filesystem-backed persistence
//!
//! True persistence across client failure, designed around a single
//! directory per running client instance. Each key maps to one `<key>.msg`
//! file holding the wire encoding of the stored packet. Writes go through a
//! `<key>.tmp` file and an atomic rename, so a crash mid-write never leaves
//! a half-written message visible. Unreadable files are quarantined as
//! `<key>.CORRUPT` so corruption can never block session recovery.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use super::Store;
use crate::codec;
use crate::protocol::Packet;

const MSG_EXT: &str = ".msg";
const TMP_EXT: &str = ".tmp";
const CORRUPT_EXT: &str = ".CORRUPT";

/// Filesystem-backed store.
///
/// Multiple clients on the same filesystem need distinct directories.
pub struct FileStore {
    directory: PathBuf,
    opened: RwLock<bool>,
}

impl FileStore {
    /// A new, unopened store persisting into the given directory. An empty
    /// path means the current working directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let mut directory = directory.into();
        if directory.as_os_str().is_empty() {
            directory = PathBuf::from(".");
        }
        Self {
            directory,
            opened: RwLock::new(false),
        }
    }

    fn msg_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}{}", key, MSG_EXT))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}{}", key, TMP_EXT))
    }

    fn corrupt_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}{}", key, CORRUPT_EXT))
    }

    fn ensure_directory(&self) -> io::Result<()> {
        if self.directory.is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.directory)
    }

    /// Scan the directory for message files, ordered by modification time
    /// ascending so retransmission replays in original send order. Callers
    /// hold the lock.
    fn scan_keys(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                error!(directory = %self.directory.display(), error = %e, "failed to read store directory");
                return Vec::new();
            }
        };

        let mut stamped: Vec<(SystemTime, String)> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(key) = name.strip_suffix(MSG_EXT) else {
                debug!(name, "skipping file without message extension");
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(UNIX_EPOCH);
            stamped.push((modified, key.to_owned()));
        }

        stamped.sort();
        stamped.into_iter().map(|(_, key)| key).collect()
    }

    /// Remove one message file. Callers hold the write lock.
    fn remove_key(&self, key: &str) {
        let path = self.msg_path(key);
        if !path.exists() {
            info!(key, "no message file to delete");
            return;
        }
        if let Err(e) = fs::remove_file(&path) {
            error!(path = %path.display(), error = %e, "failed to delete message file");
        } else {
            debug!(key, "message file deleted");
        }
    }
}

impl Store for FileStore {
    fn open(&self) {
        let mut opened = self.opened.write();
        if let Err(e) = self.ensure_directory() {
            error!(directory = %self.directory.display(), error = %e, "failed to create store directory");
            return;
        }
        *opened = true;
        debug!(directory = %self.directory.display(), "file store opened");
    }

    fn put(&self, key: &str, packet: Packet) {
        let opened = self.opened.write();
        if !*opened {
            error!("file store used before open");
            return;
        }

        let mut buf = BytesMut::new();
        if let Err(e) = codec::encode(&packet, &mut buf) {
            error!(key, error = %e, "failed to encode message for store");
            return;
        }

        // Write to a temporary file first, then rename over the target:
        // a crash mid-write must never leave a torn .msg file visible.
        let tmp = self.tmp_path(key);
        let dst = self.msg_path(key);
        let result = fs::write(&tmp, &buf).and_then(|_| fs::rename(&tmp, &dst));
        if let Err(e) = result {
            error!(key, error = %e, "failed to write message file");
            return;
        }
        if !dst.exists() {
            error!(path = %dst.display(), "message file not created");
        }
    }

    fn get(&self, key: &str) -> Option<Packet> {
        let opened = self.opened.read();
        if !*opened {
            error!("file store used before open");
            return None;
        }

        let path = self.msg_path(key);
        if !path.exists() {
            return None;
        }

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read message file");
                return None;
            }
        };

        match codec::read_packet(&mut data.as_slice()) {
            Ok(packet) => Some(packet),
            Err(e) => {
                // Quarantine rather than fail: a corrupted message must not
                // block session recovery.
                let quarantine = self.corrupt_path(key);
                info!(error = %e, archived_at = %quarantine.display(), "corrupted message file detected");
                if let Err(e) = fs::rename(&path, &quarantine) {
                    error!(error = %e, "failed to archive corrupted message file");
                }
                None
            }
        }
    }

    fn all(&self) -> Vec<String> {
        let opened = self.opened.read();
        if !*opened {
            error!("file store used before open");
            return Vec::new();
        }
        self.scan_keys()
    }

    fn del(&self, key: &str) {
        let opened = self.opened.write();
        if !*opened {
            error!("file store used before open");
            return;
        }
        self.remove_key(key);
    }

    fn close(&self) {
        let mut opened = self.opened.write();
        *opened = false;
        debug!("file store closed");
    }

    fn reset(&self) {
        let opened = self.opened.write();
        if !*opened {
            error!("file store used before open");
            return;
        }
        info!("file store reset");
        for key in self.scan_keys() {
            self.remove_key(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::protocol::{Publish, QoS};
    use crate::store::{inbound_key, outbound_key};

    fn sample(packet_id: u16) -> Packet {
        Packet::Publish(Publish {
            qos: QoS::AtLeastOnce,
            packet_id: Some(packet_id),
            topic: Arc::from("sensor/kitchen"),
            payload: Bytes::from_static(b"21.5"),
            ..Default::default()
        })
    }

    #[test]
    fn put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.open();

        store.put(&outbound_key(1), sample(1));
        assert_eq!(store.get(&outbound_key(1)), Some(sample(1)));
        assert!(dir.path().join("o.1.msg").exists());
        assert!(!dir.path().join("o.1.tmp").exists());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path());
            store.open();
            store.put(&outbound_key(7), sample(7));
            store.close();
        }

        let store = FileStore::new(dir.path());
        store.open();
        assert_eq!(store.get(&outbound_key(7)), Some(sample(7)));
    }

    #[test]
    fn corrupted_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.open();

        fs::write(dir.path().join("i.3.msg"), b"\x80\x80\x80\x80\x80garbage").unwrap();

        assert_eq!(store.get(&inbound_key(3)), None);
        assert!(!dir.path().join("i.3.msg").exists());
        assert!(dir.path().join("i.3.CORRUPT").exists());

        // Quarantined files no longer show up as keys
        assert!(store.all().is_empty());
    }

    #[test]
    fn all_orders_by_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.open();

        store.put(&outbound_key(2), sample(2));
        sleep(Duration::from_millis(20));
        store.put(&outbound_key(1), sample(1));
        sleep(Duration::from_millis(20));
        store.put(&inbound_key(9), sample(9));

        assert_eq!(store.all(), vec!["o.2", "o.1", "i.9"]);
    }

    #[test]
    fn del_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.open();

        store.put(&outbound_key(1), sample(1));
        store.put(&outbound_key(2), sample(2));

        store.del(&outbound_key(1));
        assert_eq!(store.get(&outbound_key(1)), None);
        assert_eq!(store.all(), vec!["o.2"]);

        store.reset();
        assert!(store.all().is_empty());
    }

    #[test]
    fn unopened_store_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put(&outbound_key(1), sample(1));
        assert_eq!(store.get(&outbound_key(1)), None);
        assert!(store.all().is_empty());
        assert!(!dir.path().join("o.1.msg").exists());
    }
}
