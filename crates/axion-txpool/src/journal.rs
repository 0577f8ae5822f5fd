//! On-disk journal of local transactions, replayed on startup so that
//! locally submitted transactions survive restarts.

use crate::error::PoolError;
use axion_types::{Address, SignedTransaction};
use serde_json::Deserializer;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

fn io_err(e: std::io::Error) -> PoolError {
    PoolError::Journal(e.to_string())
}

/// Append-only file of JSON-encoded local transactions. `rotate`
/// periodically rewrites it as a compacted snapshot of what is still alive.
pub(crate) struct TxJournal {
    path: PathBuf,
    writer: Option<File>,
}

impl TxJournal {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    /// Replay the journal through `add`, dropping entries that no longer
    /// pass admission (stale nonces chiefly). A torn tail from a crash stops
    /// the replay without failing it.
    pub(crate) fn load<F>(&mut self, mut add: F) -> Result<(), PoolError>
    where
        F: FnMut(Vec<Arc<SignedTransaction>>) -> Vec<Result<(), PoolError>>,
    {
        if !self.path.exists() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(io_err)?;
        let reader = BufReader::new(file);

        let mut total = 0usize;
        let mut dropped = 0usize;
        let mut batch: Vec<Arc<SignedTransaction>> = Vec::with_capacity(1024);

        let mut flush =
            |batch: &mut Vec<Arc<SignedTransaction>>, dropped: &mut usize| {
                for result in add(std::mem::take(batch)) {
                    if result.is_err() {
                        *dropped += 1;
                    }
                }
            };

        for item in Deserializer::from_reader(reader).into_iter::<SignedTransaction>() {
            match item {
                Ok(tx) => {
                    total += 1;
                    batch.push(Arc::new(tx));
                    if batch.len() >= 1024 {
                        flush(&mut batch, &mut dropped);
                    }
                }
                Err(e) => {
                    // Interrupted write from a previous run; keep what we got
                    warn!(error = %e, "failed to decode journaled transaction");
                    break;
                }
            }
        }
        if !batch.is_empty() {
            flush(&mut batch, &mut dropped);
        }
        info!(transactions = total, dropped, "loaded local transaction journal");
        Ok(())
    }

    /// Append a transaction to the active journal.
    pub(crate) fn insert(&mut self, tx: &SignedTransaction) -> Result<(), PoolError> {
        let writer = self.writer.as_mut().ok_or(PoolError::Journal(
            "no active journal".to_string(),
        ))?;
        let line = serde_json::to_vec(tx).map_err(|e| PoolError::Journal(e.to_string()))?;
        writer.write_all(&line).map_err(io_err)?;
        writer.write_all(b"\n").map_err(io_err)?;
        Ok(())
    }

    /// Rewrite the journal as a compacted snapshot of the given
    /// transactions, then reopen it for appending.
    pub(crate) fn rotate(
        &mut self,
        all: HashMap<Address, Vec<Arc<SignedTransaction>>>,
    ) -> Result<(), PoolError> {
        self.writer = None;

        let replacement_path = self.path.with_extension("new");
        let replacement = File::create(&replacement_path).map_err(io_err)?;
        let mut writer = BufWriter::new(replacement);
        let mut journaled = 0usize;
        for txs in all.values() {
            for tx in txs {
                let line =
                    serde_json::to_vec(tx.as_ref()).map_err(|e| PoolError::Journal(e.to_string()))?;
                writer.write_all(&line).map_err(io_err)?;
                writer.write_all(b"\n").map_err(io_err)?;
                journaled += 1;
            }
        }
        writer.flush().map_err(io_err)?;
        drop(writer);
        std::fs::rename(&replacement_path, &self.path).map_err(io_err)?;

        self.writer = Some(
            OpenOptions::new()
                .append(true)
                .open(&self.path)
                .map_err(io_err)?,
        );
        info!(transactions = journaled, accounts = all.len(), "regenerated local transaction journal");
        Ok(())
    }

    /// Open the journal for appending without replaying it.
    pub(crate) fn open(&mut self) -> Result<(), PoolError> {
        if self.writer.is_none() {
            self.writer = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .map_err(io_err)?,
            );
        }
        Ok(())
    }

    /// Flush and close the active journal.
    pub(crate) fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axion_types::{Address, Ed25519PublicKey, Ed25519Signature, Transaction, U256};

    fn tx(nonce: u64) -> Arc<SignedTransaction> {
        Arc::new(SignedTransaction::new(
            Transaction::new(
                nonce,
                Some(Address::from_bytes([7; 20])),
                U256::from(100u64),
                21_000,
                U256::ONE,
                vec![],
            ),
            Ed25519Signature::from_bytes([1u8; 64]),
            Ed25519PublicKey::from_bytes([2u8; 32]),
        ))
    }

    #[test]
    fn test_insert_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.journal");

        let mut journal = TxJournal::new(&path);
        journal.open().unwrap();
        journal.insert(&tx(0)).unwrap();
        journal.insert(&tx(1)).unwrap();
        journal.close();

        let mut journal = TxJournal::new(&path);
        let mut seen = Vec::new();
        journal
            .load(|txs| {
                let n = txs.len();
                seen.extend(txs);
                vec![Ok(()); n]
            })
            .unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].nonce(), 0);
        assert_eq!(seen[1].nonce(), 1);
    }

    #[test]
    fn test_load_missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TxJournal::new(dir.path().join("nope.journal"));
        journal.load(|_| vec![]).unwrap();
    }

    #[test]
    fn test_load_tolerates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.journal");

        let mut journal = TxJournal::new(&path);
        journal.open().unwrap();
        journal.insert(&tx(0)).unwrap();
        journal.close();

        // Simulate a torn write
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"tx\":{\"nonce\":9").unwrap();
        drop(file);

        let mut journal = TxJournal::new(&path);
        let mut count = 0;
        journal
            .load(|txs| {
                count += txs.len();
                vec![Ok(()); txs.len()]
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rotate_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.journal");

        let mut journal = TxJournal::new(&path);
        journal.open().unwrap();
        for n in 0..5 {
            journal.insert(&tx(n)).unwrap();
        }

        // Rotate keeping only two of them
        let mut keep = HashMap::new();
        keep.insert(tx(0).sender(), vec![tx(3), tx(4)]);
        journal.rotate(keep).unwrap();
        journal.close();

        let mut journal = TxJournal::new(&path);
        let mut nonces = Vec::new();
        journal
            .load(|txs| {
                let n = txs.len();
                nonces.extend(txs.iter().map(|t| t.nonce()));
                vec![Ok(()); n]
            })
            .unwrap();
        nonces.sort();
        assert_eq!(nonces, vec![3, 4]);
    }

    #[test]
    fn test_insert_without_open_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TxJournal::new(dir.path().join("transactions.journal"));
        assert!(journal.insert(&tx(0)).is_err());
    }
}
