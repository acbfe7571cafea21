//! Bulk decryption off the caller's runtime.
//!
//! A `DecryptWorker` owns a dedicated OS thread running its own
//! current-thread tokio runtime.  The only secret it ever receives is the
//! [`KeyRing`] it was spawned with (data key and organization keys); the
//! master password and master key never cross over.  Requests and replies
//! travel over channels, and replies carry serialized `CipherView` JSON so
//! nothing mutable is shared between the two sides.
//!
//! Dropping the handle closes the request channel; the thread finishes any
//! request already queued and exits.

use std::thread::JoinHandle;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::account::KeyRing;
use crate::config::Settings;
use crate::errors::{Result, VaultCryptError};
use crate::models::{Cipher, CipherData, CipherView};

/// Default number of ciphers decrypted concurrently.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Queued requests before `decrypt` starts waiting.
const QUEUE_DEPTH: usize = 16;

/// Outcome for one cipher: its view as JSON, or why it could not be read.
pub type ItemResult = Result<String>;

struct DecryptJob {
    ciphers: Vec<CipherData>,
    reply: oneshot::Sender<Vec<ItemResult>>,
}

/// Handle to a running worker thread.
pub struct DecryptWorker {
    sender: Option<mpsc::Sender<DecryptJob>>,
    thread: Option<JoinHandle<()>>,
}

impl DecryptWorker {
    /// Start a worker that decrypts with `ring`.
    pub fn spawn(ring: KeyRing) -> Result<Self> {
        Self::spawn_with_batch_size(ring, DEFAULT_BATCH_SIZE)
    }

    /// Start a worker sized by `worker_batch_size` from the settings file.
    pub fn spawn_with_settings(ring: KeyRing, settings: &Settings) -> Result<Self> {
        Self::spawn_with_batch_size(ring, settings.worker_batch_size)
    }

    pub fn spawn_with_batch_size(ring: KeyRing, batch_size: usize) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| VaultCryptError::Worker(format!("failed to build runtime: {e}")))?;

        let thread = std::thread::Builder::new()
            .name("vaultcrypt-decrypt".into())
            .spawn(move || runtime.block_on(run(ring, receiver, batch_size)))
            .map_err(|e| VaultCryptError::Worker(format!("failed to start thread: {e}")))?;

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Decrypt `ciphers`, returning one JSON-encoded `CipherView` per input,
    /// in input order.
    ///
    /// Items whose key cannot be resolved (locked account, unknown
    /// organization) come back as errors; the rest are unaffected.
    pub async fn decrypt(&self, ciphers: Vec<CipherData>) -> Result<Vec<ItemResult>> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| VaultCryptError::Worker("worker is shut down".into()))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(DecryptJob { ciphers, reply })
            .await
            .map_err(|_| VaultCryptError::Worker("worker thread has stopped".into()))?;
        response
            .await
            .map_err(|_| VaultCryptError::Worker("worker dropped the request".into()))
    }

    /// Like [`DecryptWorker::decrypt`] but parses the replies back into views.
    pub async fn decrypt_views(&self, ciphers: Vec<CipherData>) -> Result<Vec<Result<CipherView>>> {
        let items = self.decrypt(ciphers).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                item.and_then(|json| {
                    serde_json::from_str::<CipherView>(&json).map_err(VaultCryptError::from)
                })
            })
            .collect())
    }

    /// Close the channel and wait for the thread to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.sender.take();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| VaultCryptError::Worker("worker thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for DecryptWorker {
    fn drop(&mut self) {
        // Closing the channel is enough for the thread to exit; joining
        // here could block an async caller.
        self.sender.take();
    }
}

async fn run(ring: KeyRing, mut receiver: mpsc::Receiver<DecryptJob>, batch_size: usize) {
    info!(
        organizations = ring.organization_count(),
        batch_size, "decrypt worker started"
    );

    while let Some(job) = receiver.recv().await {
        let total = job.ciphers.len();
        let mut out = Vec::with_capacity(total);
        for chunk in job.ciphers.chunks(batch_size) {
            let decoded = join_all(chunk.iter().map(|data| decrypt_one(&ring, data))).await;
            out.extend(decoded);
        }
        let failed = out.iter().filter(|r| r.is_err()).count();
        debug!(total, failed, "decrypt job finished");

        if job.reply.send(out).is_err() {
            debug!("decrypt requester went away");
        }
    }

    info!("decrypt worker stopped");
}

async fn decrypt_one(ring: &KeyRing, data: &CipherData) -> ItemResult {
    let cipher = Cipher::from_data(data);
    match cipher.decrypt(ring).await {
        Ok(view) => Ok(serde_json::to_string(&view)?),
        Err(e) => {
            warn!(id = ?data.id, kind = e.kind(), "cipher skipped by decrypt worker");
            Err(e)
        }
    }
}
