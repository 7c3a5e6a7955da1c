//! # Snapshot I/O
//!
//! Encoded persistence of the live key/value view through an injected
//! codec. Deadlines are not persisted: a restored entry receives the
//! default TTL in force at decode time.
//!
//! Decode inserts entries one by one, so a partially failed or
//! cancelled decode leaves the entries transferred so far visible.
//! Callers that need all-or-nothing restore should decode into a
//! fresh cache and swap it in.

use std::io::{Read, Write};

use tracing::debug;

use skv_common::{SnapshotCodec, SnapshotError};

use crate::cache::Cache;
use crate::cancel::Cancel;

impl<V: Clone> Cache<V> {
    /// Encodes the current valid entries to `writer`.
    ///
    /// The view is materialized with `to_map` semantics: expired
    /// entries are excluded (and lazily evicted on the way).
    pub fn write_snapshot<C, W>(
        &self,
        cancel: &Cancel,
        codec: &C,
        writer: &mut W,
    ) -> Result<(), SnapshotError>
    where
        C: SnapshotCodec<V>,
        W: Write,
    {
        let (entries, complete) = self.to_map(cancel);
        if !complete {
            return Err(SnapshotError::Cancelled);
        }
        codec.encode(writer, &entries)?;
        debug!(entries = entries.len(), "snapshot written");
        Ok(())
    }

    /// Decodes entries from `reader` and inserts them through `set`,
    /// applying the current default TTL. Entries become visible as
    /// they are inserted.
    pub fn read_snapshot<C, R>(
        &self,
        cancel: &Cancel,
        codec: &C,
        reader: &mut R,
    ) -> Result<(), SnapshotError>
    where
        C: SnapshotCodec<V>,
        R: Read,
    {
        let entries = codec.decode(reader)?;
        let total = entries.len();
        for (key, value) in entries {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            self.set(&key, value);
        }
        debug!(entries = total, "snapshot restored");
        Ok(())
    }
}
