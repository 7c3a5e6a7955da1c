//! # Snapshot Codecs
//!
//! The pluggable encoder/decoder seam used by cache snapshots. A
//! codec moves a fully materialized `key -> value` map across a
//! reader/writer pair; the cache itself never defines wire bytes and
//! deadlines are not persisted.
//!
//! `BincodeCodec` is the default length-prefixed binary codec.
//! `JsonCodec` exists mainly to prove the seam is format-agnostic and
//! to ease debugging of snapshot files.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Encodes and decodes a materialized entry map.
///
/// Implementations must round-trip any map produced by their own
/// `encode`; the cache relies on nothing else about the format.
pub trait SnapshotCodec<V> {
    /// Writes the whole map to `writer`.
    fn encode(&self, writer: &mut dyn Write, entries: &HashMap<String, V>) -> Result<(), CodecError>;

    /// Reads a whole map from `reader`.
    fn decode(&self, reader: &mut dyn Read) -> Result<HashMap<String, V>, CodecError>;
}

/// Default binary codec backed by bincode (length-prefixed fields).
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<V> SnapshotCodec<V> for BincodeCodec
where
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, writer: &mut dyn Write, entries: &HashMap<String, V>) -> Result<(), CodecError> {
        bincode::serialize_into(writer, entries).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<HashMap<String, V>, CodecError> {
        bincode::deserialize_from(reader).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

/// JSON codec for human-readable snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<V> SnapshotCodec<V> for JsonCodec
where
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, writer: &mut dyn Write, entries: &HashMap<String, V>) -> Result<(), CodecError> {
        serde_json::to_writer(writer, entries).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, reader: &mut dyn Read) -> Result<HashMap<String, V>, CodecError> {
        serde_json::from_reader(reader).map_err(|err| CodecError::Decode(err.to_string()))
    }
}
