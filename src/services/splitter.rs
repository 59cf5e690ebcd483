//! Format-aware splitting of decrypted objects into bounded-size
//! chunks.
//!
//! Two unrelated algorithms live behind one dispatch on the resolved
//! application: a line-oriented splitter for tabular exports and a
//! streaming splitter for contract exports. The contract splitter pulls
//! array elements one at a time off a JSON token cursor and never holds
//! more than one threshold-sized batch in memory.

use crate::models::blob::{Application, BlobDescriptor};
use crate::models::contract::{CONTRACT_FIELDS, ContractRecord, ExportHeader};
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("cannot split an object with an unrecognized application")]
    UnknownApplication,
    /// The contract export envelope is structurally invalid: wrong
    /// top-level shape, missing or misnamed fields, or a non-array
    /// contracts field. Fatal to the whole object.
    #[error("malformed contract envelope: {0}")]
    Envelope(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result of splitting one object: the chunk descriptors plus the
/// checksum line captured from the head of tabular files.
#[derive(Debug)]
pub struct SplitOutcome {
    pub chunks: Vec<BlobDescriptor>,
    pub checksum: Option<String>,
}

pub struct Splitter {
    line_threshold: usize,
    contract_threshold: usize,
    skip_checksum: bool,
    decrypted_suffix: String,
}

impl Splitter {
    pub fn new(
        line_threshold: usize,
        contract_threshold: usize,
        skip_checksum: bool,
        decrypted_suffix: impl Into<String>,
    ) -> Self {
        Self {
            line_threshold,
            contract_threshold,
            skip_checksum,
            decrypted_suffix: decrypted_suffix.into(),
        }
    }

    /// Split the decrypted payload at `src` into chunk files inside the
    /// blob's working directory.
    ///
    /// On failure no chunks are produced; the caller keeps the original
    /// descriptor and sends it to cleanup.
    pub fn split(&self, blob: &BlobDescriptor, src: &Path) -> Result<SplitOutcome, SplitError> {
        let mut outcome = match blob.application {
            Application::Aggregates | Application::Transactions => self.split_lines(blob, src)?,
            Application::Contracts => self.split_contracts(blob, src)?,
            Application::Unknown => return Err(SplitError::UnknownApplication),
        };

        // Back-fill the final chunk count onto every chunk.
        let total = outcome.chunks.len();
        for chunk in &mut outcome.chunks {
            chunk.chunk_total = total;
        }
        tracing::info!(
            blob = %blob.name,
            application = %blob.application,
            chunks = total,
            "split complete"
        );
        Ok(outcome)
    }

    /// Line-oriented splitting for tabular exports.
    ///
    /// The first line is conventionally a checksum; when skipping is
    /// enabled it is captured for the metadata report and does not
    /// count toward the threshold.
    fn split_lines(&self, blob: &BlobDescriptor, src: &Path) -> Result<SplitOutcome, SplitError> {
        let reader = BufReader::new(File::open(src)?);
        let mut chunks: Vec<BlobDescriptor> = Vec::new();
        let mut checksum = None;
        let mut writer: Option<BufWriter<File>> = None;
        let mut lines_in_chunk = 0usize;
        let mut first = true;

        for line in reader.lines() {
            let line = line?;
            if first {
                first = false;
                if self.skip_checksum {
                    checksum = Some(line);
                    continue;
                }
            }
            if writer.is_none() {
                let chunk = blob.chunk(chunks.len(), &self.decrypted_suffix);
                let file = File::create(chunk.local_path())?;
                chunks.push(chunk);
                lines_in_chunk = 0;
                writer = Some(BufWriter::new(file));
            }
            if let Some(out) = writer.as_mut() {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
                lines_in_chunk += 1;
            }
            if lines_in_chunk == self.line_threshold
                && let Some(mut out) = writer.take()
            {
                out.flush()?;
            }
        }
        if let Some(mut out) = writer {
            out.flush()?;
        }

        Ok(SplitOutcome { chunks, checksum })
    }

    /// Streaming splitting for contract exports.
    fn split_contracts(
        &self,
        blob: &BlobDescriptor,
        src: &Path,
    ) -> Result<SplitOutcome, SplitError> {
        let reader = BufReader::new(File::open(src)?);
        let mut sink = ContractSink {
            blob,
            suffix: &self.decrypted_suffix,
            threshold: self.contract_threshold.max(1),
            batch: Vec::new(),
            chunks: Vec::new(),
            dropped: 0,
            io_error: None,
        };

        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        if let Err(err) = (EnvelopeSeed { sink: &mut sink }).deserialize(&mut deserializer) {
            // A chunk-write failure aborts the visitor through the serde
            // error channel; surface it as I/O, not as a bad envelope.
            if let Some(io_err) = sink.io_error.take() {
                return Err(SplitError::Io(io_err));
            }
            return Err(SplitError::Envelope(err.to_string()));
        }

        sink.flush().map_err(SplitError::Io)?;
        if sink.dropped > 0 {
            tracing::warn!(
                blob = %blob.name,
                dropped = sink.dropped,
                "dropped malformed contract elements"
            );
        }
        Ok(SplitOutcome {
            chunks: sink.chunks,
            checksum: None,
        })
    }
}

/// Accumulates contract records and flushes a chunk file whenever the
/// batch reaches the threshold.
struct ContractSink<'a> {
    blob: &'a BlobDescriptor,
    suffix: &'a str,
    threshold: usize,
    batch: Vec<ContractRecord>,
    chunks: Vec<BlobDescriptor>,
    dropped: usize,
    io_error: Option<io::Error>,
}

impl ContractSink<'_> {
    fn push(&mut self, record: ContractRecord) -> io::Result<()> {
        self.batch.push(record);
        if self.batch.len() == self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let chunk = self.blob.chunk(self.chunks.len(), self.suffix);
        let file = File::create(chunk.local_path())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.batch).map_err(io::Error::other)?;
        writer.flush()?;
        self.chunks.push(chunk);
        self.batch.clear();
        Ok(())
    }
}

/// Drives deserialization of the export envelope: a `header` object
/// followed by a `contracts` array, in that order.
struct EnvelopeSeed<'a, 'b> {
    sink: &'a mut ContractSink<'b>,
}

impl<'de> DeserializeSeed<'de> for EnvelopeSeed<'_, '_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for EnvelopeSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a contract export envelope")
    }

    fn visit_map<M>(self, mut map: M) -> Result<(), M::Error>
    where
        M: MapAccess<'de>,
    {
        match map.next_key::<String>()? {
            Some(key) if key == "header" => {}
            Some(key) => {
                return Err(de::Error::custom(format!(
                    "expected `header` as first field, found `{key}`"
                )));
            }
            None => return Err(de::Error::custom("empty envelope")),
        }
        let header: ExportHeader = map.next_value()?;
        tracing::info!(
            sender_code = %header.sender_code,
            record_count = ?header.record_count,
            "contract export header"
        );

        match map.next_key::<String>()? {
            Some(key) if key == "contracts" => {}
            Some(key) => {
                return Err(de::Error::custom(format!(
                    "expected `contracts` as second field, found `{key}`"
                )));
            }
            None => return Err(de::Error::custom("missing `contracts` field")),
        }
        map.next_value_seed(ContractsSeed { sink: self.sink })?;

        // Trailing fields are tolerated and skipped.
        while map.next_key::<IgnoredAny>()?.is_some() {
            map.next_value::<IgnoredAny>()?;
        }
        Ok(())
    }
}

/// Streams the `contracts` array element by element through the sink.
struct ContractsSeed<'a, 'b> {
    sink: &'a mut ContractSink<'b>,
}

impl<'de> DeserializeSeed<'de> for ContractsSeed<'_, '_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ContractsSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of contract records")
    }

    fn visit_seq<S>(self, mut seq: S) -> Result<(), S::Error>
    where
        S: SeqAccess<'de>,
    {
        let mut index = 0usize;
        while let Some(element) = seq.next_element::<serde_json::Value>()? {
            report_unknown_fields(&element, index);
            match serde_json::from_value::<ContractRecord>(element) {
                Ok(record) => {
                    if let Err(err) = self.sink.push(record) {
                        self.sink.io_error = Some(err);
                        return Err(de::Error::custom("chunk write failed"));
                    }
                }
                Err(err) => {
                    // One malformed element drops that element only.
                    tracing::warn!(index, error = %err, "dropping malformed contract element");
                    self.sink.dropped += 1;
                }
            }
            index += 1;
        }
        Ok(())
    }
}

fn report_unknown_fields(element: &serde_json::Value, index: usize) {
    if let Some(object) = element.as_object() {
        for key in object.keys() {
            if !CONTRACT_FIELDS.contains(&key.as_str()) {
                tracing::debug!(index, field = %key, "unrecognized contract field");
            }
        }
    }
}
