/*!
Immutable store of named sequences.

Each record is kept on both strands so that any [`SeqId`] resolves to
a borrowed slice. After loading, the store is only read, and is shared
across the worker threads of every parallel phase.
*/

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bio::io::{fasta, fastq};
use flate2::read::MultiGzDecoder;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::handle::SeqId;
use crate::util::dna;

#[derive(Debug, Clone)]
struct SequenceRecord {
    name: String,
    forward: Vec<u8>,
    reverse: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    records: Vec<SequenceRecord>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a sequence, returning the id of its forward strand.
    pub fn add_sequence(&mut self, name: &str, seq: &[u8]) -> SeqId {
        let forward = seq.to_ascii_uppercase();
        let reverse = dna::rev_comp(&forward);
        let id = SeqId::forward_of(self.records.len());
        self.records.push(SequenceRecord {
            name: name.to_string(),
            forward,
            reverse,
        });
        id
    }

    /// Number of records; each has two strands.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: SeqId) -> bool {
        id.index() < self.records.len()
    }

    #[inline]
    pub fn seq(&self, id: SeqId) -> &[u8] {
        let record = &self.records[id.index()];
        if id.is_reverse() {
            &record.reverse
        } else {
            &record.forward
        }
    }

    #[inline]
    pub fn seq_len(&self, id: SeqId) -> usize {
        self.records[id.index()].forward.len()
    }

    #[inline]
    pub fn subsequence(&self, id: SeqId, start: usize, end: usize) -> &[u8] {
        &self.seq(id)[start..end]
    }

    pub fn name(&self, id: SeqId) -> &str {
        &self.records[id.index()].name
    }

    /// Record name with the strand as a sign prefix, as used in logs.
    pub fn strand_name(&self, id: SeqId) -> String {
        let sign = if id.is_reverse() { '-' } else { '+' };
        format!("{}{}", sign, self.name(id))
    }

    /// Forward strands in record order.
    pub fn forward_ids(&self) -> impl Iterator<Item = SeqId> + '_ {
        (0..self.records.len()).map(SeqId::forward_of)
    }

    /// Both strands of every record, forward strand first.
    pub fn all_ids(&self) -> impl Iterator<Item = SeqId> + '_ {
        self.forward_ids()
            .flat_map(|id| std::iter::once(id).chain(std::iter::once(id.flip())))
    }

    pub fn total_length(&self) -> usize {
        self.records.iter().map(|r| r.forward.len()).sum()
    }

    /// Load every record of a FASTA or FASTQ file, optionally gzip
    /// compressed. The format is detected from the first character.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;

        let inner: Box<dyn Read> =
            if path.extension().map_or(false, |ext| ext == "gz") {
                Box::new(MultiGzDecoder::new(file))
            } else {
                Box::new(file)
            };
        let mut reader = BufReader::new(inner);

        let first = {
            let buf = reader.fill_buf().map_err(|e| Error::io(path, e))?;
            buf.iter().copied().find(|b| !b.is_ascii_whitespace())
        };

        let before = self.records.len();
        match first {
            Some(b'>') => self.load_fasta(path, reader)?,
            Some(b'@') => self.load_fastq(path, reader)?,
            Some(other) => {
                return Err(Error::parse(
                    path,
                    format!("unexpected first character '{}'", other as char),
                ))
            }
            None => return Err(Error::parse(path, "file is empty")),
        }

        let loaded = self.records.len() - before;
        debug!("loaded {} sequences from {}", loaded, path.display());
        Ok(loaded)
    }

    fn load_fasta<R: Read>(&mut self, path: &Path, reader: R) -> Result<()> {
        for record in fasta::Reader::new(reader).records() {
            let record = record.map_err(|e| Error::parse(path, e.to_string()))?;
            record
                .check()
                .map_err(|e| Error::parse(path, format!("{}: {}", record.id(), e)))?;
            self.push_checked(path, record.id(), record.seq())?;
        }
        Ok(())
    }

    fn load_fastq<R: Read>(&mut self, path: &Path, reader: R) -> Result<()> {
        for record in fastq::Reader::new(reader).records() {
            let record = record.map_err(|e| Error::parse(path, e.to_string()))?;
            record
                .check()
                .map_err(|e| Error::parse(path, format!("{}: {}", record.id(), e)))?;
            self.push_checked(path, record.id(), record.seq())?;
        }
        Ok(())
    }

    fn push_checked(&mut self, path: &Path, name: &str, seq: &[u8]) -> Result<()> {
        if seq.is_empty() {
            return Err(Error::parse(path, format!("empty sequence '{}'", name)));
        }
        self.add_sequence(name, seq);
        Ok(())
    }
}
