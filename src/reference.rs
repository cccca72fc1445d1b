use crate::alignment::resolve_contig_name;
use crate::errors::{AppError, Result};
use bio::io::fasta;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Indexed FASTA lookup for the `REF` column of per-base profiles.
pub struct ReferenceSequence {
    path: PathBuf,
    reader: fasta::IndexedReader<File>,
    contigs: Vec<String>,
    lengths: Vec<u64>,
}

impl std::fmt::Debug for ReferenceSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceSequence")
            .field("path", &self.path)
            .field("contigs", &self.contigs.len())
            .finish()
    }
}

impl ReferenceSequence {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = fasta::IndexedReader::from_file(&path).map_err(|err| AppError::ParseError {
            message: format!(
                "failed to open indexed FASTA reader for {}: {err}",
                path.display()
            ),
        })?;
        let (contigs, lengths) = reader
            .index
            .sequences()
            .into_iter()
            .map(|sequence| (sequence.name, sequence.len))
            .unzip();

        Ok(Self {
            path,
            reader,
            contigs,
            lengths,
        })
    }

    /// Upper-cased bases of `[start, end)`, clipped to the contig length.
    /// `None` when the chromosome is not in the FASTA index.
    pub fn fetch(&mut self, chromosome: &str, start: u64, end: u64) -> Result<Option<Vec<u8>>> {
        let Some(contig) = resolve_contig_name(chromosome, &self.contigs).map(str::to_string) else {
            return Ok(None);
        };
        let length = self
            .contigs
            .iter()
            .position(|name| *name == contig)
            .map_or(0, |index| self.lengths[index]);
        let end = end.min(length);
        if end <= start {
            return Ok(Some(Vec::new()));
        }

        self.reader
            .fetch(&contig, start, end)
            .map_err(|err| AppError::ParseError {
                message: format!("failed FASTA fetch for {contig}:{}-{end}: {err}", start + 1),
            })?;
        let mut bases = Vec::with_capacity(usize::try_from(end - start).unwrap_or(0));
        self.reader
            .read(&mut bases)
            .map_err(|err| AppError::ParseError {
                message: format!("failed FASTA read for {contig}:{}-{end}: {err}", start + 1),
            })?;
        bases.make_ascii_uppercase();
        Ok(Some(bases))
    }
}
