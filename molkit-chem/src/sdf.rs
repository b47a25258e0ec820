//! SDF multi-record reader and writer.
//!
//! Each record is a V2000 Molfile followed by optional data items
//! (`> <Name>` header, value lines) and a `$$$$` separator.

use std::io::{BufRead, BufReader, Read, Write};

use molkit_core::{MolkitError, Result};

use crate::line_reader::LineReader;
use crate::molecule::Molecule;
use crate::molfile::{read_molecule, write_molfile};

/// One SDF record: the structure plus its data items in file order.
#[derive(Debug, Clone)]
pub struct SdfRecord {
    pub molecule: Molecule,
    pub fields: Vec<(String, String)>,
}

impl SdfRecord {
    pub fn new(molecule: Molecule) -> Self {
        SdfRecord { molecule, fields: Vec::new() }
    }

    /// First value stored under `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Iterator over the records of an SDF stream.
///
/// A malformed record yields one `Err` and reading resumes after the next
/// `$$$$`. An I/O error ends the iteration.
pub struct SdfReader<R> {
    lines: LineReader<BufReader<R>>,
    records: usize,
    done: bool,
}

impl<R: Read> SdfReader<R> {
    pub fn new(reader: R) -> Self {
        SdfReader {
            lines: LineReader::new(BufReader::new(reader)),
            records: 0,
            done: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<SdfRecord>> {
        let Some(molecule) = read_molecule(&mut self.lines)? else {
            return Ok(None);
        };
        let fields = read_fields(&mut self.lines)?;
        Ok(Some(SdfRecord { molecule, fields }))
    }

    /// Skip to just past the next `$$$$` line.
    fn resync(&mut self) -> Result<()> {
        while let Some(line) = self.lines.next_line()? {
            if line.starts_with("$$$$") {
                break;
            }
        }
        Ok(())
    }
}

impl<R: Read> Iterator for SdfReader<R> {
    type Item = Result<SdfRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => {
                self.records += 1;
                log::debug!(
                    "SDF record {} '{}' ending at line {}",
                    self.records,
                    record.molecule.name,
                    self.lines.line_number()
                );
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err @ MolkitError::Io(_)) => {
                self.done = true;
                Some(Err(err))
            }
            Err(err) => {
                self.records += 1;
                log::warn!("skipping malformed SDF record {}: {err}", self.records);
                if let Err(io) = self.resync() {
                    log::warn!("SDF resync failed: {io}");
                    self.done = true;
                }
                Some(Err(err))
            }
        }
    }
}

/// Data items after `M  END`, up to and including the `$$$$` line.
///
/// A value ends at a blank line, at `$$$$`, or at the next `>` header.
fn read_fields<R: BufRead>(lines: &mut LineReader<R>) -> Result<Vec<(String, String)>> {
    let mut fields = Vec::new();
    while let Some(line) = lines.next_line()? {
        if line.starts_with("$$$$") {
            break;
        }
        if !line.starts_with('>') {
            continue;
        }
        let name = field_name(&line);
        let mut value: Vec<String> = Vec::new();
        while let Some(next) = lines.next_line()? {
            if next.trim().is_empty() {
                break;
            }
            if next.starts_with("$$$$") || next.starts_with('>') {
                lines.push_back(next);
                break;
            }
            value.push(next);
        }
        fields.push((name, value.join("\n")));
    }
    Ok(fields)
}

/// Name between `<` and `>` in a data header such as `>  <MW>  (1)`.
fn field_name(header: &str) -> String {
    let rest = &header[1..];
    match rest.find('<') {
        Some(open) => {
            let inner = &rest[open + 1..];
            let end = inner.find('>').unwrap_or(inner.len());
            inner[..end].to_string()
        }
        None => rest.trim().to_string(),
    }
}

/// Writes records in SDF format.
pub struct SdfWriter<W: Write> {
    writer: W,
    records: usize,
}

impl<W: Write> SdfWriter<W> {
    pub fn new(writer: W) -> Self {
        SdfWriter { writer, records: 0 }
    }

    /// Write a structure with no data items.
    pub fn write_molecule(&mut self, mol: &Molecule) -> Result<()> {
        self.write_with_fields(mol, std::iter::empty::<(&str, &str)>())
    }

    pub fn write_record(&mut self, record: &SdfRecord) -> Result<()> {
        self.write_with_fields(
            &record.molecule,
            record.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    /// Write a structure followed by `(name, value)` data items.
    ///
    /// Values holding a blank line, or a line that starts with `>` or
    /// `$$$$`, cannot be framed and are rejected before anything is written.
    pub fn write_with_fields<'f>(
        &mut self,
        mol: &Molecule,
        fields: impl IntoIterator<Item = (&'f str, &'f str)>,
    ) -> Result<()> {
        let mut text = write_molfile(mol)?;
        for (name, value) in fields {
            if name.contains(['<', '>', '\n']) {
                return Err(MolkitError::InvalidInput(format!("SDF field name {name:?}")));
            }
            text.push_str(&format!("> <{name}>\n"));
            for line in value.lines() {
                if line.trim().is_empty() || line.starts_with('>') || line.starts_with("$$$$") {
                    return Err(MolkitError::InvalidInput(format!(
                        "SDF field '{name}' has a line that would end the value: {line:?}"
                    )));
                }
                text.push_str(line);
                text.push('\n');
            }
            text.push('\n');
        }
        text.push_str("$$$$\n");
        self.writer.write_all(text.as_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Count records without parsing them: `$$$$` lines, plus a trailing record
/// that lacks its separator.
pub fn count_sdf_records<R: Read>(reader: R) -> Result<usize> {
    let mut count = 0;
    let mut pending = false;
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.starts_with("$$$$") {
            count += 1;
            pending = false;
        } else if !line.trim().is_empty() {
            pending = true;
        }
    }
    Ok(count + usize::from(pending))
}

/// Parse a multi-record SDF string, returning one result per record.
pub fn parse_sdf(input: &str) -> Vec<Result<Molecule>> {
    SdfReader::new(input.as_bytes())
        .map(|record| record.map(|r| r.molecule))
        .collect()
}

/// Read every record of an SDF file, failing on the first bad record.
#[cfg(feature = "std")]
pub fn read_sdf_file(path: impl AsRef<std::path::Path>) -> Result<Vec<SdfRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| crate::molfile::path_error(e, path))?;
    SdfReader::new(file).collect()
}

/// Parse an SDF file from disk, keeping only the structures.
#[cfg(feature = "std")]
pub fn parse_sdf_file(path: impl AsRef<std::path::Path>) -> Result<Vec<Molecule>> {
    Ok(read_sdf_file(path)?.into_iter().map(|r| r.molecule).collect())
}

/// Write records to an SDF file, replacing any existing file.
#[cfg(feature = "std")]
pub fn write_sdf_file(path: impl AsRef<std::path::Path>, records: &[SdfRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|e| crate::molfile::path_error(e, path))?;
    let mut writer = SdfWriter::new(std::io::BufWriter::new(file));
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn reader_never_panics(text in "\\PC{0,600}") {
            for record in SdfReader::new(text.as_bytes()) {
                let _ = record;
            }
        }

        #[test]
        fn field_values_survive(values in proptest::collection::vec("[a-zA-Z0-9 .]{1,20}", 0..6)) {
            let values: Vec<String> = values
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            let mut writer = SdfWriter::new(Vec::new());
            let fields: Vec<(String, &str)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("F{i}"), v.as_str()))
                .collect();
            writer
                .write_with_fields(&Molecule::new(), fields.iter().map(|(k, v)| (k.as_str(), *v)))
                .unwrap();
            let bytes = writer.into_inner();
            let record = SdfReader::new(bytes.as_slice()).next().unwrap().unwrap();
            let read: Vec<&str> = record.fields.iter().map(|(_, v)| v.as_str()).collect();
            let expected: Vec<&str> = values.iter().map(String::as_str).collect();
            prop_assert_eq!(read, expected);
        }
    }
}
