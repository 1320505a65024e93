//! Zip container access
//!
//! [`ArchiveReader`] keeps the whole compressed package in shared memory and
//! decompresses entries on demand; clones are cheap, so rayon workers each
//! get their own. [`ArchiveWriter`] stages output entries with fixed
//! timestamps so that saving the same content twice gives the same bytes.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, Write};
use std::sync::Arc;

use rayon::prelude::*;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{XlsxError, XlsxResult};
use crate::options::Options;

/// Signature of compound-file (OLE2) containers: encrypted or legacy binary workbooks
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug, Clone)]
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An entry of the source archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Entry name, without a leading `/`
    pub name: String,
    pub index: usize,
    pub compressed_size: u64,
    pub size: u64,
}

/// A part copied out of the archive, in memory or on disk
#[derive(Debug, Clone)]
pub enum SpooledPart {
    Memory(Arc<[u8]>),
    File(Arc<NamedTempFile>),
}

impl SpooledPart {
    /// Open an independent reader over the part
    pub fn open(&self) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(match self {
            SpooledPart::Memory(bytes) => Box::new(Cursor::new(SharedBytes(bytes.clone()))),
            SpooledPart::File(file) => Box::new(BufReader::new(file.reopen()?)),
        })
    }
}

/// Read access to a source package
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    archive: ZipArchive<Cursor<SharedBytes>>,
    entries: BTreeMap<String, EntryInfo>,
    part_limit: u64,
}

impl ArchiveReader {
    /// Index the archive's entries without decompressing them
    pub fn new(bytes: impl Into<Arc<[u8]>>, options: &Options) -> XlsxResult<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        if bytes.starts_with(&CFB_SIGNATURE) {
            return Err(XlsxError::UnsupportedFormatVersion(
                "compound-file container (encrypted or legacy binary workbook)".into(),
            ));
        }
        let mut archive = ZipArchive::new(Cursor::new(SharedBytes(bytes)))?;

        let mut entries = BTreeMap::new();
        let mut total: u64 = 0;
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            total = total.saturating_add(file.size());
            entries.insert(
                name.clone(),
                EntryInfo {
                    name,
                    index,
                    compressed_size: file.compressed_size(),
                    size: file.size(),
                },
            );
        }
        if total > options.unzip_size_limit {
            return Err(XlsxError::PackageTooLarge {
                size: total,
                limit: options.unzip_size_limit,
            });
        }
        log::debug!("archive has {} entries, {} bytes uncompressed", entries.len(), total);

        Ok(Self {
            archive,
            entries,
            part_limit: options.unzip_size_limit,
        })
    }

    /// Look up an entry; part names are matched case-insensitively as a fallback
    pub fn entry(&self, name: &str) -> Option<&EntryInfo> {
        let name = name.trim_start_matches('/');
        self.entries.get(name).or_else(|| {
            self.entries
                .values()
                .find(|e| e.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Entry names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntryInfo> {
        self.entries.values()
    }

    fn index_of(&self, name: &str) -> XlsxResult<usize> {
        self.entry(name)
            .map(|e| e.index)
            .ok_or_else(|| XlsxError::InvalidPackage(format!("missing part {}", name)))
    }

    /// Decompress one entry
    ///
    /// The read stops one byte past the limit; the declared size is not trusted.
    pub fn read_part(&self, name: &str) -> XlsxResult<Vec<u8>> {
        let index = self.index_of(name)?;
        let mut archive = self.archive.clone();
        let file = archive.by_index(index)?;
        let mut bytes = Vec::with_capacity(file.size().min(self.part_limit) as usize);
        file.take(self.part_limit.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > self.part_limit {
            return Err(self.too_large(name));
        }
        Ok(bytes)
    }

    /// Decompress several entries in parallel
    pub fn read_parts(&self, names: &[String]) -> XlsxResult<Vec<(String, Vec<u8>)>> {
        names
            .par_iter()
            .map(|name| Ok((name.clone(), self.read_part(name)?)))
            .collect()
    }

    /// Stream one entry through `f` without buffering it
    pub fn with_part<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn BufRead) -> XlsxResult<T>,
    ) -> XlsxResult<T> {
        let index = self.index_of(name)?;
        let mut archive = self.archive.clone();
        let file = archive.by_index(index)?;
        let mut reader = BufReader::new(file.take(self.part_limit.saturating_add(1)));
        let result = f(&mut reader);
        if reader.get_ref().limit() == 0 {
            return Err(self.too_large(name));
        }
        result
    }

    /// Copy an entry into memory, or into a temporary file above `threshold` bytes
    pub fn spool_part(&self, name: &str, threshold: u64, options: &Options) -> XlsxResult<SpooledPart> {
        let info = self
            .entry(name)
            .ok_or_else(|| XlsxError::InvalidPackage(format!("missing part {}", name)))?;
        if info.size <= threshold {
            return Ok(SpooledPart::Memory(self.read_part(name)?.into()));
        }

        let mut archive = self.archive.clone();
        let file = archive.by_index(info.index)?;
        let mut tmp = options.tempfile()?;
        let copied = io::copy(&mut file.take(self.part_limit.saturating_add(1)), &mut tmp)?;
        if copied > self.part_limit {
            return Err(self.too_large(name));
        }
        tmp.flush()?;
        log::debug!("spooled {} ({} bytes) to {}", name, copied, tmp.path().display());
        Ok(SpooledPart::File(Arc::new(tmp)))
    }

    fn too_large(&self, name: &str) -> XlsxError {
        XlsxError::PartTooLarge {
            part: name.to_string(),
            limit: self.part_limit,
        }
    }
}

/// Output archive under construction
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
        }
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
    }

    /// Add a new entry from bytes
    pub fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> XlsxResult<()> {
        self.zip.start_file(name, Self::options())?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    /// Add a new entry by copying a reader
    pub fn add_reader(&mut self, name: &str, reader: &mut dyn Read) -> XlsxResult<()> {
        self.zip.start_file(name, Self::options())?;
        io::copy(reader, &mut self.zip)?;
        Ok(())
    }

    /// Copy an entry from the source archive without recompressing it
    pub fn copy_raw(&mut self, source: &ArchiveReader, name: &str) -> XlsxResult<()> {
        let index = source.index_of(name)?;
        let mut archive = source.archive.clone();
        let file = archive.by_index_raw(index)?;
        self.zip.raw_copy_file(file)?;
        Ok(())
    }

    /// Write the central directory and return the inner writer
    pub fn finish(self) -> XlsxResult<W> {
        Ok(self.zip.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer.add_bytes(name, bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_enumerate_and_read() {
        let bytes = build(&[("a.xml", b"<a/>"), ("dir/b.xml", b"<b/>")]);
        let reader = ArchiveReader::new(bytes, &Options::default()).unwrap();
        assert_eq!(reader.names().collect::<Vec<_>>(), vec!["a.xml", "dir/b.xml"]);
        assert_eq!(reader.read_part("dir/b.xml").unwrap(), b"<b/>");
        assert_eq!(reader.read_part("DIR/B.XML").unwrap(), b"<b/>");
        assert!(matches!(
            reader.read_part("missing.xml"),
            Err(XlsxError::InvalidPackage(_))
        ));

        let parts = reader
            .read_parts(&["a.xml".to_string(), "dir/b.xml".to_string()])
            .unwrap();
        assert_eq!(parts.len(), 2);
        let text = reader
            .with_part("a.xml", |r| {
                let mut s = String::new();
                r.read_to_string(&mut s)?;
                Ok(s)
            })
            .unwrap();
        assert_eq!(text, "<a/>");
    }

    #[test]
    fn test_corrupt_and_compound_files() {
        assert!(matches!(
            ArchiveReader::new(b"not a zip".to_vec(), &Options::default()),
            Err(XlsxError::CorruptContainer(_))
        ));
        let mut cfb = CFB_SIGNATURE.to_vec();
        cfb.extend_from_slice(&[0; 504]);
        assert!(matches!(
            ArchiveReader::new(cfb, &Options::default()),
            Err(XlsxError::UnsupportedFormatVersion(_))
        ));
    }

    #[test]
    fn test_limits() {
        let payload = vec![b'x'; 4096];
        let bytes = build(&[("big.xml", &payload)]);
        let options = Options::default().with_unzip_size_limit(1024);
        assert!(matches!(
            ArchiveReader::new(bytes.clone(), &options),
            Err(XlsxError::PackageTooLarge { size: 4096, limit: 1024 })
        ));

        let reader = ArchiveReader::new(bytes, &Options::default()).unwrap();
        let spooled = reader.spool_part("big.xml", 100, &Options::default()).unwrap();
        assert!(matches!(spooled, SpooledPart::File(_)));
        let mut back = Vec::new();
        spooled.open().unwrap().read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
        assert!(matches!(
            reader.spool_part("big.xml", 1 << 20, &Options::default()).unwrap(),
            SpooledPart::Memory(_)
        ));
    }

    #[test]
    fn test_raw_copy_and_fixed_timestamps_are_deterministic() {
        let source = build(&[("keep.bin", b"\x00\x01\x02"), ("x.xml", b"<x/>")]);
        let reader = ArchiveReader::new(source, &Options::default()).unwrap();
        let write = || {
            let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
            writer.copy_raw(&reader, "keep.bin").unwrap();
            writer.add_bytes("new.xml", b"<new/>").unwrap();
            writer.finish().unwrap().into_inner()
        };
        let first = write();
        assert_eq!(first, write());
        let copy = ArchiveReader::new(first, &Options::default()).unwrap();
        assert_eq!(copy.read_part("keep.bin").unwrap(), b"\x00\x01\x02");
    }
}
