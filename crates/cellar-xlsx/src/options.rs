//! Package options

use std::path::PathBuf;

use cellar_core::StringMode;

/// Default limit on the total uncompressed size of a package (16 GiB)
pub const DEFAULT_UNZIP_SIZE_LIMIT: u64 = 16 << 30;

/// Default size above which parts are spooled to disk (16 MiB)
pub const DEFAULT_UNZIP_XML_SIZE_LIMIT: u64 = 16 << 20;

/// Options for opening and saving packages
///
/// ```
/// use cellar_xlsx::Options;
///
/// let options = Options::new()
///     .with_unzip_xml_size_limit(1 << 20)
///     .with_preload_sheets(true);
/// assert!(options.preload_sheets);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Limit on the declared total uncompressed size, and on any single part
    pub unzip_size_limit: u64,
    /// Parts larger than this are spooled to a temporary file when streamed
    pub unzip_xml_size_limit: u64,
    /// Directory for temporary files (system default when `None`)
    pub tmp_dir: Option<PathBuf>,
    /// How strings written through the model are stored
    pub string_mode: StringMode,
    /// Fail on relationships whose target part does not exist
    pub strict_relationships: bool,
    /// Decode every worksheet when opening instead of on first use
    pub preload_sheets: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            unzip_size_limit: DEFAULT_UNZIP_SIZE_LIMIT,
            unzip_xml_size_limit: DEFAULT_UNZIP_XML_SIZE_LIMIT,
            tmp_dir: None,
            string_mode: StringMode::Shared,
            strict_relationships: true,
            preload_sheets: false,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unzip_size_limit(mut self, limit: u64) -> Self {
        self.unzip_size_limit = limit;
        self
    }

    pub fn with_unzip_xml_size_limit(mut self, limit: u64) -> Self {
        self.unzip_xml_size_limit = limit;
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    pub fn with_string_mode(mut self, mode: StringMode) -> Self {
        self.string_mode = mode;
        self
    }

    pub fn with_strict_relationships(mut self, strict: bool) -> Self {
        self.strict_relationships = strict;
        self
    }

    pub fn with_preload_sheets(mut self, preload: bool) -> Self {
        self.preload_sheets = preload;
        self
    }

    /// Create a temporary file in `tmp_dir`
    pub(crate) fn tempfile(&self) -> std::io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".cellar-");
        match &self.tmp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}
