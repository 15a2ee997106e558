//! Manifest reader.
//!
//! The manifest is a CSV file written by the indexing pass. Its header carries the
//! root of the indexed tree, and every data record describes one candidate file.
//! Records are decoded positionally exactly once, into [`ManifestRow`], and the rest
//! of the crate only sees named fields.

use csv::{ReaderBuilder, StringRecord};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Column layout of a manifest data record.
mod column {
    pub const SOURCE_PATH: usize = 0;
    pub const SOURCE_NAME: usize = 1;
    pub const SOURCE_KBPS: usize = 4;
    pub const TARGET_NAME: usize = 8;
    pub const TARGET_TITLE: usize = 9;
    pub const TARGET_ARTIST: usize = 10;
}

/// Records shorter than this never carry a target name and are ignored.
const MIN_SELECTABLE_FIELDS: usize = column::TARGET_NAME + 1;

/// Selected records must be at least this long to carry title and artist.
const MIN_SELECTED_FIELDS: usize = column::TARGET_ARTIST + 1;

/// Errors raised while reading a manifest. All of them abort the run.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to open manifest {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest: {0}")]
    Csv(#[from] csv::Error),

    #[error("Manifest {0} is empty")]
    Empty(PathBuf),

    #[error("Manifest header \"{0}\" does not name a usable root folder")]
    InvalidRoot(String),

    #[error("Manifest line {line} is selected for conversion but has {fields} fields (at least 11 required)")]
    ShortRow { line: u64, fields: usize },
}

/// Root of the indexed tree, taken from the manifest header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestContext {
    pub root_input_path: String,
    pub root_folder_name: String,
}

impl ManifestContext {
    /// Derive the context from the first header field.
    ///
    /// `Music (/srv/music)` yields root path `/srv/music` and folder `music`. The path
    /// runs from just after the first `(` to the last character, which is dropped.
    /// Without a bracket the header is used verbatim for both.
    ///
    /// The folder name must be a single plain path component, so an empty root, `/`
    /// or a root ending in `..` is rejected.
    pub fn from_header(header: &str) -> Result<Self, ManifestError> {
        let header = header.strip_prefix('\u{feff}').unwrap_or(header);

        let (root, folder) = match header.find('(') {
            Some(open) => {
                let mut root = header[open + 1..].to_string();
                root.pop();
                let folder = Path::new(&root)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (root, folder)
            }
            None => (header.to_string(), header.to_string()),
        };

        if root.is_empty() || !is_plain_component(&folder) {
            return Err(ManifestError::InvalidRoot(header.to_string()));
        }

        Ok(Self {
            root_input_path: root,
            root_folder_name: folder,
        })
    }
}

/// True when `name` is exactly one normal path component (no separators, `.` or `..`).
pub(crate) fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// One selected manifest record, with named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub source_path: String,
    pub source_name: String,
    pub source_kbps: String,
    pub target_name: String,
    pub target_title: String,
    pub target_artist: String,
}

impl ManifestRow {
    /// Decode a data record.
    ///
    /// Returns `Ok(None)` for records that are not selected for conversion: too short
    /// to carry a target name, or with an empty one.
    pub fn decode(record: &StringRecord, line: u64) -> Result<Option<Self>, ManifestError> {
        if record.len() < MIN_SELECTABLE_FIELDS {
            return Ok(None);
        }

        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();

        let target_name = field(column::TARGET_NAME);
        if target_name.is_empty() {
            return Ok(None);
        }

        if record.len() < MIN_SELECTED_FIELDS {
            return Err(ManifestError::ShortRow {
                line,
                fields: record.len(),
            });
        }

        Ok(Some(Self {
            source_path: field(column::SOURCE_PATH),
            source_name: field(column::SOURCE_NAME),
            source_kbps: field(column::SOURCE_KBPS),
            target_name,
            target_title: field(column::TARGET_TITLE),
            target_artist: field(column::TARGET_ARTIST),
        }))
    }
}

/// One unit of conversion work.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    /// Absolute path of the input file
    pub source_path: String,
    /// File name component of `source_path`
    pub source_base_name: String,
    /// Bitrate reported by the indexing pass; None when blank or unparseable
    pub source_bitrate_kbps: Option<f64>,
    /// Output file stem, without extension
    pub target_base_name: String,
    pub target_title: String,
    pub target_artist: String,
}

impl ConversionJob {
    /// Source bitrate with unknown values treated as 0.
    pub fn effective_source_kbps(&self) -> f64 {
        self.source_bitrate_kbps.unwrap_or(0.0)
    }
}

impl From<ManifestRow> for ConversionJob {
    fn from(row: ManifestRow) -> Self {
        let source_bitrate_kbps = parse_kbps(&row.source_kbps);
        if source_bitrate_kbps.is_none() && !row.source_kbps.trim().is_empty() {
            warn!(
                source = %row.source_path,
                value = %row.source_kbps,
                "Unparseable source bitrate, treating as unknown"
            );
        }

        Self {
            source_path: row.source_path,
            source_base_name: row.source_name,
            source_bitrate_kbps,
            target_base_name: row.target_name,
            target_title: row.target_title,
            target_artist: row.target_artist,
        }
    }
}

/// Parse a bitrate cell. Blank, non-numeric and negative values are unknown.
fn parse_kbps(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|kbps| kbps.is_finite() && *kbps >= 0.0)
}

/// A fully read manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub context: ManifestContext,
    /// Selected jobs, in manifest order
    pub jobs: Vec<ConversionJob>,
}

/// Read a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let file = std::fs::File::open(path).map_err(|source| ManifestError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record?,
        None => return Err(ManifestError::Empty(path.to_path_buf())),
    };
    let context = ManifestContext::from_header(header.get(0).unwrap_or_default())?;

    let mut jobs = Vec::new();
    let mut skipped = 0usize;
    for record in records {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        match ManifestRow::decode(&record, line)? {
            Some(row) => jobs.push(ConversionJob::from(row)),
            None => skipped += 1,
        }
    }

    debug!(
        root = %context.root_input_path,
        selected = jobs.len(),
        skipped,
        "Manifest read"
    );

    Ok(Manifest { context, jobs })
}
