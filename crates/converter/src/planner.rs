//! Output tree planning.
//!
//! Mirrors the source hierarchy under `<output_root>/<root_folder_name>` and creates
//! the directories the jobs will write into.

use crate::manifest::{is_plain_component, ConversionJob, ManifestContext};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while mapping source paths onto the output tree.
#[derive(Debug, Error)]
pub enum PathMappingError {
    /// The source path does not lie under the manifest root
    #[error("Source path {source_path} is not under manifest root {root}")]
    OutsideRoot { source_path: String, root: String },

    /// The source path does not end with the recorded file name
    #[error("Source path {source_path} does not end with file name {base_name}")]
    NameMismatch {
        source_path: String,
        base_name: String,
    },

    /// The mapped directory would leave `<output_root>/<root_folder_name>`
    #[error("Source path {source_path} maps outside the output tree {tree}")]
    EscapesOutput { source_path: String, tree: PathBuf },

    /// Failed to create an output directory
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Compute the output directory for one job.
///
/// The result always lies under `<output_root>/<root_folder_name>`; a source path whose
/// remainder holds `..`, `.` or a root component is rejected rather than followed.
pub fn output_dir_for(
    context: &ManifestContext,
    output_root: &Path,
    job: &ConversionJob,
) -> Result<PathBuf, PathMappingError> {
    let relative = Path::new(&job.source_path)
        .strip_prefix(&context.root_input_path)
        .map_err(|_| PathMappingError::OutsideRoot {
            source_path: job.source_path.clone(),
            root: context.root_input_path.clone(),
        })?;

    let name_matches = relative
        .file_name()
        .map(|name| name == job.source_base_name.as_str())
        .unwrap_or(false);
    if !name_matches {
        return Err(PathMappingError::NameMismatch {
            source_path: job.source_path.clone(),
            base_name: job.source_base_name.clone(),
        });
    }

    let tree = output_root.join(&context.root_folder_name);
    let escapes = || PathMappingError::EscapesOutput {
        source_path: job.source_path.clone(),
        tree: tree.clone(),
    };

    if !is_plain_component(&context.root_folder_name)
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(escapes());
    }

    let mut dir = tree.clone();
    if let Some(parent) = relative.parent() {
        dir.push(parent);
    }
    if !dir.starts_with(&tree) {
        return Err(escapes());
    }
    Ok(dir)
}

/// Map every job to its output directory and create the distinct directories.
///
/// The returned vector is aligned with `jobs`. Nothing is created unless every job
/// maps cleanly. Existing directories are left alone, so planning the same jobs twice
/// is harmless.
pub fn plan_output_dirs(
    context: &ManifestContext,
    output_root: &Path,
    jobs: &[ConversionJob],
) -> Result<Vec<PathBuf>, PathMappingError> {
    let dirs = jobs
        .iter()
        .map(|job| output_dir_for(context, output_root, job))
        .collect::<Result<Vec<_>, _>>()?;

    let distinct: BTreeSet<&PathBuf> = dirs.iter().collect();
    for dir in &distinct {
        std::fs::create_dir_all(dir).map_err(|source| PathMappingError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    debug!(
        jobs = jobs.len(),
        directories = distinct.len(),
        "Output tree created"
    );

    Ok(dirs)
}
