//! Reference catalog: one embedding per identity, built once at startup.

use crate::detector::FaceLocator;
use crate::face_match::{embed_first_face, PipelineError};
use crate::recognizer::FaceEmbedder;
use crate::types::ReferenceEntry;
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name suffixes accepted as reference images.
pub const REFERENCE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("reference directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Immutable list of reference identities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceCatalog {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceCatalog {
    pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    /// Build from already-decoded images, in the given order.
    ///
    /// Images in which the locator finds no face are skipped. When an image
    /// holds several faces, the locator's first face is the one embedded.
    pub fn build<L, E, I>(locator: &mut L, embedder: &mut E, images: I) -> Result<Self, CatalogError>
    where
        L: FaceLocator + ?Sized,
        E: FaceEmbedder + ?Sized,
        I: IntoIterator<Item = (String, RgbImage)>,
    {
        let mut entries = Vec::new();
        for (name, image) in images {
            match embed_first_face(locator, embedder, &image)? {
                Some(embedding) => entries.push(ReferenceEntry { name, embedding }),
                None => tracing::debug!(name = %name, "no face in reference image, skipped"),
            }
        }
        Ok(Self { entries })
    }

    /// Scan `dir` for reference images and build the catalog from them.
    ///
    /// The file stem becomes the display name. Files that fail to decode are
    /// logged and skipped.
    pub fn load_dir<L, E>(locator: &mut L, embedder: &mut E, dir: &Path) -> Result<Self, CatalogError>
    where
        L: FaceLocator + ?Sized,
        E: FaceEmbedder + ?Sized,
    {
        let paths = list_reference_images(dir)?;
        let images = paths.into_iter().filter_map(|path| {
            let name = path.file_stem()?.to_string_lossy().into_owned();
            match image::open(&path) {
                Ok(img) => Some((name, img.to_rgb8())),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable reference image, skipped");
                    None
                }
            }
        });

        let catalog = Self::build(locator, embedder, images)?;
        tracing::info!(dir = %dir.display(), identities = catalog.len(), "reference catalog built");
        Ok(catalog)
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// Reference image paths in `dir`, sorted by file name.
pub fn list_reference_images(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| CatalogError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_reference_image(path))
        .collect();
    paths.sort();
    Ok(paths)
}

fn is_reference_image(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| REFERENCE_EXTENSIONS.iter().any(|ext| n.ends_with(ext)))
}
