//! Reference registry - the only owner of the id → path mapping
//!
//! Two kinds of references live here:
//! - **Source** references are content-addressed: the id is the digest of the
//!   file's bytes. They are created once by scanning the source root and are
//!   never added afterward.
//! - **Target** references are caller-named: the id is the caller's name and the
//!   path is a fresh, empty, registry-named file under the target root.
//!
//! Once published, an `(id, path)` pair never changes and is never removed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{escaped_root, GatewayError, Result};
use crate::hasher::{ContentHasher, Sha256Hasher};

pub mod store;

pub use store::{DirectoryLister, FileAllocator, FsStore};

/// Extension used for target files when the caller does not pick one
pub const DEFAULT_TARGET_EXTENSION: &str = ".mp4";

static EXTENSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.?[A-Za-z0-9]{1,8}$").expect("static extension pattern"));

/// Which way a reference entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    Source,
    Target,
}

/// A registered handle and the absolute path behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Existing input file, id = content digest
    Source { id: String, path: PathBuf },
    /// Allocated output file, id = caller-chosen name
    Target { id: String, path: PathBuf },
}

impl Reference {
    pub fn id(&self) -> &str {
        match self {
            Reference::Source { id, .. } | Reference::Target { id, .. } => id,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Reference::Source { path, .. } | Reference::Target { path, .. } => path,
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        match self {
            Reference::Source { .. } => ReferenceKind::Source,
            Reference::Target { .. } => ReferenceKind::Target,
        }
    }

    /// The `{{id}}` placeholder standing in for this reference
    pub fn placeholder(&self) -> String {
        format!("{{{{{}}}}}", self.id())
    }
}

/// Scan `source_root` and digest every regular file directly under it.
///
/// Any I/O error aborts the whole scan; no partial mapping is returned.
/// Files with identical bytes collapse onto one id (the last path listed wins).
pub fn init_from_directory(
    source_root: &Path,
    lister: &dyn DirectoryLister,
    hasher: &dyn ContentHasher,
) -> Result<BTreeMap<String, PathBuf>> {
    let root = store::absolute_normalized(source_root).map_err(|e| {
        GatewayError::io(
            format!("Failed to resolve source directory {}", source_root.display()),
            e,
        )
    })?;

    let files = lister.list_regular_files(&root).map_err(|e| {
        GatewayError::io(format!("Failed to list source directory {}", root.display()), e)
    })?;

    let mut mapping = BTreeMap::new();
    for file in files {
        let digest = hasher.digest_file(&file)?;
        let path = store::absolute_normalized(&file).map_err(|e| {
            GatewayError::io(format!("Failed to resolve {}", file.display()), e)
        })?;
        if let Some(previous) = mapping.insert(digest.clone(), path) {
            debug!(
                "Identical content for {:?}; reference {} keeps the later file",
                previous, digest
            );
        }
    }

    info!("Found {} files in {}", mapping.len(), root.display());
    Ok(mapping)
}

/// In-memory registry shared by every request.
///
/// Source entries are fixed at construction and read without locking. Target
/// entries sit behind an `RwLock` so readers always see whole entries, and
/// allocation is serialized by a separate mutex so two callers racing on the
/// same name create a single file.
pub struct ReferenceRegistry {
    sources: HashMap<String, PathBuf>,
    targets: RwLock<HashMap<String, PathBuf>>,
    allocation: Mutex<()>,
    target_root: PathBuf,
    default_extension: String,
    allocator: Box<dyn FileAllocator>,
}

impl std::fmt::Debug for ReferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceRegistry")
            .field("sources", &self.sources.len())
            .field("target_root", &self.target_root)
            .field("default_extension", &self.default_extension)
            .finish_non_exhaustive()
    }
}

impl ReferenceRegistry {
    /// Build a registry over an already-scanned source mapping
    pub fn new(
        sources: BTreeMap<String, PathBuf>,
        target_root: &Path,
        allocator: Box<dyn FileAllocator>,
    ) -> Result<Self> {
        let target_root = store::absolute_normalized(target_root).map_err(|e| {
            GatewayError::io(
                format!("Failed to resolve target directory {}", target_root.display()),
                e,
            )
        })?;

        Ok(Self {
            sources: sources.into_iter().collect(),
            targets: RwLock::new(HashMap::new()),
            allocation: Mutex::new(()),
            target_root,
            default_extension: DEFAULT_TARGET_EXTENSION.to_string(),
            allocator,
        })
    }

    /// Scan `source_root` with the local filesystem and SHA-256, allocating
    /// targets under `target_root`
    pub fn open(source_root: &Path, target_root: &Path) -> Result<Self> {
        let sources = init_from_directory(source_root, &FsStore, &Sha256Hasher)?;
        Self::new(sources, target_root, Box::new(FsStore))
    }

    /// Override the extension used when `add_target` gets none
    pub fn with_default_extension(mut self, extension: &str) -> Result<Self> {
        self.default_extension = normalize_extension(extension)?;
        Ok(self)
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Allocate (or return) the target reference named `name`.
    ///
    /// Idempotent: a name that already names a target returns the existing
    /// reference and creates nothing. The file name is always generated here
    /// and never derived from `name`.
    pub fn add_target(&self, name: &str, extension: Option<&str>) -> Result<Reference> {
        validate_target_name(name)?;

        if self.sources.contains_key(name) {
            return Err(GatewayError::InvalidArgument(format!(
                "'{name}' already names a source reference"
            )));
        }

        let _guard = self
            .allocation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(path) = self.read_targets().get(name) {
            debug!("Target '{}' already allocated", name);
            return Ok(Reference::Target {
                id: name.to_string(),
                path: path.clone(),
            });
        }

        // only consulted for a new allocation; an existing target is returned as is
        let extension = match extension {
            Some(ext) => normalize_extension(ext)?,
            None => self.default_extension.clone(),
        };
        let generated_name = format!("{}{}", Uuid::new_v4(), extension);
        let attempted = store::normalize_lexically(&self.target_root.join(&generated_name));
        self.ensure_inside_root(&attempted)?;

        let created = self
            .allocator
            .create_empty(&self.target_root, &generated_name)
            .map_err(|e| {
                GatewayError::io(format!("Failed to create target file for '{name}'"), e)
            })?;
        let created = store::normalize_lexically(&created);
        self.ensure_inside_root(&created)?;

        info!("Allocated target '{}' at {}", name, created.display());
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), created.clone());

        Ok(Reference::Target {
            id: name.to_string(),
            path: created,
        })
    }

    /// Look up a reference by id
    pub fn get(&self, id: &str) -> Option<Reference> {
        if let Some(path) = self.sources.get(id) {
            return Some(Reference::Source {
                id: id.to_string(),
                path: path.clone(),
            });
        }
        self.read_targets().get(id).map(|path| Reference::Target {
            id: id.to_string(),
            path: path.clone(),
        })
    }

    /// Resolve an id to its absolute path
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        self.get(id)
            .map(|reference| reference.path().to_path_buf())
            .ok_or_else(|| GatewayError::unknown(id))
    }

    /// Every registered id, both kinds
    pub fn all_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self.sources.keys().cloned().collect();
        ids.extend(self.read_targets().keys().cloned());
        ids
    }

    /// Ids found by the startup scan
    pub fn source_ids(&self) -> BTreeSet<String> {
        self.sources.keys().cloned().collect()
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> Vec<Reference> {
        let mut entries: Vec<Reference> = self
            .sources
            .iter()
            .map(|(id, path)| Reference::Source {
                id: id.clone(),
                path: path.clone(),
            })
            .collect();
        entries.extend(self.read_targets().iter().map(|(id, path)| Reference::Target {
            id: id.clone(),
            path: path.clone(),
        }));
        entries
    }

    pub fn len(&self) -> usize {
        self.sources.len() + self.read_targets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_targets(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PathBuf>> {
        self.targets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_inside_root(&self, path: &Path) -> Result<()> {
        if path.starts_with(&self.target_root) && path != self.target_root {
            return Ok(());
        }
        let err = escaped_root(&self.target_root, path);
        err.log_if_security_critical();
        Err(err)
    }
}

fn validate_target_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GatewayError::InvalidArgument(
            "Target name cannot be blank".to_string(),
        ));
    }
    // A name with braces could never be written as a placeholder
    if name.contains('{') || name.contains('}') {
        return Err(GatewayError::InvalidArgument(format!(
            "Target name '{name}' cannot contain '{{' or '}}'"
        )));
    }
    Ok(())
}

/// Accept `mov` or `.mov`; always return the dotted form
pub fn normalize_extension(extension: &str) -> Result<String> {
    let extension = extension.trim();
    if !EXTENSION_PATTERN.is_match(extension) {
        return Err(GatewayError::InvalidArgument(format!(
            "Invalid extension '{extension}': expected 1-8 letters or digits"
        )));
    }
    Ok(if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    })
}
