//! Path Classifier
//!
//! Decides whether a recorded source path belongs to the application under
//! test. Rules are applied in order:
//!
//! 1. synthetic frames (`<frozen ...>`, `<string>`, empty) are rejected
//! 2. the agent's own installation directory is rejected
//! 3. standard library roots are rejected
//! 4. third-party roots and paths containing a third-party marker component
//!    (`site-packages`, `dist-packages`) are rejected
//! 5. anything else is accepted only if it lies under the application root
//!
//! Every comparison uses resolved absolute paths, with symlinks followed
//! before `..` is applied. Roots are resolved once, at construction.

use crate::config::AgentConfig;
use std::path::{Component, Path, PathBuf};

/// Outcome of classifying one recorded path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Runtime-generated frame with no real file behind it
    Synthetic,
    /// Under the agent's own installation directory
    AgentCode,
    /// Under a standard library root
    StandardLibrary,
    /// Under a third-party package root or marker directory
    ThirdParty,
    /// Real file outside the application root
    OutsideApplication,
    /// Application code, with its resolved path
    Application(PathBuf),
}

impl Classification {
    /// Check whether the path counts as application code
    #[must_use]
    pub const fn is_application(&self) -> bool {
        matches!(self, Self::Application(_))
    }
}

/// Classifies recorded paths against configured roots
#[derive(Debug, Clone)]
pub struct PathClassifier {
    app_root: PathBuf,
    agent_dir: Option<PathBuf>,
    stdlib_dirs: Vec<PathBuf>,
    third_party_dirs: Vec<PathBuf>,
    markers: Vec<String>,
    base_dir: PathBuf,
}

impl PathClassifier {
    /// Create a classifier for an application root with no exclusions
    #[must_use]
    pub fn new(app_root: impl AsRef<Path>) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let app_root = resolve_from(&base_dir, app_root.as_ref());
        Self {
            app_root,
            agent_dir: None,
            stdlib_dirs: Vec::new(),
            third_party_dirs: Vec::new(),
            markers: Vec::new(),
            base_dir,
        }
    }

    /// Create a classifier from agent configuration
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut classifier = Self::new(&config.app_root)
            .with_markers(config.third_party_markers.iter().cloned());
        if let Some(dir) = &config.agent_dir {
            classifier = classifier.with_agent_dir(dir);
        }
        for dir in &config.stdlib_dirs {
            classifier = classifier.with_stdlib_dir(dir);
        }
        for dir in &config.third_party_dirs {
            classifier = classifier.with_third_party_dir(dir);
        }
        classifier
    }

    /// Exclude the agent's own installation directory
    #[must_use]
    pub fn with_agent_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.agent_dir = Some(self.resolve(dir.as_ref()));
        self
    }

    /// Exclude a standard library root
    #[must_use]
    pub fn with_stdlib_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let resolved = self.resolve(dir.as_ref());
        self.stdlib_dirs.push(resolved);
        self
    }

    /// Exclude a third-party package root
    #[must_use]
    pub fn with_third_party_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let resolved = self.resolve(dir.as_ref());
        self.third_party_dirs.push(resolved);
        self
    }

    /// Replace the directory names that mark third-party trees
    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// The resolved application root
    #[must_use]
    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    /// Classify a path exactly as the tracer recorded it
    #[must_use]
    pub fn classify(&self, raw: &str) -> Classification {
        if is_synthetic(raw) {
            return Classification::Synthetic;
        }
        self.classify_resolved(&self.resolve(Path::new(raw)))
    }

    /// Resolved path if `raw` is application code
    #[must_use]
    pub fn resolve_application_path(&self, raw: &str) -> Option<PathBuf> {
        match self.classify(raw) {
            Classification::Application(path) => Some(path),
            _ => None,
        }
    }

    /// Apply rules 2-5 to an already resolved absolute path
    #[must_use]
    pub fn classify_resolved(&self, path: &Path) -> Classification {
        if self
            .agent_dir
            .as_deref()
            .is_some_and(|dir| path.starts_with(dir))
        {
            return Classification::AgentCode;
        }
        if self.stdlib_dirs.iter().any(|dir| path.starts_with(dir)) {
            return Classification::StandardLibrary;
        }
        if self.third_party_dirs.iter().any(|dir| path.starts_with(dir))
            || self.has_marker_component(path)
        {
            return Classification::ThirdParty;
        }
        if path.starts_with(&self.app_root) {
            Classification::Application(path.to_path_buf())
        } else {
            Classification::OutsideApplication
        }
    }

    fn has_marker_component(&self, path: &Path) -> bool {
        path.components().any(|component| match component {
            Component::Normal(name) => self.markers.iter().any(|m| name == m.as_str()),
            _ => false,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_from(&self.base_dir, path)
    }
}

/// Frames produced by the runtime itself rather than loaded from a file
#[must_use]
pub fn is_synthetic(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw.starts_with('<') || raw.contains("<frozen ")
}

/// Absolute, symlink-free form of `path`
///
/// Symlinks are followed before `..` is applied. For files that no longer
/// exist, the longest existing prefix of the raw path is canonicalized and
/// only the missing tail is normalized lexically.
fn resolve_from(base_dir: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    for prefix in absolute.ancestors() {
        if let Ok(real) = std::fs::canonicalize(prefix) {
            return match absolute.strip_prefix(prefix) {
                Ok(rest) if !rest.as_os_str().is_empty() => {
                    normalize_lexically(&real.join(rest))
                }
                _ => real,
            };
        }
    }
    normalize_lexically(&absolute)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
