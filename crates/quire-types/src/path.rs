//! Content-relative paths and the top-level content folders.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

/// Why a path was refused by [`clean_path`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path contains a parent-directory component: {0}")]
    ParentComponent(String),
    #[error("path contains a NUL byte")]
    Nul,
}

/// Canonicalize a user-supplied content path.
///
/// Leading and trailing slashes are trimmed, runs of separators collapse,
/// and `.` segments drop out. `..` anywhere is an error. The result is
/// never absolute; `""` is the content root.
pub fn clean_path(input: &str) -> Result<String, PathError> {
    if input.contains('\0') {
        return Err(PathError::Nul);
    }
    let mut out: Vec<&str> = Vec::new();
    for segment in input.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::ParentComponent(input.to_string())),
            s => out.push(s),
        }
    }
    Ok(out.join("/"))
}

/// Split a clean path into `(parent, name)`. The parent of a top-level
/// entry is `""`.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// Join two clean paths.
pub fn join(parent: &str, name: &str) -> String {
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}/{name}"),
    }
}

/// The top-level content folders a site may contain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContentKind {
    Posts,
    Notes,
    Pages,
    Templates,
    Assets,
    /// Legacy name for the templates folder, still accepted.
    Themes,
}

impl ContentKind {
    /// Folders created for every new site, in listing order.
    pub const SITE_FOLDERS: [ContentKind; 5] = [
        ContentKind::Notes,
        ContentKind::Pages,
        ContentKind::Posts,
        ContentKind::Templates,
        ContentKind::Assets,
    ];

    /// Classify a clean path by its first segment.
    pub fn of(path: &str) -> Option<Self> {
        let head = path.split('/').next().unwrap_or_default();
        head.parse().ok()
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Posts and notes live in a single flat folder.
    pub fn is_flat(self) -> bool {
        matches!(self, ContentKind::Posts | ContentKind::Notes)
    }

    /// The file extension required for files in this folder, if fixed.
    pub fn required_extension(self) -> Option<&'static str> {
        match self {
            ContentKind::Posts | ContentKind::Notes => Some(".md"),
            ContentKind::Pages | ContentKind::Templates | ContentKind::Themes => Some(".html"),
            ContentKind::Assets => None,
        }
    }
}

/// Extensions accepted under `assets/`. Each may additionally carry `.gz`.
pub const ASSET_EXTENSIONS: &[&str] = &[
    ".html", ".css", ".js", ".md", ".txt", ".jpeg", ".jpg", ".png", ".gif", ".svg", ".ico",
    ".eof", ".ttf", ".woff", ".woff2", ".csv", ".tsv", ".json", ".xml", ".toml", ".yaml", ".yml",
];

/// Returns true if `name` carries an extension accepted under `assets/`.
pub fn is_asset_name(name: &str) -> bool {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    ASSET_EXTENSIONS.iter().any(|ext| {
        name.len() > ext.len() && name.ends_with(ext)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/posts//hello.md/").unwrap(), "posts/hello.md");
        assert_eq!(clean_path("./pages/./a").unwrap(), "pages/a");
        assert_eq!(clean_path("").unwrap(), "");
        assert_eq!(clean_path("///").unwrap(), "");
        assert!(matches!(
            clean_path("posts/../../etc"),
            Err(PathError::ParentComponent(_))
        ));
        assert_eq!(clean_path("a\0b"), Err(PathError::Nul));
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("posts/a.md"), ("posts", "a.md"));
        assert_eq!(split_parent("pages/x/y"), ("pages/x", "y"));
        assert_eq!(split_parent("posts"), ("", "posts"));
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(ContentKind::of("posts/a.md"), Some(ContentKind::Posts));
        assert_eq!(ContentKind::of("themes"), Some(ContentKind::Themes));
        assert_eq!(ContentKind::of("output/a"), None);
        assert_eq!(ContentKind::of(""), None);
        assert_eq!(ContentKind::Templates.to_string(), "templates");
    }

    #[test]
    fn test_asset_names() {
        assert!(is_asset_name("style.css"));
        assert!(is_asset_name("bundle.js.gz"));
        assert!(is_asset_name("font.woff2"));
        assert!(!is_asset_name("run.exe"));
        assert!(!is_asset_name(".css"));
        assert!(!is_asset_name("archive.gz"));
    }
}
