//! Name and folder rules for new content.

use quire_types::{ASSET_EXTENSIONS, ContentKind, clean_path, is_asset_name};

use crate::fields::FieldErrors;

const FORBIDDEN_CHARS: &[char] = &[
    ' ', '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '/', ':', ';', '<', '>',
    '=', '?', '[', ']', '\\', '^', '`', '{', '}', '|', '~',
];

const FORBIDDEN_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Problems with a new file or folder name, in a fixed order.
///
/// Each forbidden character is reported once, in order of first
/// appearance.
pub fn validate_name(name: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if name.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("no uppercase letters [A-Z] allowed".to_string());
    }

    let mut forbidden = String::new();
    for c in name.chars() {
        if FORBIDDEN_CHARS.contains(&c) && !forbidden.contains(c) {
            forbidden.push(c);
        }
    }
    if !forbidden.is_empty() {
        errors.push(format!("forbidden characters: {forbidden}"));
    }

    if name.ends_with('.') {
        errors.push("cannot end in dot".to_string());
    }
    if FORBIDDEN_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        errors.push("forbidden name".to_string());
    }
    errors
}

/// The extension error for a file named `name` inside a `kind` folder.
pub fn extension_error(kind: ContentKind, name: &str) -> Option<String> {
    match kind.required_extension() {
        Some(ext) => {
            let ok = name.len() > ext.len() && name.ends_with(ext);
            (!ok).then(|| format!("invalid extension (must end in {ext})"))
        }
        None => (!is_asset_name(name)).then(|| {
            format!(
                "invalid extension (must be one of: {})",
                ASSET_EXTENSIONS.join(", ")
            )
        }),
    }
}

/// What a parent folder is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentUse {
    /// Holds a new file.
    File,
    /// Holds a new folder.
    Folder,
}

/// Clean and check a parent folder, recording problems under `field`.
///
/// Returns the cleaned folder and its content kind when usable.
pub fn check_parent(
    errors: &mut FieldErrors,
    field: &str,
    raw: &str,
    usage: ParentUse,
) -> Option<(String, ContentKind)> {
    let Ok(folder) = clean_path(raw) else {
        errors.add(field, "invalid path");
        return None;
    };
    let Some(kind) = ContentKind::of(&folder) else {
        errors.add(
            field,
            "parent folder has to start with posts, notes, pages, templates, themes or assets",
        );
        return None;
    };
    // posts/ and notes/ are a single flat folder.
    let nested = folder.contains('/');
    if kind.is_flat() && (nested || usage == ParentUse::Folder) {
        errors.add(field, "not allowed to use this parent folder");
        return None;
    }
    Some((folder, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["hello.md", "my-post_2.md", "index.html", "a", "über"] {
            assert!(validate_name(name).is_empty(), "{name}");
        }
    }

    #[test]
    fn test_uppercase_always_reported_first() {
        assert_eq!(validate_name("Hello")[0], "no uppercase letters [A-Z] allowed");
        let errors = validate_name("CON.");
        assert_eq!(
            errors,
            ["no uppercase letters [A-Z] allowed", "cannot end in dot"]
        );
        let errors = validate_name("A b?c?");
        assert_eq!(errors[0], "no uppercase letters [A-Z] allowed");
        assert_eq!(errors[1], "forbidden characters:  ?");
    }

    #[test]
    fn test_forbidden_chars_deduplicated() {
        assert_eq!(validate_name("a:b:c|d"), ["forbidden characters: :|"]);
    }

    #[test]
    fn test_reserved_device_names() {
        for name in ["con", "nul", "com1", "lpt9", "aux"] {
            assert_eq!(validate_name(name), ["forbidden name"], "{name}");
        }
        assert!(validate_name("com10").is_empty());
        assert!(validate_name("console").is_empty());
        assert!(validate_name("CON").contains(&"forbidden name".to_string()));
    }

    #[test]
    fn test_extension_rules() {
        assert_eq!(extension_error(ContentKind::Posts, "a.md"), None);
        assert_eq!(
            extension_error(ContentKind::Posts, "a.txt").as_deref(),
            Some("invalid extension (must end in .md)")
        );
        assert_eq!(
            extension_error(ContentKind::Pages, ".html").as_deref(),
            Some("invalid extension (must end in .html)")
        );
        assert_eq!(extension_error(ContentKind::Themes, "base.html"), None);
        assert_eq!(extension_error(ContentKind::Assets, "app.js.gz"), None);
        assert!(extension_error(ContentKind::Assets, "run.exe").is_some());
    }

    #[test]
    fn test_check_parent() {
        let mut errors = FieldErrors::new();
        assert_eq!(
            check_parent(&mut errors, "parent_folder", "/posts/", ParentUse::File),
            Some(("posts".to_string(), ContentKind::Posts))
        );
        assert_eq!(
            check_parent(&mut errors, "parent_folder", "pages/docs", ParentUse::Folder),
            Some(("pages/docs".to_string(), ContentKind::Pages))
        );
        assert!(errors.is_empty());

        assert_eq!(
            check_parent(&mut errors, "parent_folder", "posts", ParentUse::Folder),
            None
        );
        assert_eq!(
            check_parent(&mut errors, "parent_folder", "notes/sub", ParentUse::File),
            None
        );
        assert_eq!(
            check_parent(&mut errors, "parent_folder", "", ParentUse::File),
            None
        );
        assert_eq!(
            check_parent(&mut errors, "parent_folder", "pages/../..", ParentUse::File),
            None
        );
        assert_eq!(errors.get("parent_folder").len(), 4);
    }
}
