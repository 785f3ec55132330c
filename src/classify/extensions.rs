//! Extension table lookup.

use std::path::Path;

use super::{Category, Classification, ScriptKind};

/// Number of leading content bytes handed to the classifier.
pub const PREFIX_LEN: usize = 512;

const SCRIPT_EXTENSIONS: &[(&str, ScriptKind)] = &[
    ("py", ScriptKind::Python),
    ("sh", ScriptKind::Shell),
    ("bash", ScriptKind::Bash),
    ("js", ScriptKind::JavaScript),
    ("mjs", ScriptKind::JavaScript),
    ("rb", ScriptKind::Ruby),
    ("pl", ScriptKind::Perl),
];

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "tsv", "log", "json", "xml", "yaml", "yml", "toml", "ini", "cfg", "conf",
    "html", "htm", "css", "sql",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "gif", "bmp", "ico", "zip", "gz", "tar", "7z", "exe", "dll", "so",
    "bin", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "dat",
];

/// Classifier backed by the fixed extension table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeClassifier;

impl TypeClassifier {
    /// Creates a new classifier.
    pub fn new() -> Self {
        Self
    }

    /// Classifies an artifact from its original name and content prefix.
    ///
    /// Always succeeds; names without a recognised extension are `Unknown`.
    pub fn classify(&self, name: &str, prefix: &[u8]) -> Classification {
        let category = Self::lookup(name);

        let prefix = &prefix[..prefix.len().min(PREFIX_LEN)];
        if category == Category::TextDocument && prefix.contains(&0) {
            return Classification::with_warning(
                category,
                "Content contains NUL bytes; the text preview may be garbled.",
            );
        }

        Classification::new(category)
    }

    fn lookup(name: &str) -> Category {
        // Only the final path component counts; callers may pass client paths.
        let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);

        let Some(ext) = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
        else {
            return Category::Unknown;
        };

        if let Some((_, kind)) = SCRIPT_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            return Category::ExecutableScript(*kind);
        }
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return Category::TextDocument;
        }
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return Category::BinaryDocument;
        }

        Category::Unknown
    }
}

/// Convenience function to classify without creating a classifier instance.
pub fn classify_artifact(name: &str, prefix: &[u8]) -> Classification {
    TypeClassifier::new().classify(name, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_of(name: &str) -> Category {
        classify_artifact(name, b"").category
    }

    #[test]
    fn test_script_extensions() {
        assert_eq!(
            category_of("exploit.py"),
            Category::ExecutableScript(ScriptKind::Python)
        );
        assert_eq!(
            category_of("run.sh"),
            Category::ExecutableScript(ScriptKind::Shell)
        );
        assert_eq!(
            category_of("module.mjs"),
            Category::ExecutableScript(ScriptKind::JavaScript)
        );
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert_eq!(
            category_of("SETUP.PY"),
            Category::ExecutableScript(ScriptKind::Python)
        );
        assert_eq!(category_of("Report.PDF"), Category::BinaryDocument);
    }

    #[test]
    fn test_text_and_binary_documents() {
        assert_eq!(category_of("notes.txt"), Category::TextDocument);
        assert_eq!(category_of("data.csv"), Category::TextDocument);
        assert_eq!(category_of("photo.jpeg"), Category::BinaryDocument);
        assert_eq!(category_of("archive.tar.gz"), Category::BinaryDocument);
    }

    #[test]
    fn test_missing_or_unknown_extension_is_unknown() {
        assert_eq!(category_of("Makefile"), Category::Unknown);
        assert_eq!(category_of("payload.xyz"), Category::Unknown);
        assert_eq!(category_of(".bashrc"), Category::Unknown);
        assert_eq!(category_of(""), Category::Unknown);
        assert_eq!(category_of("trailing."), Category::Unknown);
    }

    #[test]
    fn test_directory_components_are_ignored() {
        assert_eq!(
            category_of("../../etc/cron.d/job.sh"),
            Category::ExecutableScript(ScriptKind::Shell)
        );
        assert_eq!(category_of("C:\\Users\\x\\notes.md"), Category::TextDocument);
        assert_eq!(category_of("scripts.py/readme"), Category::Unknown);
    }

    #[test]
    fn test_nul_bytes_in_text_prefix_warn_but_keep_category() {
        let result = classify_artifact("notes.txt", b"hello\0world");
        assert_eq!(result.category, Category::TextDocument);
        assert!(result.warning.is_some());

        let result = classify_artifact("image.png", b"\x89PNG\0\0");
        assert_eq!(result.category, Category::BinaryDocument);
        assert!(result.warning.is_none());
    }
}
