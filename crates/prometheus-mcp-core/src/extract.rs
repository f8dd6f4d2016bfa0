//! Bounded extraction of documentation from an untrusted `.tar.gz` stream.
//!
//! The archive is expected in the layout produced by forge "download as
//! tarball" endpoints: a single synthetic root directory (`docs-<ref>/`)
//! followed by the repository tree. Only regular files below
//! `<root>/<docs_dir>/` with the configured extension are kept.
//!
//! # Rules
//!
//! Silent filtering (entry skipped, extraction continues):
//! - names without a `/` after the synthetic root
//! - anything outside `docs_dir`
//! - absolute paths, `..` components, drive prefixes, backslashes
//! - non-regular entries and foreign extensions
//!
//! Hard failures (whole extraction aborts):
//! - the decompressed budget or the file count would be exceeded
//!   ([`DocsError::SizeLimitExceeded`])
//! - corrupt gzip or tar framing ([`DocsError::MalformedArchive`])
//! - nothing survived ([`DocsError::EmptyArchive`])

use std::io::Read;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::DocsError;
use crate::models::{ExtractedFile, ExtractedTree};

/// Default decompressed budget: 200 MiB.
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: u64 = 200 * 1024 * 1024;
/// Default cap on accepted files.
pub const DEFAULT_MAX_FILE_COUNT: usize = 10_000;

/// Extraction limits and filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Directory below the archive root that holds the documents.
    pub docs_dir: String,
    /// Accepted file extension, without the dot. Compared case-insensitively.
    pub extension: String,
    pub max_decompressed_bytes: u64,
    pub max_file_count: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            docs_dir: "docs".to_string(),
            extension: "md".to_string(),
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
            max_file_count: DEFAULT_MAX_FILE_COUNT,
        }
    }
}

/// Decompress and unpack `reader`, returning the accepted documents.
pub fn extract_docs<R: Read>(reader: R, config: &ExtractConfig) -> Result<ExtractedTree, DocsError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(DocsError::from_read_error)?;

    let mut tree = ExtractedTree::new();
    let mut extracted: u64 = 0;

    for entry in entries {
        let mut entry = entry.map_err(DocsError::from_read_error)?;

        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(rel) = docs_relative(&name, &config.docs_dir) else {
            continue;
        };
        let Some(path) = confine(rel) else {
            tracing::debug!(entry = %name, "skipping unsafe archive path");
            continue;
        };

        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        if !has_extension(&path, &config.extension) {
            continue;
        }

        let size = entry.size();
        if size > config.max_decompressed_bytes - extracted {
            return Err(DocsError::SizeLimitExceeded(format!(
                "archive exceeds maximum decompressed size: extracted {} bytes, next file ({}, {} bytes) would exceed limit of {} bytes",
                extracted, name, size, config.max_decompressed_bytes
            )));
        }
        if tree.len() >= config.max_file_count {
            return Err(DocsError::SizeLimitExceeded(format!(
                "archive exceeds maximum file count of {}",
                config.max_file_count
            )));
        }

        let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
        (&mut entry)
            .take(size)
            .read_to_end(&mut data)
            .map_err(DocsError::from_read_error)?;
        if data.len() as u64 != size {
            return Err(DocsError::MalformedArchive(format!(
                "entry {} is truncated: expected {} bytes, read {}",
                name,
                size,
                data.len()
            )));
        }

        extracted += size;
        tree.insert(ExtractedFile { path, data });
    }

    if tree.is_empty() {
        return Err(DocsError::EmptyArchive);
    }
    Ok(tree)
}

/// Strip the synthetic root and the docs directory from an entry name.
fn docs_relative<'a>(name: &'a str, docs_dir: &str) -> Option<&'a str> {
    let (_, rest) = name.split_once('/')?;
    let rel = rest.strip_prefix(docs_dir)?.strip_prefix('/')?;
    if rel.is_empty() {
        None
    } else {
        Some(rel)
    }
}

/// Canonicalize a relative path, or `None` if it could escape the root.
fn confine(rel: &str) -> Option<String> {
    if rel.contains('\\') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str()?;
                if is_drive_prefix(part) {
                    return None;
                }
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn is_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn has_extension(path: &str, extension: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, Header};

    enum Item<'a> {
        File(&'a str, &'a [u8]),
        Dir(&'a str),
        Symlink(&'a str, &'a str),
        /// Written with the name copied verbatim into the header.
        Raw(&'a str, &'a [u8]),
    }

    fn archive(items: &[Item]) -> Vec<u8> {
        let enc = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(enc);
        for item in items {
            match item {
                Item::File(path, data) => {
                    let mut header = Header::new_gnu();
                    header.set_size(data.len() as u64);
                    header.set_mode(0o644);
                    header.set_entry_type(EntryType::Regular);
                    builder.append_data(&mut header, path, *data).unwrap();
                }
                Item::Dir(path) => {
                    let mut header = Header::new_gnu();
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_entry_type(EntryType::Directory);
                    builder.append_data(&mut header, path, std::io::empty()).unwrap();
                }
                Item::Symlink(path, target) => {
                    let mut header = Header::new_gnu();
                    header.set_size(0);
                    header.set_mode(0o777);
                    header.set_entry_type(EntryType::Symlink);
                    builder.append_link(&mut header, path, target).unwrap();
                }
                Item::Raw(name, data) => {
                    let mut header = Header::new_gnu();
                    let raw = name.as_bytes();
                    header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
                    header.set_size(data.len() as u64);
                    header.set_mode(0o644);
                    header.set_entry_type(EntryType::Regular);
                    header.set_cksum();
                    builder.append(&header, *data).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn paths(tree: &ExtractedTree) -> Vec<&str> {
        tree.paths().collect()
    }

    #[test]
    fn test_keeps_only_markdown_under_docs() {
        let bytes = archive(&[
            Item::Dir("docs-main/"),
            Item::Dir("docs-main/docs/"),
            Item::File("docs-main/docs/intro.md", b"# Intro\n"),
            Item::File("docs-main/docs/guides/NOTES.MD", b"upper"),
            Item::File("docs-main/docs/images/logo.png", b"\x89PNG"),
            Item::File("docs-main/README.md", b"not docs"),
            Item::File("docs-main/LICENSE", b"Apache"),
            Item::File("docs-main/docsearch/x.md", b"lookalike dir"),
        ]);

        let tree = extract_docs(&bytes[..], &ExtractConfig::default()).unwrap();
        assert_eq!(paths(&tree), vec!["guides/NOTES.MD", "intro.md"]);
        assert_eq!(tree.get("intro.md"), Some(&b"# Intro\n"[..]));
        assert_eq!(tree.total_bytes(), 13);
    }

    #[test]
    fn test_entries_without_root_are_skipped() {
        let bytes = archive(&[
            Item::File("intro.md", b"no root"),
            Item::File("docs-main/docs/kept.md", b"ok"),
        ]);
        let tree = extract_docs(&bytes[..], &ExtractConfig::default()).unwrap();
        assert_eq!(paths(&tree), vec!["kept.md"]);
    }

    #[test]
    fn test_traversal_and_absolute_paths_are_excluded() {
        let bytes = archive(&[
            Item::Raw("docs-main/docs/../../etc/passwd.md", b"evil"),
            Item::Raw("docs-main/docs/a/../../b.md", b"evil"),
            Item::Raw("docs-main/docs//etc/shadow.md", b"evil"),
            Item::Raw("docs-main/docs/dir\\..\\up.md", b"evil"),
            Item::Raw("docs-main/docs/C:/win.md", b"evil"),
            Item::File("docs-main/docs/safe.md", b"safe"),
        ]);

        let tree = extract_docs(&bytes[..], &ExtractConfig::default()).unwrap();
        assert_eq!(paths(&tree), vec!["safe.md"]);
    }

    #[test]
    fn test_current_dir_components_are_dropped() {
        let bytes = archive(&[Item::Raw("docs-main/docs/./guide/./setup.md", b"x")]);
        let tree = extract_docs(&bytes[..], &ExtractConfig::default()).unwrap();
        assert_eq!(paths(&tree), vec!["guide/setup.md"]);
    }

    #[test]
    fn test_symlinks_are_skipped() {
        let bytes = archive(&[
            Item::Symlink("docs-main/docs/link.md", "/etc/passwd"),
            Item::File("docs-main/docs/real.md", b"real"),
        ]);
        let tree = extract_docs(&bytes[..], &ExtractConfig::default()).unwrap();
        assert_eq!(paths(&tree), vec!["real.md"]);
    }

    #[test]
    fn test_decompressed_limit_aborts() {
        let big = vec![b'a'; 300];
        let bytes = archive(&[
            Item::File("docs-main/docs/a.md", b"small"),
            Item::File("docs-main/docs/b.md", &big),
        ]);
        let config = ExtractConfig {
            max_decompressed_bytes: 100,
            ..ExtractConfig::default()
        };

        match extract_docs(&bytes[..], &config) {
            Err(DocsError::SizeLimitExceeded(msg)) => {
                assert!(msg.contains("maximum decompressed size"), "{msg}")
            }
            other => panic!("expected SizeLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_decompressed_limit_is_inclusive() {
        let bytes = archive(&[
            Item::File("docs-main/docs/a.md", b"12345"),
            Item::File("docs-main/docs/b.md", b"67890"),
        ]);
        let config = ExtractConfig {
            max_decompressed_bytes: 10,
            ..ExtractConfig::default()
        };
        let tree = extract_docs(&bytes[..], &config).unwrap();
        assert_eq!(tree.total_bytes(), 10);
    }

    #[test]
    fn test_file_count_limit() {
        let names: Vec<String> = (0..4)
            .map(|i| format!("docs-main/docs/f{i}.md"))
            .collect();
        let items: Vec<Item> = names.iter().map(|n| Item::File(n, b"x")).collect();
        let bytes = archive(&items);

        let exact = ExtractConfig {
            max_file_count: 4,
            ..ExtractConfig::default()
        };
        assert_eq!(extract_docs(&bytes[..], &exact).unwrap().len(), 4);

        let tight = ExtractConfig {
            max_file_count: 3,
            ..ExtractConfig::default()
        };
        match extract_docs(&bytes[..], &tight) {
            Err(DocsError::SizeLimitExceeded(msg)) => {
                assert_eq!(msg, "archive exceeds maximum file count of 3")
            }
            other => panic!("expected SizeLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_archive() {
        let bytes = archive(&[
            Item::File("docs-main/LICENSE", b"Apache"),
            Item::File("docs-main/docs/logo.svg", b"<svg/>"),
        ]);
        assert!(matches!(
            extract_docs(&bytes[..], &ExtractConfig::default()),
            Err(DocsError::EmptyArchive)
        ));
    }

    #[test]
    fn test_custom_docs_dir_and_extension() {
        let bytes = archive(&[
            Item::File("site-v1/content/index.txt", b"hello"),
            Item::File("site-v1/content/index.md", b"skip"),
        ]);
        let config = ExtractConfig {
            docs_dir: "content".into(),
            extension: "txt".into(),
            ..ExtractConfig::default()
        };
        let tree = extract_docs(&bytes[..], &config).unwrap();
        assert_eq!(paths(&tree), vec!["index.txt"]);
    }

    #[test]
    fn test_not_gzip_is_malformed() {
        let result = extract_docs(&b"definitely not a gzip stream"[..], &ExtractConfig::default());
        assert!(matches!(result, Err(DocsError::MalformedArchive(_))));
    }

    #[test]
    fn test_corrupt_size_field_is_malformed() {
        let enc = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(enc);
        let mut header = Header::new_gnu();
        header.set_path("docs-main/docs/bad.md").unwrap();
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.as_old_mut().size = *b"-0000000001\0";
        header.set_cksum();
        builder.append(&header, std::io::empty()).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        assert!(matches!(
            extract_docs(&bytes[..], &ExtractConfig::default()),
            Err(DocsError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_truncated_archive_is_malformed() {
        let body = vec![b'z'; 4096];
        let bytes = archive(&[Item::File("docs-main/docs/a.md", &body)]);

        let mut decoded = Vec::new();
        GzDecoder::new(&bytes[..]).read_to_end(&mut decoded).unwrap();
        decoded.truncate(512 + 1024);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut enc, &decoded).unwrap();
        let truncated = enc.finish().unwrap();

        assert!(matches!(
            extract_docs(&truncated[..], &ExtractConfig::default()),
            Err(DocsError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_confine() {
        assert_eq!(confine("a/b.md").as_deref(), Some("a/b.md"));
        assert_eq!(confine("./a//b.md").as_deref(), Some("a/b.md"));
        assert_eq!(confine("../a.md"), None);
        assert_eq!(confine("/a.md"), None);
        assert_eq!(confine("a\\b.md"), None);
        assert_eq!(confine("D:foo.md"), None);
        assert_eq!(confine("."), None);
    }
}
