//! Utility functions

use crate::error::{IndexError, Result};
use md5::{Digest, Md5};
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Extensions of translation units handed to the frontend.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++"];

/// Extensions of header files, tracked through the header tracker rather
/// than the compile database.
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hpp", "hxx", "h++"];

/// Returns `true` if the path has a header extension.
pub fn is_header(path: &Path) -> bool {
    has_extension(path, HEADER_EXTENSIONS)
}

/// Returns `true` if the path has a source (translation unit) extension.
pub fn is_source(path: &Path) -> bool {
    has_extension(path, SOURCE_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
        .unwrap_or_default()
}

/// Returns an iterator that yields all files under `root` carrying one of
/// the given extensions, or `root` itself if it is such a file.
///
/// This also follows symlinks.
pub fn source_files_iter<'a>(
    root: &Path,
    extensions: &'a [&'a str],
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(move |e| has_extension(e.path(), extensions))
        .map(|e| e.path().into())
}

/// Returns a list of absolute paths to all source and header files under
/// the project root.
pub fn project_files(root: &Path) -> Vec<PathBuf> {
    let mut extensions: Vec<&str> = Vec::with_capacity(SOURCE_EXTENSIONS.len() + HEADER_EXTENSIONS.len());
    extensions.extend_from_slice(SOURCE_EXTENSIONS);
    extensions.extend_from_slice(HEADER_EXTENSIONS);
    source_files_iter(root, &extensions).collect()
}

/// Returns only the translation units under the project root, excluding
/// pure headers.
pub fn project_sources(root: &Path) -> Vec<PathBuf> {
    source_files_iter(root, SOURCE_EXTENSIONS).collect()
}

/// Canonicalize the path, resolving symlinks.
///
/// On windows this strips the `\\?\` UNC prefix, same as the frontend
/// reports paths.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    dunce::canonicalize(path).map_err(|err| IndexError::io(err, path))
}

/// Canonicalizes the path where possible and returns the input unchanged
/// where not (e.g. the file no longer exists but parent symlinks should
/// still resolve for cache lookups).
pub fn normalized(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match dunce::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) => match path.parent().and_then(|p| dunce::canonicalize(p).ok()) {
            Some(parent) => match path.file_name() {
                Some(name) => parent.join(name),
                None => parent,
            },
            None => path.to_path_buf(),
        },
    }
}

/// MD5 digest of the file's contents as lowercase hex.
///
/// Used as the change-detection fingerprint; stability matters here, not
/// cryptographic strength.
pub fn content_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = fs::read(path).map_err(|err| IndexError::io(err, path))?;
    Ok(content_hash_bytes(&content))
}

/// MD5 digest of the given bytes as lowercase hex.
pub fn content_hash_bytes(content: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// 16-hex-character fingerprint of an ordered argument list.
///
/// Arguments are joined with `|` before hashing, so the digest is
/// order-sensitive: a permuted list hashes differently.
pub fn hash_args(args: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(args.join("|").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Reads the json file and deserializes it into the provided type.
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| IndexError::io(err, path))?;
    serde_json::from_str(&contents).map_err(Into::into)
}

/// Serializes the value as json to the given path, creating parent
/// directories as needed.
pub fn write_json_file<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir_all(path)?;
    let file = fs::File::create(path).map_err(|err| IndexError::io(err, path))?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|err| IndexError::io(err, path))?;
    Ok(())
}

/// Creates the parent directory of the given file.
pub fn create_parent_dir_all(file: impl AsRef<Path>) -> Result<()> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            IndexError::msg(format!(
                "Failed to create parent directories for \"{}\": {err}",
                file.display()
            ))
        })?;
    }
    Ok(())
}

/// Splits a compile-database `command` string into its argument vector.
///
/// Honors single and double quotes so that quoted paths with whitespace
/// survive as one argument, and backslash escapes outside single quotes.
pub fn split_command_line(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_token = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    has_token = true;
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn can_split_plain_command() {
        assert_eq!(
            split_command_line("clang++ -std=c++17 -c main.cpp -o main.o"),
            args(&["clang++", "-std=c++17", "-c", "main.cpp", "-o", "main.o"])
        );
    }

    #[test]
    fn can_split_quoted_paths() {
        assert_eq!(
            split_command_line(r#"clang++ -I"/opt/my includes" -c 'a b.cpp'"#),
            args(&["clang++", "-I/opt/my includes", "-c", "a b.cpp"])
        );
    }

    #[test]
    fn can_split_escaped_whitespace() {
        assert_eq!(
            split_command_line(r"clang++ -Imy\ dir -c main.cpp"),
            args(&["clang++", "-Imy dir", "-c", "main.cpp"])
        );
    }

    #[test]
    fn arg_hash_is_order_sensitive() {
        let a = args(&["-std=c++17", "-O2"]);
        let b = args(&["-O2", "-std=c++17"]);
        assert_eq!(hash_args(&a), hash_args(&a));
        assert_ne!(hash_args(&a), hash_args(&b));
        assert_eq!(hash_args(&a).len(), 16);
    }

    #[test]
    fn detects_headers_and_sources() {
        assert!(is_header(Path::new("/p/widget.h")));
        assert!(is_header(Path::new("/p/widget.HPP")));
        assert!(is_source(Path::new("/p/widget.cpp")));
        assert!(is_source(Path::new("/p/widget.c++")));
        assert!(!is_header(Path::new("/p/widget.cpp")));
        assert!(!is_source(Path::new("/p/notes.txt")));
    }

    #[test]
    fn content_hash_tracks_bytes() {
        assert_eq!(content_hash_bytes(b"abc"), content_hash_bytes(b"abc"));
        assert_ne!(content_hash_bytes(b"abc"), content_hash_bytes(b"abd"));
    }
}
