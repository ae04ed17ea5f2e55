//! Compile database ingestion and per-file argument resolution.
//!
//! A compile database is a JSON array of entries
//! `{ directory, file, command | arguments }`. Entries are keyed by the
//! absolute path of `file` resolved against `directory`. For every entry
//! the raw command line goes through a fixed normalization pipeline before
//! the frontend ever sees it: tokenize, strip the compiler invocation and
//! output/input naming, absolutize include paths, sanitize via the rule
//! table, inject the builtin headers.

use crate::{
    config::ProjectPathsConfig,
    utils,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

pub mod sanitize;
pub use sanitize::{Rule, RuleKind, RuleSet, RulesInfo};

/// Raw compile database entry. When both `command` and `arguments` are
/// present, `arguments` wins.
#[derive(Debug, Deserialize)]
struct RawEntry {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// Summary of the loaded database for introspection.
#[derive(Clone, Debug, Serialize)]
pub struct CompileCommandsStats {
    pub path: PathBuf,
    pub entries: usize,
    pub fallback_mode: bool,
    pub content_hash: String,
}

/// The per-file argument cache captured at load time.
#[derive(Debug)]
pub struct CompileCommands {
    path: PathBuf,
    root: PathBuf,
    rules: RuleSet,
    /// Builtin header directory appended as `-isystem` when known.
    builtin_include: Option<PathBuf>,
    commands: HashMap<PathBuf, Vec<String>>,
    content_hash: String,
    fallback_mode: bool,
}

impl CompileCommands {
    /// Loads the database referenced by the project paths. A missing or
    /// unreadable database puts the cache into fallback mode instead of
    /// failing.
    pub fn load(paths: &ProjectPathsConfig, builtin_include: Option<PathBuf>) -> Self {
        let rules = RuleSet::load(paths.sanitize_rules.as_deref());
        let mut commands = Self {
            path: paths.compile_commands.clone(),
            root: paths.root.clone(),
            rules,
            builtin_include,
            commands: HashMap::new(),
            content_hash: String::new(),
            fallback_mode: false,
        };
        commands.reload();
        commands
    }

    /// Re-reads the database from disk, replacing the whole cache
    /// atomically from the caller's perspective.
    pub fn reload(&mut self) {
        self.commands.clear();
        self.content_hash.clear();
        self.fallback_mode = false;

        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    "compile database \"{}\" not readable ({err}), entering fallback mode",
                    self.path.display()
                );
                self.fallback_mode = true;
                return;
            }
        };
        self.content_hash = utils::content_hash_bytes(&bytes);

        let entries: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                error!(
                    "compile database \"{}\" is malformed ({err}), entering fallback mode",
                    self.path.display()
                );
                self.fallback_mode = true;
                return;
            }
        };

        for value in entries {
            let entry: RawEntry = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping malformed compile database entry: {err}");
                    continue;
                }
            };
            let Some((file, args)) = self.normalize_entry(entry) else { continue };
            self.commands.insert(file, args);
        }
        debug!(
            "loaded {} compile database entries from \"{}\"",
            self.commands.len(),
            self.path.display()
        );
    }

    /// Runs one raw entry through the normalization pipeline, returning
    /// the absolute file key and the frontend-ready argument vector.
    fn normalize_entry(&self, entry: RawEntry) -> Option<(PathBuf, Vec<String>)> {
        let file = if entry.file.is_absolute() {
            entry.file.clone()
        } else {
            entry.directory.join(&entry.file)
        };
        let file = utils::normalized(&file);

        let raw = match (entry.arguments, entry.command) {
            (Some(arguments), _) if !arguments.is_empty() => arguments,
            (_, Some(command)) => utils::split_command_line(&command),
            _ => {
                warn!("compile database entry for \"{}\" has no command", file.display());
                return None;
            }
        };
        if raw.is_empty() {
            return None;
        }

        let stripped = strip_io_arguments(&raw[1..], &entry.directory, &file);
        let absolutized = absolutize_include_paths(stripped, &entry.directory);
        let mut sanitized = self.rules.sanitize(&absolutized);
        self.inject_builtin_headers(&mut sanitized);
        Some((file, sanitized))
    }

    /// Appends `-isystem <builtin dir>` exactly once.
    fn inject_builtin_headers(&self, args: &mut Vec<String>) {
        let Some(dir) = &self.builtin_include else { return };
        let dir = dir.to_string_lossy().into_owned();
        let already_present = args
            .windows(2)
            .any(|pair| pair[0] == "-isystem" && pair[1] == dir);
        if !already_present {
            args.push("-isystem".to_string());
            args.push(dir);
        }
    }

    /// Returns the normalized argument vector for the file, or `None`
    /// when the database has no entry for it.
    pub fn args_for(&self, file: &Path) -> Option<Vec<String>> {
        self.commands.get(&utils::normalized(file)).cloned()
    }

    /// Returns the entry's arguments, falling back to the hardcoded
    /// default set when enabled.
    pub fn args_with_fallback(&self, file: &Path, fallback_enabled: bool) -> Option<Vec<String>> {
        match self.args_for(file) {
            Some(args) => Some(args),
            None if fallback_enabled => Some(self.fallback_args()),
            None => None,
        }
    }

    /// Platform-conditioned defaults used when the database has no entry
    /// for a file.
    pub fn fallback_args(&self) -> Vec<String> {
        let mut args = vec![
            "-std=c++17".to_string(),
            format!("-I{}", self.root.display()),
            "-DNOMINMAX".to_string(),
        ];
        cfg_if::cfg_if! {
            if #[cfg(windows)] {
                args.extend(windows_sdk_includes());
            }
        }
        self.inject_builtin_headers(&mut args);
        args
    }

    /// The full file-to-arguments map, for diffing against a reloaded
    /// database.
    pub fn file_to_args(&self) -> &HashMap<PathBuf, Vec<String>> {
        &self.commands
    }

    /// Content hash of the database file at load time, empty when absent.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// `true` when no database could be loaded and hardcoded defaults
    /// apply.
    pub fn is_fallback(&self) -> bool {
        self.fallback_mode
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn stats(&self) -> CompileCommandsStats {
        CompileCommandsStats {
            path: self.path.clone(),
            entries: self.commands.len(),
            fallback_mode: self.fallback_mode,
            content_hash: self.content_hash.clone(),
        }
    }

    pub fn rules_info(&self) -> RulesInfo {
        self.rules.info()
    }
}

/// Drops the output and input naming tokens: `-o <x>`, `-c` and the
/// source file itself.
fn strip_io_arguments(args: &[String], directory: &Path, file: &Path) -> Vec<String> {
    let mut stripped = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-o" {
            iter.next();
            continue;
        }
        if arg == "-c" {
            continue;
        }
        if !arg.starts_with('-') && names_source_file(arg, directory, file) {
            continue;
        }
        stripped.push(arg.clone());
    }
    stripped
}

fn names_source_file(arg: &str, directory: &Path, file: &Path) -> bool {
    let candidate = Path::new(arg);
    let candidate =
        if candidate.is_absolute() { candidate.to_path_buf() } else { directory.join(candidate) };
    utils::normalized(&candidate) == *file
}

/// Converts `-I<rel>`, `-I <rel>` and `-isystem <rel>` to absolute paths
/// rooted at the entry's directory.
fn absolutize_include_paths(args: Vec<String>, directory: &Path) -> Vec<String> {
    let absolutize = |raw: &str| -> String {
        let path = Path::new(raw);
        if path.is_absolute() {
            raw.to_string()
        } else {
            directory.join(path).to_string_lossy().into_owned()
        }
    };

    let mut result = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "-I" || arg == "-isystem" {
            result.push(arg);
            if let Some(path) = iter.next() {
                result.push(absolutize(&path));
            }
        } else if let Some(rel) = arg.strip_prefix("-I") {
            result.push(format!("-I{}", absolutize(rel)));
        } else if let Some(rel) = arg.strip_prefix("-isystem") {
            result.push(format!("-isystem{}", absolutize(rel)));
        } else {
            result.push(arg);
        }
    }
    result
}

#[cfg(windows)]
fn windows_sdk_includes() -> Vec<String> {
    // Sweep the newest installed Windows 10/11 SDK include sets.
    let mut args = Vec::new();
    let kits = PathBuf::from(r"C:\Program Files (x86)\Windows Kits\10\Include");
    let Ok(read) = std::fs::read_dir(&kits) else { return args };
    let mut versions: Vec<PathBuf> = read.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    versions.sort();
    if let Some(version) = versions.last() {
        for subdir in ["ucrt", "um", "shared", "winrt"] {
            let dir = version.join(subdir);
            if dir.is_dir() {
                args.push("-isystem".to_string());
                args.push(dir.to_string_lossy().into_owned());
            }
        }
    }
    args
}
