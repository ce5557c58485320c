//! Finds, reads and parses the templates named by `#include`.

use crate::error::{Result, TemplateError};
use crate::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_ast::{parse_template, Template};
use tracing::debug;

/// Maps include names onto files below a canonical root directory.
struct IncludePathResolver {
    include_root: PathBuf,
    extension: String,
}

impl IncludePathResolver {
    fn new(include_root: impl AsRef<Path>, extension: &str) -> Result<Self> {
        let include_root = include_root
            .as_ref()
            .canonicalize()
            .map_err(|e| TemplateError::include(format!("invalid include root: {e}")))?;
        Ok(Self {
            include_root,
            extension: extension.to_string(),
        })
    }

    /// `/components/card` becomes `<root>/components/card.<extension>`.
    fn file_for(&self, name: &str) -> PathBuf {
        let mut path = self.include_root.clone();
        path.extend(name.split('/').filter(|segment| !segment.is_empty()));
        path.set_extension(&self.extension);
        path
    }

    /// Fails unless `path`, with symlinks resolved, stays below the root.
    /// Only the part of `path` that exists on disk can be resolved; the
    /// missing tail is appended as written.
    fn check_contained(&self, path: &Path) -> Result<()> {
        let existing = path
            .ancestors()
            .find(|ancestor| ancestor.exists())
            .unwrap_or(path);
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| TemplateError::include(format!("failed to resolve include path: {e}")))?;
        if let Ok(missing) = path.strip_prefix(existing) {
            resolved.extend(missing.components());
        }

        if resolved.starts_with(&self.include_root) {
            Ok(())
        } else {
            Err(TemplateError::include(format!(
                "path traversal detected: {}",
                path.display()
            )))
        }
    }
}

/// Loads and parses included templates for one render.
///
/// Loaded templates are not cached; each `{[#include]}` reads its file.
pub struct TemplateLoader {
    path_resolver: IncludePathResolver,
    strip_whitespace: bool,
    /// Names of the includes currently running, outermost first.
    include_stack: Vec<String>,
}

impl TemplateLoader {
    pub fn new(include_root: impl AsRef<Path>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            path_resolver: IncludePathResolver::new(include_root, &settings.template_extension)?,
            strip_whitespace: settings.strip_whitespace,
            include_stack: Vec::new(),
        })
    }

    /// Load a template by include name, like `/components/card`.
    pub fn load(&self, name: &str) -> Result<Arc<Template>> {
        check_include_name(name)?;

        if self.include_stack.iter().any(|entry| entry == name) {
            return Err(TemplateError::include(format!(
                "circular include detected: {}",
                self.cycle_description(name)
            )));
        }

        let path = self.path_resolver.file_for(name);
        self.path_resolver.check_contained(&path)?;

        if !path.is_file() {
            return Err(TemplateError::include(format!(
                "include file not found: {name} ({})",
                path.display()
            )));
        }

        debug!(name, path = %path.display(), "loading include");
        let source = fs::read_to_string(&path)?;
        let template = parse_template(Some(name), &source, self.strip_whitespace)
            .map_err(|e| TemplateError::include(format!("failed to parse include '{name}': {e}")))?;
        Ok(Arc::new(template))
    }

    /// Marks `name` as running. Loading it again before [`end_include`]
    /// is reported as a cycle.
    ///
    /// [`end_include`]: TemplateLoader::end_include
    pub fn begin_include(&mut self, name: &str) {
        self.include_stack.push(name.to_string());
    }

    pub fn end_include(&mut self) {
        self.include_stack.pop();
    }

    /// `/a -> /b -> /a`, starting from the earlier occurrence of `name`.
    fn cycle_description(&self, name: &str) -> String {
        let mut chain: Vec<&str> = self
            .include_stack
            .iter()
            .skip_while(|entry| *entry != name)
            .map(String::as_str)
            .collect();
        chain.push(name);
        chain.join(" -> ")
    }
}

/// Include names are absolute and `/`-separated. Each segment is an
/// identifier that may also contain `-`.
fn check_include_name(name: &str) -> Result<()> {
    let Some(relative) = name.strip_prefix('/') else {
        return Err(TemplateError::include(format!(
            "include name must start with '/': {name}"
        )));
    };

    if relative.contains("..")
        || relative.contains("//")
        || relative.contains(|c: char| c == '\\' || c == ':')
    {
        return Err(TemplateError::include(format!(
            "invalid include name (path traversal): {name}"
        )));
    }

    match relative.split('/').find(|segment| !is_valid_segment(segment)) {
        Some(segment) => Err(TemplateError::include(format!(
            "invalid include segment '{segment}' in '{name}'"
        ))),
        None => Ok(()),
    }
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
