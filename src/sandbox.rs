/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/sandbox.rs
 * Responsibility: Path containment for every file-touching tool
 */

use crate::error::ToolError;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The directory all tool operations are confined to.
///
/// Containment is a lexical check: `.` and `..` are folded without touching
/// the filesystem and symlinks are not followed. It keeps a cooperative model
/// from wandering off, it is not a security boundary.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let absolute = std::path::absolute(root.as_ref())?;
        Ok(Self {
            root: normalize(&absolute),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `rel` against the root, rejecting anything that lands outside it.
    /// `action` names the operation in the error ("read", "list", ...).
    pub fn resolve(&self, rel: &str, action: &'static str) -> Result<PathBuf, ToolError> {
        let target = normalize(&self.root.join(rel));
        if target.starts_with(&self.root) {
            Ok(target)
        } else {
            Err(ToolError::Containment {
                action,
                path: rel.to_string(),
            })
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
