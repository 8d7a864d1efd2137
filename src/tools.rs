/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/tools.rs
 * Responsibility: The four sandboxed tools: list, read, write, execute
 */

use crate::error::ToolError;
use crate::sandbox::Sandbox;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_MAX_CHARS: usize = 10_000;
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub max_chars: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Which files `execute_script` accepts and how it runs them.
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    /// Required extension, without the dot.
    pub extension: String,
    pub interpreter: String,
    pub timeout: Duration,
}

impl Default for ScriptPolicy {
    fn default() -> Self {
        Self {
            extension: "py".to_string(),
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: file_size={} bytes, is_dir={}",
            self.name, self.size, self.is_dir
        )
    }
}

/// Immediate entries of one directory, in the order the filesystem yields them.
#[derive(Debug, Clone, Default)]
pub struct DirectoryListing {
    pub entries: Vec<DirectoryEntry>,
}

impl fmt::Display for DirectoryListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileContent {
    pub text: String,
    pub truncated: bool,
}

impl fmt::Display for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub path: String,
    pub chars_written: usize,
}

impl fmt::Display for WriteReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully wrote to \"{}\" ({} characters written)",
            self.path, self.chars_written
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutput {
    /// Both streams were empty.
    Silent,
    Captured {
        stdout: String,
        stderr: String,
        /// `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
    },
}

impl fmt::Display for ScriptOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptOutput::Silent => f.write_str("No output produced."),
            ScriptOutput::Captured {
                stdout,
                stderr,
                exit_code,
            } => {
                write!(f, "STDOUT: {}\nSTDERR: {}", stdout.trim_end(), stderr.trim_end())?;
                match exit_code {
                    Some(0) => Ok(()),
                    Some(code) => write!(f, "\nProcess exited with code {}", code),
                    None => f.write_str("\nProcess terminated by signal"),
                }
            }
        }
    }
}

pub fn list_directory(sandbox: &Sandbox, directory: Option<&str>) -> Result<DirectoryListing, ToolError> {
    let rel = directory.filter(|d| !d.is_empty()).unwrap_or(".");
    let target = sandbox.resolve(rel, "list")?;
    if !target.is_dir() {
        return Err(ToolError::NotADirectory {
            path: rel.to_string(),
        });
    }

    let mut listing = DirectoryListing::default();
    for entry in fs::read_dir(&target).map_err(|e| ToolError::io(rel, e))? {
        let entry = entry.map_err(|e| ToolError::io(rel, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = fs::metadata(entry.path())
            .map_err(|e| ToolError::io(Path::new(rel).join(&name).to_string_lossy(), e))?;
        listing.entries.push(DirectoryEntry {
            name,
            size: meta.len(),
            is_dir: meta.is_dir(),
        });
    }

    debug!(directory = rel, entries = listing.entries.len(), "listed directory");
    Ok(listing)
}

pub fn read_file(sandbox: &Sandbox, file_path: &str, limits: ReadLimits) -> Result<FileContent, ToolError> {
    let target = sandbox.resolve(file_path, "read")?;
    if !target.is_file() {
        return Err(ToolError::NotFound {
            path: file_path.to_string(),
        });
    }

    // A char is at most 4 bytes, so this window always holds max_chars + 1 chars
    // when the file is that long.
    let window = (limits.max_chars as u64 + 1).saturating_mul(4);
    let mut bytes = Vec::new();
    File::open(&target)
        .and_then(|file| BufReader::new(file).take(window).read_to_end(&mut bytes))
        .map_err(|e| ToolError::io(file_path, e))?;

    let (valid, decode_error) = match std::str::from_utf8(&bytes) {
        Ok(text) => (text, None),
        Err(err) => (
            // valid_up_to() bounds a well-formed prefix.
            std::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
            Some(err),
        ),
    };

    if let Some((cut, _)) = valid.char_indices().nth(limits.max_chars) {
        let mut text = valid[..cut].to_string();
        text.push_str(&truncation_marker(file_path, limits.max_chars));
        return Ok(FileContent { text, truncated: true });
    }

    if let Some(err) = decode_error {
        return Err(ToolError::io(
            file_path,
            io::Error::new(io::ErrorKind::InvalidData, err),
        ));
    }

    Ok(FileContent {
        text: valid.to_string(),
        truncated: false,
    })
}

pub(crate) fn truncation_marker(file_path: &str, max_chars: usize) -> String {
    format!("\n[...File \"{}\" truncated at {} characters]", file_path, max_chars)
}

pub fn write_file(sandbox: &Sandbox, file_path: &str, content: &str) -> Result<WriteReceipt, ToolError> {
    let target = sandbox.resolve(file_path, "write")?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ToolError::io(file_path, e))?;
    }
    fs::write(&target, content).map_err(|e| ToolError::io(file_path, e))?;

    Ok(WriteReceipt {
        path: file_path.to_string(),
        chars_written: content.chars().count(),
    })
}

pub async fn execute_script(
    sandbox: &Sandbox,
    file_path: &str,
    args: &[String],
    policy: &ScriptPolicy,
) -> Result<ScriptOutput, ToolError> {
    let target = sandbox.resolve(file_path, "execute")?;

    // Extension first: a wrong extension fails the same way whether or not the file exists.
    let extension = target.extension().and_then(|ext| ext.to_str());
    if extension != Some(policy.extension.as_str()) {
        return Err(ToolError::WrongFileType {
            path: file_path.to_string(),
            extension: policy.extension.clone(),
        });
    }
    if !target.is_file() {
        return Err(ToolError::NotFound {
            path: file_path.to_string(),
        });
    }

    let mut command = Command::new(&policy.interpreter);
    command
        .arg(&target)
        .args(args)
        .current_dir(sandbox.root())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(policy.timeout, command.output())
        .await
        .map_err(|_| ToolError::Timeout {
            path: file_path.to_string(),
            secs: policy.timeout.as_secs(),
        })?
        .map_err(|source| ToolError::Launch { source })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!(
        file = file_path,
        status = ?output.status.code(),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "script finished"
    );

    if stdout.is_empty() && stderr.is_empty() {
        return Ok(ScriptOutput::Silent);
    }

    Ok(ScriptOutput::Captured {
        stdout,
        stderr,
        exit_code: output.status.code(),
    })
}
