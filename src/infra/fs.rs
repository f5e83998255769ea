//! # File System Operations Module / 文件系统操作模块
//!
//! Per-entry workspaces, source copies and artifact directories.
//!
//! 每个条目的工作区、源码副本和产物目录。

use anyhow::{Context, Result};
use fs_extra::dir::{copy, CopyOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Replaces anything that is not alphanumeric, `-` or `_` so a name can be
/// used in paths and container names.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// An identifier-safe form of an entry name that keeps distinct names distinct.
/// Lowercase ASCII letters, digits and `-` pass through; every other byte is
/// written as `_` plus two hex digits, so `py3.9`, `py3_9` and `Py3_9` never collide.
///
/// 条目名称的标识符安全形式，且不同名称保持不同。
/// 小写 ASCII 字母、数字和 `-` 原样保留；其他字节写为 `_` 加两位十六进制，
/// 因此 `py3.9`、`py3_9` 与 `Py3_9` 永远不会冲突。
pub fn entry_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            slug.push(char::from(byte));
        } else {
            slug.push_str(&format!("_{byte:02x}"));
        }
    }
    slug
}

/// Creates a unique temporary workspace for one entry.
/// The prefix carries the entry name so concurrent entries never share a directory,
/// and the directory is removed when the returned `TempDir` is dropped.
///
/// 为单个条目创建唯一的临时工作区。
/// 前缀包含条目名称，使并发条目永远不会共享目录；返回的 `TempDir` 被丢弃时目录会被删除。
pub fn create_entry_workspace(entry_name: &str) -> Result<TempDir> {
    let prefix = format!("env_matrix_{}_", sanitize_name(entry_name));
    tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir()
        .with_context(|| format!("Failed to create workspace for entry '{entry_name}'"))
}

/// Copies the content of `from` into `to`, skipping nothing.
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)
        .with_context(|| format!("Failed to create directory: {}", to.display()))?;
    let mut options = CopyOptions::new();
    options.overwrite = true;
    options.content_only = true;
    copy(from, to, &options).with_context(|| {
        format!("Failed to copy '{}' to '{}'", from.display(), to.display())
    })?;
    Ok(())
}

/// Returns (and creates) the directory that holds one entry's artifacts.
/// 返回（并创建）保存单个条目产物的目录。
pub fn entry_artifact_dir(artifacts_dir: &Path, entry_name: &str) -> Result<PathBuf> {
    let dir = artifacts_dir.join(entry_slug(entry_name));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create artifact directory: {}", dir.display()))?;
    Ok(dir)
}

/// Gets the absolute path from a potentially relative path.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}
