use crate::fs::SFSError;
use std::path::{Component, Path};

/// Breaks an absolute path into its names, root first. Repeated separators and `.`
/// collapse away, anything that climbs (`..`) or is not rooted is rejected.
pub fn components(path: &Path) -> Result<Vec<&str>, SFSError> {
    let invalid = |why: &str| SFSError::InvalidPath(format!("{}: {}", path.display(), why));

    let mut parts = path.components();
    if parts.next() != Some(Component::RootDir) {
        return Err(invalid("path must start with \"/\""));
    }
    parts
        .map(|part| match part {
            Component::Normal(name) => name.to_str().ok_or_else(|| invalid("not valid UTF-8")),
            Component::ParentDir => Err(invalid("\"..\" is not supported")),
            _ => Err(invalid("unexpected component")),
        })
        .collect()
}

/// Splits a path into its parent's names and the final name.
pub fn split(path: &Path) -> Result<(Vec<&str>, &str), SFSError> {
    let mut names = components(path)?;
    let leaf = names
        .pop()
        .ok_or_else(|| SFSError::InvalidPath("the root has no parent".to_string()))?;
    Ok((names, leaf))
}
