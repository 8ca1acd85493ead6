use std::path::{Component, Path};

use crate::TransferError;

const MAX_NAME_BYTES: usize = 255;

/// Validates an artifact name before it is used as a path below a store root.
///
/// Rejects empty or overlong names, NUL bytes, absolute paths, Windows
/// prefixes and any `..` component.
pub fn validate_artifact_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(TransferError::InvalidName(format!(
            "name longer than {MAX_NAME_BYTES} bytes"
        )));
    }
    if name.contains('\0') {
        return Err(TransferError::InvalidName("NUL byte in name".into()));
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(TransferError::InvalidName(format!("absolute path: {name}")));
    }

    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidName(format!(
                    "parent directory traversal: {name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidName(format!("absolute path: {name}")));
            }
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
        }
    }
    if normal == 0 {
        return Err(TransferError::InvalidName(format!("no file name: {name}")));
    }

    Ok(())
}
