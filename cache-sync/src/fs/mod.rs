//! File system helpers: hashing, cache traversal and entry locks.

pub mod hash;
pub mod lock;
pub mod walker;

/// Temp-file builder for files that are later renamed into place.
///
/// tempfile creates files as 0600; installed files must be readable like
/// any other file, so request 0666 and let the umask apply.
pub(crate) fn install_tempfile_builder<'a, 'b>(prefix: &'a str, suffix: &'b str) -> tempfile::Builder<'a, 'b> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder
}
