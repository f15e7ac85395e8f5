//! On-disk stand-in for the simulation binary.
//!
//! The fake binary runs `behaviour.sh` from its working directory (the
//! datapoint directory), so each datapoint can script its own output and
//! exit code.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const BEHAVIOUR_SCRIPT: &str = "behaviour.sh";

/// Write an executable fake simulation binary into `dir`.
#[cfg(unix)]
pub fn write_fake_binary(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join("fake-simulation");
    fs::write(
        &path,
        "#!/bin/sh\nif [ -f ./behaviour.sh ]; then\n  . ./behaviour.sh\nfi\nexit 0\n",
    )?;
    let mut perms = fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms)?;
    Ok(path)
}

/// Script datapoint `id` under `root` with a shell snippet.
pub fn script_datapoint(root: &Path, id: u32, body: &str) -> io::Result<PathBuf> {
    let dir = root.join(format!("datapoint-{id}"));
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(BEHAVIOUR_SCRIPT), body)?;
    Ok(dir)
}

/// Drop both completion artifacts into datapoint `id` under `root`.
pub fn mark_completed(root: &Path, id: u32) -> io::Result<PathBuf> {
    let dir = root.join(format!("datapoint-{id}"));
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("pflotran.out"), "done\n")?;
    fs::write(dir.join("pflotran.h5"), [0u8; 8])?;
    Ok(dir)
}
