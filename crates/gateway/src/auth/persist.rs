// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token snapshot file: load at startup, rewrite atomically after changes.

use std::path::Path;

use crate::auth::TokenSnapshot;

/// Load a snapshot. A missing file is an empty snapshot.
pub fn load(path: &Path) -> anyhow::Result<TokenSnapshot> {
    if !path.exists() {
        return Ok(TokenSnapshot::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let snapshot: TokenSnapshot = serde_json::from_str(&contents)?;
    Ok(snapshot)
}

/// Write a snapshot atomically (write tmp + rename).
///
/// The temp name carries PID and a counter so concurrent saves never share
/// a `.tmp` file.
pub fn save(path: &Path, snapshot: &TokenSnapshot) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
