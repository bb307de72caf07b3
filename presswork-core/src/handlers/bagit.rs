//! BagIt manifest generation, the final step of batch assembly. Walks the
//! payload tree, hashes every file, and writes the manifest plus the bag
//! declaration.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{load_batch, HandlerContext};
use crate::error::{EngineError, Result};
use crate::fsutil::write_atomic;

const BAGIT_DECLARATION: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

pub async fn write_bagit_manifest(ctx: &HandlerContext<'_>) -> Result<()> {
    let batch = load_batch(ctx).await?;
    if batch.location.is_empty() {
        return Err(EngineError::Precondition(format!(
            "batch {} has no on-disk location",
            batch.id
        )));
    }

    let root = Path::new(&batch.location);
    let data = root.join("data");
    if !data.is_dir() {
        return Err(EngineError::Precondition(format!(
            "batch payload directory {} is missing",
            data.display()
        )));
    }

    ctx.logger
        .info(&format!("hashing batch payload under {}", data.display()))
        .await;

    let mut lines = Vec::new();
    for entry in WalkDir::new(&data).sort_by_file_name() {
        let entry = entry.map_err(|e| EngineError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(root).map_err(|e| {
            EngineError::Invariant(format!("walk escaped {}: {e}", root.display()))
        })?;
        let digest = sha256_file(entry.path())?;
        lines.push(format!("{digest}  {}", rel.display()));
    }

    lines.sort();
    let mut manifest = lines.join("\n");
    manifest.push('\n');

    write_atomic(&root.join("manifest-sha256.txt"), manifest.as_bytes())?;
    write_atomic(&root.join("bagit.txt"), BAGIT_DECLARATION.as_bytes())?;

    ctx.logger
        .info(&format!("wrote manifest covering {} file(s)", lines.len()))
        .await;
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
