use crate::store::local::DB_FILE_NAME;
use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/studygroup.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "studygroup-store-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

pub fn export_store_bundle(store_dir: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = store_dir.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "store database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let sha256 = hex_digest(&db_bytes);

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;
    tracing::info!(
        "exported store {} to {}",
        store_dir.to_string_lossy(),
        out_path.to_string_lossy()
    );

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        sha256,
    })
}

/// A backup that passed every check, held in memory until installed.
#[derive(Debug)]
pub struct PreparedImport {
    format: &'static str,
    db_bytes: Vec<u8>,
}

/// Read and verify a bundle (or a bare SQLite file) without touching any
/// store.
pub fn prepare_import(in_path: &Path) -> anyhow::Result<PreparedImport> {
    if !is_zip_file(in_path)? {
        let db_bytes = std::fs::read(in_path).with_context(|| {
            format!(
                "failed to read legacy sqlite backup {}",
                in_path.to_string_lossy()
            )
        })?;
        return Ok(PreparedImport {
            format: LEGACY_SQLITE_FORMAT,
            db_bytes,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {}", DB_ENTRY))?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = hex_digest(&db_bytes);
    if actual != expected {
        return Err(anyhow!(
            "database checksum mismatch: expected {}, got {}",
            expected,
            actual
        ));
    }

    Ok(PreparedImport {
        format: BUNDLE_FORMAT_V1,
        db_bytes,
    })
}

impl PreparedImport {
    pub fn bundle_format(&self) -> &str {
        self.format
    }

    /// Swap the database file in `store_dir`. The store must be closed by
    /// the caller and reopened afterwards.
    pub fn install(self, store_dir: &Path) -> anyhow::Result<ImportSummary> {
        std::fs::create_dir_all(store_dir).with_context(|| {
            format!(
                "failed to create store directory {}",
                store_dir.to_string_lossy()
            )
        })?;
        let dst = store_dir.join(DB_FILE_NAME);
        let tmp_dst = store_dir.join(format!("{}.importing", DB_FILE_NAME));
        if tmp_dst.exists() {
            let _ = std::fs::remove_file(&tmp_dst);
        }
        {
            let mut db_out = File::create(&tmp_dst).with_context(|| {
                format!(
                    "failed to create temp database {}",
                    tmp_dst.to_string_lossy()
                )
            })?;
            db_out
                .write_all(&self.db_bytes)
                .context("failed to write extracted database")?;
            db_out
                .flush()
                .context("failed to flush extracted database")?;
        }

        if dst.exists() {
            std::fs::remove_file(&dst).with_context(|| {
                format!(
                    "failed to remove existing database {}",
                    dst.to_string_lossy()
                )
            })?;
        }
        std::fs::rename(&tmp_dst, &dst).with_context(|| {
            format!(
                "failed to move extracted database to {}",
                dst.to_string_lossy()
            )
        })?;
        tracing::info!("installed {} backup into {}", self.format, store_dir.to_string_lossy());

        Ok(ImportSummary {
            bundle_format_detected: self.format.to_string(),
        })
    }
}

/// Verify and restore in one step, for callers with no open store.
pub fn import_store_bundle(in_path: &Path, store_dir: &Path) -> anyhow::Result<ImportSummary> {
    prepare_import(in_path)?.install(store_dir)
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
