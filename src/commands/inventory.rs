use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;
use walkdir::WalkDir;

use crate::cli::InventoryArgs;
use crate::model::{CorpusEntry, CorpusManifest};
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.corpus_root)?;

    if args.dry_run {
        info!(
            document_count = manifest.document_count,
            corpus_root = %manifest.corpus_root,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| default_manifest_path(&args.cache_root));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote corpus manifest");
    info!(document_count = manifest.document_count, "inventory completed");

    Ok(())
}

pub fn default_manifest_path(cache_root: &Path) -> PathBuf {
    cache_root.join("manifests").join("corpus_inventory.json")
}

pub fn build_manifest(corpus_root: &Path) -> Result<CorpusManifest> {
    if !corpus_root.is_dir() {
        bail!("corpus root does not exist: {}", corpus_root.display());
    }

    let mut paths = discover_inspection_pdfs(corpus_root)?;
    paths.sort();
    paths.dedup();

    if paths.is_empty() {
        bail!("no inspection PDFs found in {}", corpus_root.display());
    }

    let documents = paths
        .iter()
        .map(|path| CorpusEntry {
            path: path.display().to_string(),
            owner_key: owner_key_for(path),
        })
        .collect::<Vec<_>>();

    Ok(CorpusManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        corpus_root: corpus_root.display().to_string(),
        document_count: documents.len(),
        documents,
    })
}

pub(crate) fn discover_inspection_pdfs(corpus_root: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    for entry in WalkDir::new(corpus_root) {
        let entry =
            entry.with_context(|| format!("failed to walk {}", corpus_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        if is_inspection_pdf(entry.path()) {
            pdfs.push(entry.into_path());
        }
    }

    Ok(pdfs)
}

pub fn is_inspection_pdf(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    is_pdf && name.starts_with("inspection_")
}

/// Kennel folders are named `<LICENSE>_<NAME>`; the license number is the owner key.
pub fn owner_key_for(path: &Path) -> String {
    path.parent()
        .and_then(|parent| parent.file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('_').next())
        .map(|key| key.trim().to_string())
        .unwrap_or_default()
}
