//! Whole-package import resolution
//!
//! Imports are resolved in parallel against a shared [`PackageCache`]. The
//! package itself is only read, so the caller must not mutate it until the
//! report comes back.

use super::{resolve_import, PackageCache};
use crate::entries::EntryRef;
use crate::issues::{IssueKind, RelinkIssue};
use crate::package::Package;
use crate::utils::CancellationToken;
use crate::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// One import and the export backing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResolution {
    /// Import in the package being resolved
    pub import: EntryRef,
    /// File the export was found in
    pub file_name: String,
    /// Export inside that file
    pub export: EntryRef,
}

/// Outcome of resolving every import of a package
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Imports that were found, in table order
    pub resolved: Vec<ImportResolution>,
    /// Misses, failures and skipped imports
    pub issues: Vec<RelinkIssue>,
    /// Set when the token fired before every import was visited
    pub cancelled: bool,
}

enum Outcome {
    Resolved(ImportResolution),
    Issue(RelinkIssue),
    Skipped,
}

/// Resolve every import of `pkg`. Misses and per-import failures become
/// issues; the token is checked before each import.
pub fn resolve_imports_batch(pkg: &Package, cache: &PackageCache, cancel: &CancellationToken) -> BatchReport {
    let outcomes: Vec<Outcome> = (0..pkg.import_count())
        .into_par_iter()
        .map(|slot| {
            if cancel.is_cancelled() {
                return Outcome::Skipped;
            }
            let import = EntryRef::Import(slot);
            match resolve_import(pkg, import, cache) {
                Ok(Some(found)) => Outcome::Resolved(ImportResolution {
                    import,
                    file_name: found.file_name,
                    export: found.export,
                }),
                Ok(None) => Outcome::Issue(RelinkIssue::new(
                    IssueKind::UnresolvedImport,
                    Some(import),
                    format!("{} not found in any candidate package", pkg.instanced_full_path(import)),
                )),
                Err(e) => {
                    warn!(import = %import, error = %e, "import resolution failed");
                    Outcome::Issue(RelinkIssue::new(IssueKind::ItemFailed, Some(import), e.to_string()))
                }
            }
        })
        .collect();

    let mut report = BatchReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Resolved(found) => report.resolved.push(found),
            Outcome::Issue(issue) => report.issues.push(issue),
            Outcome::Skipped => report.cancelled = true,
        }
    }
    info!(
        resolved = report.resolved.len(),
        issues = report.issues.len(),
        cancelled = report.cancelled,
        "import batch finished"
    );
    report
}

/// Run [`resolve_imports_batch`] on a worker thread and hand the report to
/// `on_complete` there.
pub fn resolve_imports_in_background<F>(
    pkg: Arc<Package>,
    cache: Arc<PackageCache>,
    cancel: CancellationToken,
    on_complete: F,
) -> Result<JoinHandle<()>>
where
    F: FnOnce(BatchReport) + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("import-resolver".to_string())
        .spawn(move || {
            let report = resolve_imports_batch(&pkg, &cache, &cancel);
            on_complete(report);
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::fixtures;
    use crate::resolver::tests::source_packages;
    use crate::resolver::MemoryArchive;
    use std::sync::mpsc;

    fn cache() -> PackageCache {
        let archive = MemoryArchive::new("Startup");
        for (name, bytes) in source_packages() {
            archive.insert(name, &bytes).unwrap();
        }
        PackageCache::new(Arc::new(EngineConfig::default())).with_source(Arc::new(archive))
    }

    #[test]
    fn test_batch_reports_hits_and_misses() {
        let pkg = fixtures::sample_package();
        let report = resolve_imports_batch(&pkg, &cache(), &CancellationToken::new());

        let resolved: Vec<String> = report.resolved.iter().map(|r| pkg.instanced_full_path(r.import)).collect();
        assert_eq!(resolved, vec!["Engine.Level", "Engine.StaticMeshActor", "EngineMeshes.Cube"]);
        assert_eq!(report.resolved.len() + report.issues.len(), pkg.import_count());
        assert!(report.issues.iter().all(|i| i.kind == IssueKind::UnresolvedImport));
        assert!(!report.cancelled);
    }

    #[test]
    fn test_cancelled_batch_does_nothing() {
        let pkg = fixtures::sample_package();
        let token = CancellationToken::new();
        token.cancel();
        let report = resolve_imports_batch(&pkg, &cache(), &token);
        assert!(report.cancelled);
        assert!(report.resolved.is_empty() && report.issues.is_empty());
    }

    #[test]
    fn test_background_completion() {
        let (tx, rx) = mpsc::channel();
        let handle = resolve_imports_in_background(
            Arc::new(fixtures::sample_package()),
            Arc::new(cache()),
            CancellationToken::new(),
            move |report| tx.send(report.resolved.len()).unwrap(),
        )
        .unwrap();
        handle.join().unwrap();
        assert_eq!(rx.recv().unwrap(), 3);
    }
}
