//! Catalog build orchestration
//!
//! A build walks a fixed sequence of states:
//!
//! ```text
//! Idle → ListingIcons → HashingIcons → ListingPkgsinfo → ListingPkgs
//!      → LoadingAndVerifying → Aggregating → Pruning → Writing → Done
//! ```
//!
//! Only the three top-level listings can end in `Failed`, and only for
//! store errors other than NotFound. Everything that goes wrong with a
//! single object is recorded in the report and the build carries on.
//!
//! Icon hashing and pkginfo loading fan out over tokio tasks bounded by a
//! semaphore. Each stage joins completely before the next one starts, and
//! results are merged on the orchestrating task in listing order so that
//! repeated builds over the same store produce identical output.

use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::catalog::{aggregate, prune_catalogs, write_catalogs, write_icon_hashes, VerifiedRecord};
use crate::error::{BuildError, StoreError};
use crate::icons::{hash_icon, should_hash, IconHash, IconHashes};
use crate::metadata::{load_pkginfo, LoadedRecord};
use crate::output::OutputSink;
use crate::report::{BuildReport, Diagnostic, DiagnosticKind, ErrorReport};
use crate::store::{is_hidden, ObjectStore, ICONS, PKGS, PKGSINFO};
use crate::verify::{PayloadIndex, PayloadPaths, PayloadVerifier, Verification};

/// Worker count used when none is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Knobs for a single build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Include records that failed payload verification
    pub force: bool,
    /// Do not check payloads at all, and do not list `pkgs/`
    pub skip_payload_check: bool,
    /// Maximum number of objects fetched at once
    pub concurrency: usize,
    pub payload_paths: PayloadPaths,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force: false,
            skip_payload_check: false,
            concurrency: default_concurrency(),
            payload_paths: PayloadPaths::default(),
        }
    }
}

/// Where a build is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    ListingIcons,
    HashingIcons,
    ListingPkgsinfo,
    ListingPkgs,
    LoadingAndVerifying,
    Aggregating,
    Pruning,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Idle => "idle",
            BuildState::ListingIcons => "listing icons",
            BuildState::HashingIcons => "hashing icons",
            BuildState::ListingPkgsinfo => "listing pkgsinfo",
            BuildState::ListingPkgs => "listing pkgs",
            BuildState::LoadingAndVerifying => "loading and verifying pkgsinfo",
            BuildState::Aggregating => "aggregating catalogs",
            BuildState::Pruning => "pruning catalogs",
            BuildState::Writing => "writing catalogs",
            BuildState::Done => "done",
            BuildState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs catalog builds against one store.
pub struct CatalogBuilder {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn OutputSink>,
    options: BuildOptions,
    state: BuildState,
}

impl CatalogBuilder {
    pub fn new(store: Arc<dyn ObjectStore>, sink: Arc<dyn OutputSink>, options: BuildOptions) -> Self {
        Self {
            store,
            sink,
            options,
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Run a full build.
    ///
    /// `Ok` means the build finished, even if the report has entries.
    /// `Err` means a top-level listing could not reach the store.
    pub async fn build(&mut self) -> Result<BuildReport, BuildError> {
        self.state = BuildState::Idle;
        let mut report = ErrorReport::new();

        info!(
            backend = self.store.backend_name(),
            force = self.options.force,
            concurrency = self.options.concurrency,
            "Starting catalog build"
        );

        self.transition(BuildState::ListingIcons);
        let icon_ids: Vec<String> = self
            .list_kind(ICONS, None)
            .await?
            .into_iter()
            .filter(|id| should_hash(id))
            .collect();

        self.transition(BuildState::HashingIcons);
        let icon_hashes = self.hash_icons(icon_ids, &mut report).await;

        self.transition(BuildState::ListingPkgsinfo);
        self.sink.output("Getting list of pkgsinfo...");
        let pkgsinfo_ids: Vec<String> = self
            .list_kind(PKGSINFO, Some(&mut report))
            .await?
            .into_iter()
            .filter(|id| !is_hidden(id))
            .collect();

        self.transition(BuildState::ListingPkgs);
        let index = if self.options.skip_payload_check {
            debug!("Payload check disabled, not listing {}", PKGS);
            PayloadIndex::default()
        } else {
            self.sink.output("Getting list of pkgs...");
            let index = PayloadIndex::new(self.list_kind(PKGS, Some(&mut report)).await?);
            debug!("Indexed {} payloads", index.len());
            index
        };

        self.transition(BuildState::LoadingAndVerifying);
        let loaded = self.load_pkgsinfo(pkgsinfo_ids, &mut report).await;
        let verifier = PayloadVerifier::new(index, self.options.payload_paths.clone());
        let verified = self.verify_all(loaded, &verifier, &mut report);

        self.transition(BuildState::Aggregating);
        let catalogs = aggregate(&verified, self.options.force, &mut report);

        self.transition(BuildState::Pruning);
        let deleted = prune_catalogs(
            self.store.as_ref(),
            &catalogs.populated_names(),
            &mut report,
            self.sink.as_ref(),
        )
        .await;

        self.transition(BuildState::Writing);
        let written =
            write_catalogs(self.store.as_ref(), &catalogs, &mut report, self.sink.as_ref()).await;
        let icon_manifest_written =
            write_icon_hashes(self.store.as_ref(), &icon_hashes, &mut report, self.sink.as_ref())
                .await;

        self.transition(BuildState::Done);
        info!(
            catalogs = written.len(),
            deleted = deleted.len(),
            diagnostics = report.len(),
            "Catalog build finished"
        );

        Ok(BuildReport {
            errors: report,
            catalogs_written: written,
            catalogs_deleted: deleted,
            icons_hashed: icon_hashes.len(),
            icon_manifest_written,
        })
    }

    fn transition(&mut self, next: BuildState) {
        debug!("Catalog build: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, kind: &str, source: StoreError) -> BuildError {
        let state = self.state;
        self.transition(BuildState::Failed);
        let error = BuildError::Listing {
            kind: kind.to_string(),
            state,
            source,
        };
        error.log();
        error
    }

    /// List a top-level kind, sorted.
    ///
    /// A missing kind lists as empty. When `report` is given that is also
    /// recorded, since a repository without pkgsinfo or pkgs is suspicious.
    async fn list_kind(
        &mut self,
        kind: &str,
        report: Option<&mut ErrorReport>,
    ) -> Result<Vec<String>, BuildError> {
        match self.store.list(kind).await {
            Ok(mut identifiers) => {
                identifiers.sort();
                debug!("Listed {} objects under {}", identifiers.len(), kind);
                Ok(identifiers)
            }
            Err(e) if e.is_not_found() => {
                if let Some(report) = report {
                    report.push(
                        DiagnosticKind::NotFound,
                        format!("WARNING: repository has no {kind} directory"),
                    );
                }
                Ok(Vec::new())
            }
            Err(e) => Err(self.fail(kind, e)),
        }
    }

    /// Run `work` once per identifier on a bounded set of tasks.
    ///
    /// Results come back in the order of `identifiers`.
    async fn fan_out<T, F, Fut>(&self, identifiers: &[String], work: F) -> Vec<Result<T, JoinError>>
    where
        F: Fn(Arc<dyn ObjectStore>, String) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(permits(self.options.concurrency)));
        let handles: Vec<_> = identifiers
            .iter()
            .map(|identifier| {
                let semaphore = Arc::clone(&semaphore);
                let task = work(Arc::clone(&self.store), identifier.clone());
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    task.await
                })
            })
            .collect();
        join_all(handles).await
    }

    async fn hash_icons(&self, identifiers: Vec<String>, report: &mut ErrorReport) -> IconHashes {
        if identifiers.is_empty() {
            return IconHashes::new();
        }
        self.sink.output("Calculating icon hashes...");

        let results = self
            .fan_out(&identifiers, |store, identifier| async move {
                hash_icon(store.as_ref(), &identifier).await
            })
            .await;

        let mut hashes = IconHashes::new();
        for (identifier, result) in identifiers.iter().zip(results) {
            match flatten(identifier, result) {
                Ok(IconHash { identifier, digest }) => {
                    hashes.insert(identifier, digest);
                }
                Err(diagnostic) => report.push(diagnostic.kind, diagnostic.message),
            }
        }
        hashes
    }

    async fn load_pkgsinfo(
        &self,
        identifiers: Vec<String>,
        report: &mut ErrorReport,
    ) -> Vec<LoadedRecord> {
        let results = self
            .fan_out(&identifiers, |store, identifier| async move {
                load_pkginfo(store.as_ref(), &identifier).await
            })
            .await;

        let mut loaded = Vec::with_capacity(results.len());
        for (identifier, result) in identifiers.iter().zip(results) {
            match flatten(identifier, result) {
                Ok(record) => loaded.push(record),
                Err(diagnostic) => report.push(diagnostic.kind, diagnostic.message),
            }
        }
        loaded
    }

    fn verify_all(
        &self,
        loaded: Vec<LoadedRecord>,
        verifier: &PayloadVerifier,
        report: &mut ErrorReport,
    ) -> Vec<VerifiedRecord> {
        loaded
            .into_iter()
            .map(|item| {
                if let Some(warning) = item.warning {
                    report.push(warning.kind, warning.message);
                }

                self.sink.output(&format!("Verifying {}...", item.reference));
                let outcome = if self.options.skip_payload_check {
                    Verification {
                        passed: true,
                        messages: Vec::new(),
                    }
                } else {
                    verifier.verify(&item.record, &item.reference)
                };
                for message in outcome.messages {
                    report.push(message.kind, message.message);
                }

                VerifiedRecord {
                    reference: item.reference,
                    record: item.record,
                    passed: outcome.passed,
                }
            })
            .collect()
    }
}

/// Clamp a configured worker count to what a semaphore can hold.
fn permits(concurrency: usize) -> usize {
    concurrency.clamp(1, Semaphore::MAX_PERMITS)
}

/// Fold a task's join result into its per-item result.
fn flatten<T>(
    identifier: &str,
    result: Result<Result<T, Diagnostic>, JoinError>,
) -> Result<T, Diagnostic> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(Diagnostic {
            kind: DiagnosticKind::Malformed,
            message: format!("WARNING: processing {identifier} failed: {e}"),
        }),
    }
}

/// Build catalogs once with the given options.
pub async fn make_catalogs(
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn OutputSink>,
    options: BuildOptions,
) -> Result<BuildReport, BuildError> {
    CatalogBuilder::new(store, sink, options).build().await
}
