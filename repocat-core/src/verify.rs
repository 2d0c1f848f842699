//! Installer and uninstaller payload verification
//!
//! A pkginfo usually points at a payload under `pkgs/`. Records whose
//! payload is missing are kept out of catalogs (unless the build is
//! forced), because clients would fail to install them.
//!
//! Lookups are exact first, then case-insensitive. A case-only match is
//! accepted with a warning: it works on case-insensitive filesystems and
//! breaks on the rest.

use plist::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::metadata::MetadataRecord;
use crate::report::{Diagnostic, DiagnosticKind};

/// Installer types that never have a payload
pub const NO_PAYLOAD_INSTALLER_TYPES: &[&str] = &["nopkg", "apple_update_metadata"];

/// Uninstall methods that need a dedicated uninstaller payload
pub const UNINSTALLER_PAYLOAD_METHODS: &[&str] = &[
    "uninstall_package",
    "AdobeUberUninstaller",
    "AdobeCS5AAMEEPackage",
];

/// Fields that mark a payload as hosted outside the repository
pub const EXTERNAL_PAYLOAD_FIELDS: &[&str] = &["PackageCompleteURL", "PackageURL"];

/// Prefixes joined in front of declared payload locations before lookup.
///
/// The known-payload set holds identifiers relative to `pkgs/`, and so do
/// the `*_item_location` fields, so both prefixes default to none. Some
/// older tooling joined `pkgs` in front of the uninstaller location only;
/// `uninstaller_prefix: Some("pkgs")` reproduces that against a payload
/// set listed with the same prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadPaths {
    #[serde(default)]
    pub installer_prefix: Option<String>,
    #[serde(default)]
    pub uninstaller_prefix: Option<String>,
}

impl PayloadPaths {
    fn join(prefix: Option<&str>, location: &str) -> String {
        match prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), location)
            }
            _ => location.to_string(),
        }
    }

    pub fn installer_path(&self, location: &str) -> String {
        Self::join(self.installer_prefix.as_deref(), location)
    }

    pub fn uninstaller_path(&self, location: &str) -> String {
        Self::join(self.uninstaller_prefix.as_deref(), location)
    }
}

/// Result of looking a path up in a [`PayloadIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    Exact,
    /// Found, but the stored path is spelled with different case
    CaseMismatch(&'a str),
    Missing,
}

/// The set of payload paths present in the repository.
#[derive(Debug, Clone, Default)]
pub struct PayloadIndex {
    exact: BTreeSet<String>,
    folded: HashMap<String, String>,
}

impl PayloadIndex {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let exact: BTreeSet<String> = paths.into_iter().map(Into::into).collect();
        let mut folded = HashMap::new();
        // BTreeSet order makes the first spelling win deterministically
        for path in &exact {
            folded
                .entry(path.to_lowercase())
                .or_insert_with(|| path.clone());
        }
        Self { exact, folded }
    }

    pub(crate) fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        if self.exact.contains(path) {
            return Lookup::Exact;
        }
        match self.folded.get(&path.to_lowercase()) {
            Some(stored) => Lookup::CaseMismatch(stored.as_str()),
            None => Lookup::Missing,
        }
    }
}

/// Outcome of verifying one record.
///
/// `messages` go to the report whether or not the record passed; `passed`
/// only decides catalog inclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    pub passed: bool,
    pub messages: Vec<Diagnostic>,
}

impl Verification {
    fn pass() -> Self {
        Self {
            passed: true,
            messages: Vec::new(),
        }
    }

    fn fail(&mut self, kind: DiagnosticKind, message: String) -> &mut Self {
        self.passed = false;
        self.warn(kind, message)
    }

    fn warn(&mut self, kind: DiagnosticKind, message: String) -> &mut Self {
        self.messages.push(Diagnostic { kind, message });
        self
    }
}

/// Checks declared payloads against a [`PayloadIndex`].
#[derive(Debug, Clone)]
pub struct PayloadVerifier {
    index: PayloadIndex,
    paths: PayloadPaths,
}

impl PayloadVerifier {
    pub fn new(index: PayloadIndex, paths: PayloadPaths) -> Self {
        Self { index, paths }
    }

    /// Verify the payloads declared by `record`.
    pub fn verify(&self, record: &MetadataRecord, reference: &str) -> Verification {
        let installer_type = record.get("installer_type").and_then(Value::as_string);
        if installer_type.is_some_and(|t| NO_PAYLOAD_INSTALLER_TYPES.contains(&t)) {
            return Verification::pass();
        }
        if EXTERNAL_PAYLOAD_FIELDS
            .iter()
            .any(|field| record.get(field).is_some())
        {
            return Verification::pass();
        }

        let mut outcome = Verification::pass();

        let location = match record.get("installer_item_location") {
            None => {
                outcome.fail(
                    DiagnosticKind::Integrity,
                    format!("WARNING: {reference} is missing installer_item_location"),
                );
                return outcome;
            }
            Some(value) => match value.as_string() {
                Some(location) => location,
                None => {
                    outcome.fail(
                        DiagnosticKind::Malformed,
                        format!("WARNING: {reference} has an invalid installer_item_location"),
                    );
                    return outcome;
                }
            },
        };

        let installer_path = self.paths.installer_path(location);
        self.check_exists(&mut outcome, reference, "installer", &installer_path);
        if !outcome.passed {
            return outcome;
        }

        self.check_uninstaller(&mut outcome, record, reference);
        outcome
    }

    fn check_uninstaller(&self, outcome: &mut Verification, record: &MetadataRecord, reference: &str) {
        let uninstall_method = record.get("uninstall_method").and_then(Value::as_string);
        match record.get("uninstaller_item_location") {
            None => {
                if let Some(method) =
                    uninstall_method.filter(|m| UNINSTALLER_PAYLOAD_METHODS.contains(m))
                {
                    outcome.fail(
                        DiagnosticKind::Integrity,
                        format!(
                            "WARNING: {reference} has uninstall_method {method} but is missing uninstaller_item_location"
                        ),
                    );
                }
            }
            Some(value) => match value.as_string() {
                Some(location) => {
                    let uninstaller_path = self.paths.uninstaller_path(location);
                    self.check_exists(outcome, reference, "uninstaller", &uninstaller_path);
                }
                None => {
                    outcome.fail(
                        DiagnosticKind::Malformed,
                        format!("WARNING: {reference} has an invalid uninstaller_item_location"),
                    );
                }
            },
        }
    }

    fn check_exists(&self, outcome: &mut Verification, reference: &str, role: &str, path: &str) {
        match self.index.lookup(path) {
            Lookup::Exact => {}
            Lookup::CaseMismatch(stored) => {
                outcome.warn(
                    DiagnosticKind::Anomaly,
                    format!(
                        "WARNING: {reference} refers to {role} item: {path}. \
                         The pathname of the item in the repo has different case: {stored}. \
                         This may cause issues depending on the case-sensitivity of the underlying filesystem."
                    ),
                );
            }
            Lookup::Missing => {
                outcome.fail(
                    DiagnosticKind::Integrity,
                    format!("WARNING: {reference} refers to missing {role} item: {path}"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Dictionary;

    fn record(fields: &[(&str, &str)]) -> MetadataRecord {
        let mut dict = Dictionary::new();
        for (key, value) in fields {
            dict.insert(key.to_string(), Value::String(value.to_string()));
        }
        dict
    }

    fn verifier(paths: &[&str]) -> PayloadVerifier {
        PayloadVerifier::new(
            PayloadIndex::new(paths.iter().copied()),
            PayloadPaths::default(),
        )
    }

    #[test]
    fn test_no_payload_types_always_pass() {
        let v = verifier(&[]);
        for installer_type in NO_PAYLOAD_INSTALLER_TYPES {
            let r = record(&[
                ("name", "Thing"),
                ("installer_type", installer_type),
                ("installer_item_location", "does/not/exist.pkg"),
            ]);
            let outcome = v.verify(&r, "Thing.plist");
            assert!(outcome.passed);
            assert!(outcome.messages.is_empty());
        }
    }

    #[test]
    fn test_external_payload_passes() {
        let v = verifier(&[]);
        let r = record(&[("name", "Remote"), ("PackageCompleteURL", "https://x/y.pkg")]);
        assert!(v.verify(&r, "Remote.plist").passed);
        let r = record(&[("name", "Remote"), ("PackageURL", "https://x/")]);
        assert!(v.verify(&r, "Remote.plist").passed);
    }

    #[test]
    fn test_missing_location_fails() {
        let v = verifier(&["apps/firefox.pkg"]);
        let outcome = v.verify(&record(&[("name", "Firefox")]), "Firefox.plist");
        assert!(!outcome.passed);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0]
            .message
            .contains("missing installer_item_location"));
    }

    #[test]
    fn test_invalid_location_type_fails() {
        let v = verifier(&["apps/firefox.pkg"]);
        let mut r = record(&[("name", "Firefox")]);
        r.insert("installer_item_location".to_string(), Value::from(42i64));
        let outcome = v.verify(&r, "Firefox.plist");
        assert!(!outcome.passed);
        assert_eq!(outcome.messages[0].kind, DiagnosticKind::Malformed);
        assert!(outcome.messages[0]
            .message
            .contains("invalid installer_item_location"));
    }

    #[test]
    fn test_exact_match_passes_silently() {
        let v = verifier(&["apps/firefox.pkg"]);
        let r = record(&[("name", "Firefox"), ("installer_item_location", "apps/firefox.pkg")]);
        assert_eq!(v.verify(&r, "Firefox.plist"), Verification::pass());
    }

    #[test]
    fn test_case_mismatch_passes_with_one_warning() {
        let v = verifier(&["Apps/Firefox.pkg"]);
        let r = record(&[("name", "Firefox"), ("installer_item_location", "apps/firefox.pkg")]);
        let outcome = v.verify(&r, "Firefox.plist");
        assert!(outcome.passed);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].message.contains("different case: Apps/Firefox.pkg"));
    }

    #[test]
    fn test_absent_payload_fails() {
        let v = verifier(&["apps/chrome.pkg"]);
        let r = record(&[("name", "Firefox"), ("installer_item_location", "apps/firefox.pkg")]);
        let outcome = v.verify(&r, "Firefox.plist");
        assert!(!outcome.passed);
        assert_eq!(outcome.messages[0].kind, DiagnosticKind::Integrity);
        assert!(outcome.messages[0]
            .message
            .contains("refers to missing installer item: apps/firefox.pkg"));
    }

    #[test]
    fn test_uninstaller_required_by_method() {
        let v = verifier(&["apps/acrobat.pkg"]);
        let r = record(&[
            ("name", "Acrobat"),
            ("installer_item_location", "apps/acrobat.pkg"),
            ("uninstall_method", "AdobeUberUninstaller"),
        ]);
        let outcome = v.verify(&r, "Acrobat.plist");
        assert!(!outcome.passed);
        assert!(outcome.messages[0]
            .message
            .contains("missing uninstaller_item_location"));

        let r = record(&[
            ("name", "Acrobat"),
            ("installer_item_location", "apps/acrobat.pkg"),
            ("uninstall_method", "removepackages"),
        ]);
        assert!(v.verify(&r, "Acrobat.plist").passed);
    }

    #[test]
    fn test_uninstaller_existence_check() {
        let v = verifier(&["apps/acrobat.pkg", "apps/Acrobat-Uninstall.pkg"]);
        let present = record(&[
            ("name", "Acrobat"),
            ("installer_item_location", "apps/acrobat.pkg"),
            ("uninstall_method", "uninstall_package"),
            ("uninstaller_item_location", "apps/acrobat-uninstall.pkg"),
        ]);
        let outcome = v.verify(&present, "Acrobat.plist");
        assert!(outcome.passed);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].message.contains("uninstaller item"));

        let missing = record(&[
            ("name", "Acrobat"),
            ("installer_item_location", "apps/acrobat.pkg"),
            ("uninstaller_item_location", "apps/gone.pkg"),
        ]);
        let outcome = v.verify(&missing, "Acrobat.plist");
        assert!(!outcome.passed);
        assert!(outcome.messages[0]
            .message
            .contains("missing uninstaller item: apps/gone.pkg"));
    }

    #[test]
    fn test_uninstaller_not_checked_after_installer_failure() {
        let v = verifier(&[]);
        let r = record(&[
            ("name", "Acrobat"),
            ("installer_item_location", "apps/acrobat.pkg"),
            ("uninstall_method", "AdobeUberUninstaller"),
        ]);
        let outcome = v.verify(&r, "Acrobat.plist");
        assert!(!outcome.passed);
        assert_eq!(outcome.messages.len(), 1);
    }

    #[test]
    fn test_invalid_uninstaller_location_type_fails() {
        let v = verifier(&["apps/acrobat.pkg"]);
        let mut r = record(&[("name", "Acrobat"), ("installer_item_location", "apps/acrobat.pkg")]);
        r.insert("uninstaller_item_location".to_string(), Value::from(42i64));

        let outcome = v.verify(&r, "Acrobat.plist");
        assert!(!outcome.passed);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].kind, DiagnosticKind::Malformed);
        assert!(outcome.messages[0]
            .message
            .contains("Acrobat.plist has an invalid uninstaller_item_location"));
    }

    #[test]
    fn test_prefixes_are_explicit_and_independent() {
        let paths = PayloadPaths {
            installer_prefix: None,
            uninstaller_prefix: Some("pkgs".to_string()),
        };
        assert_eq!(paths.installer_path("apps/a.pkg"), "apps/a.pkg");
        assert_eq!(paths.uninstaller_path("apps/u.pkg"), "pkgs/apps/u.pkg");

        // With the asymmetric prefix, a payload set relative to pkgs/ no
        // longer satisfies the uninstaller lookup.
        let v = PayloadVerifier::new(PayloadIndex::new(["apps/a.pkg", "apps/u.pkg"]), paths);
        let r = record(&[
            ("name", "A"),
            ("installer_item_location", "apps/a.pkg"),
            ("uninstaller_item_location", "apps/u.pkg"),
        ]);
        let outcome = v.verify(&r, "A.plist");
        assert!(!outcome.passed);
        assert!(outcome.messages[0].message.contains("pkgs/apps/u.pkg"));

        let v = PayloadVerifier::new(
            PayloadIndex::new(["apps/a.pkg", "apps/u.pkg"]),
            PayloadPaths::default(),
        );
        assert!(v.verify(&r, "A.plist").passed);
    }
}
