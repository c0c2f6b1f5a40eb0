//! Parser descriptors and the registry that orders and selects them.
//!
//! A [`ParserDescriptor`] says what it can read (`detect`), what media type it
//! produces, and which other parsers it must be tried before or after. The
//! [`RegistryBuilder`] collects descriptors and [`RegistryBuilder::build`]
//! sorts them once; the resulting [`ParserRegistry`] is read-only and shared
//! by every job.
//!
//! ```text
//! register(..)* ──► build() ──► ParserRegistry ──► select(path) ──► [Selection]
//!                   (Kahn sort,                     (first match wins,
//!                    cycles rejected)                directories recurse)
//! ```

use crate::error::IngestError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Extra options a detector infers from the input, merged into the job's
/// options (e.g. `dpi` for a raster image, `width`/`height` for a card).
pub type JobOptions = BTreeMap<String, String>;

/// Result of asking a parser whether it can read an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    NoMatch,
    Match,
    MatchWithOptions(JobOptions),
}

impl Detection {
    pub fn is_match(&self) -> bool {
        !matches!(self, Detection::NoMatch)
    }

    /// `Match` or `MatchWithOptions`, depending on whether `options` is empty.
    pub fn with_options(options: JobOptions) -> Self {
        if options.is_empty() {
            Detection::Match
        } else {
            Detection::MatchWithOptions(options)
        }
    }
}

/// How the pipeline gets page images and text out of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A page-description file the rasterizer and extractors read directly.
    Pdf,
    /// Converted to PDF through the gateway, then handled like [`SourceKind::Pdf`].
    ConvertedPdf,
    /// Raster image(s) decoded in-process; text comes from OCR.
    Raster,
    /// A folder that already holds page images and possibly text.
    Prepared,
}

/// A document format the pipeline can ingest.
///
/// Implementations are registered once and shared between workers, so they
/// must be `Send + Sync` and free of per-document state.
pub trait ParserDescriptor: Send + Sync {
    /// Unique name, used in ordering constraints and format overrides.
    fn name(&self) -> &str;

    /// Media type recorded for documents this parser produces.
    fn media_type(&self) -> &str;

    /// Media type for one particular input. Defaults to [`media_type`](Self::media_type).
    fn media_type_of(&self, path: &Path) -> String {
        let _ = path;
        self.media_type().to_string()
    }

    /// Parsers this one must be tried before.
    fn before(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Parsers this one must be tried after.
    fn after(&self) -> Vec<&str> {
        Vec::new()
    }

    fn detect(&self, path: &Path) -> Detection;

    fn kind(&self) -> SourceKind;

    /// Whether a single input may hold several documents divided by
    /// separator sheets.
    fn splittable(&self) -> bool {
        false
    }

    /// Whether the link extractor should be run on this format.
    fn has_links(&self) -> bool {
        false
    }

    /// Whether extracted text should be checked by the quality scorer.
    fn checks_text_quality(&self) -> bool {
        true
    }
}

impl fmt::Debug for dyn ParserDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserDescriptor")
            .field("name", &self.name())
            .field("media_type", &self.media_type())
            .finish()
    }
}

/// An input paired with the parser chosen for it.
#[derive(Debug, Clone)]
pub struct Selection {
    pub path: PathBuf,
    pub parser: Arc<dyn ParserDescriptor>,
    pub options: JobOptions,
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Collects descriptors; [`build`](Self::build) validates and orders them.
#[derive(Default)]
pub struct RegistryBuilder {
    parsers: Vec<Arc<dyn ParserDescriptor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Nothing is checked until [`build`](Self::build).
    pub fn register(mut self, parser: Arc<dyn ParserDescriptor>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// Sort the descriptors so every before/after constraint holds.
    ///
    /// Constraints naming unregistered parsers are ignored. Among parsers
    /// with no constraint between them, registration order is kept.
    pub fn build(self) -> Result<ParserRegistry, IngestError> {
        let parsers = self.parsers;
        let n = parsers.len();

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, p) in parsers.iter().enumerate() {
            if index.insert(p.name(), i).is_some() {
                return Err(IngestError::InvalidConfig(format!(
                    "parser '{}' registered twice",
                    p.name()
                )));
            }
        }

        // successors[a] holds b when a must be tried before b
        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for (i, p) in parsers.iter().enumerate() {
            for name in p.before() {
                if let Some(&j) = index.get(name) {
                    successors[i].insert(j);
                }
            }
            for name in p.after() {
                if let Some(&j) = index.get(name) {
                    successors[j].insert(i);
                }
            }
        }

        let mut in_degree = vec![0usize; n];
        for succ in &successors {
            for &j in succ {
                in_degree[j] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &j in &successors[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() < n {
            let cyclic = cycle_members(&successors, &order);
            let names = cyclic
                .into_iter()
                .map(|i| parsers[i].name().to_string())
                .collect();
            return Err(IngestError::OrderingConflict { parsers: names });
        }

        let mut slots: Vec<Option<Arc<dyn ParserDescriptor>>> =
            parsers.into_iter().map(Some).collect();
        let sorted: Vec<Arc<dyn ParserDescriptor>> =
            order.into_iter().filter_map(|i| slots[i].take()).collect();
        debug!(
            "parser order: {}",
            sorted.iter().map(|p| p.name()).collect::<Vec<_>>().join(" > ")
        );
        Ok(ParserRegistry { parsers: sorted })
    }
}

/// Nodes left over after a topological sort, minus those that only hang off
/// a cycle without being part of one.
fn cycle_members(successors: &[BTreeSet<usize>], sorted: &[usize]) -> Vec<usize> {
    let done: BTreeSet<usize> = sorted.iter().copied().collect();
    let mut remaining: BTreeSet<usize> = (0..successors.len()).filter(|i| !done.contains(i)).collect();
    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| !successors[i].iter().any(|j| remaining.contains(j)))
            .collect();
        if sinks.is_empty() {
            break;
        }
        for i in sinks {
            remaining.remove(&i);
        }
    }
    remaining.into_iter().collect()
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Ordered, read-only set of parsers.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ParserDescriptor>>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.parsers.iter().map(|p| p.name())).finish()
    }
}

impl ParserRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Parsers in the order they are tried.
    pub fn list(&self) -> &[Arc<dyn ParserDescriptor>] {
        &self.parsers
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ParserDescriptor>> {
        self.parsers.iter().find(|p| p.name() == name).cloned()
    }

    /// Choose parsers for `path`.
    ///
    /// A file yields one selection. A directory that no parser claims is
    /// searched recursively (skipping names that start with `.` or end with
    /// `~`) and yields one selection per recognised entry.
    pub fn select(&self, path: &Path) -> Result<Vec<Selection>, IngestError> {
        if !path.exists() {
            return Err(IngestError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        let mut found = Vec::new();
        self.select_into(path, &mut found);
        if found.is_empty() {
            Err(IngestError::NoFormat {
                path: path.to_path_buf(),
            })
        } else {
            Ok(found)
        }
    }

    /// Like [`select`](Self::select), but `format` (when given) names the
    /// parser to use and detection is skipped.
    pub fn select_with(
        &self,
        path: &Path,
        format: Option<&str>,
    ) -> Result<Vec<Selection>, IngestError> {
        let Some(name) = format else {
            return self.select(path);
        };
        let parser = self.get(name).ok_or_else(|| IngestError::UnknownFormat {
            name: name.to_string(),
        })?;
        if !path.exists() {
            return Err(IngestError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        debug!("using forced format {} for {}", name, path.display());
        Ok(vec![Selection {
            path: path.to_path_buf(),
            parser,
            options: JobOptions::new(),
        }])
    }

    fn select_into(&self, path: &Path, found: &mut Vec<Selection>) {
        for parser in &self.parsers {
            let detection = parser.detect(path);
            trace!("{} on {} -> {:?}", parser.name(), path.display(), detection);
            let options = match detection {
                Detection::NoMatch => continue,
                Detection::Match => JobOptions::new(),
                Detection::MatchWithOptions(options) => options,
            };
            debug!("selected {} for {}", parser.name(), path.display());
            found.push(Selection {
                path: path.to_path_buf(),
                parser: Arc::clone(parser),
                options,
            });
            return;
        }

        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .into_iter()
                .flatten()
                .filter_map(Result::ok)
                .filter(|e| {
                    let name = e.file_name();
                    let name = name.to_string_lossy();
                    !name.starts_with('.') && !name.ends_with('~')
                })
                .map(|e| e.path())
                .collect();
            entries.sort();
            for entry in entries {
                self.select_into(&entry, found);
            }
        } else {
            debug!("no parser recognises {}", path.display());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A parser matching one file extension, with string constraints.
    pub(crate) struct Named {
        pub name: String,
        pub before: Vec<String>,
        pub after: Vec<String>,
        pub ext: Option<String>,
    }

    impl Named {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                before: Vec::new(),
                after: Vec::new(),
                ext: None,
            }
        }

        pub fn before(mut self, names: &[&str]) -> Self {
            self.before = names.iter().map(|s| s.to_string()).collect();
            self
        }

        pub fn after(mut self, names: &[&str]) -> Self {
            self.after = names.iter().map(|s| s.to_string()).collect();
            self
        }

        pub fn ext(mut self, ext: &str) -> Self {
            self.ext = Some(ext.to_string());
            self
        }
    }

    impl ParserDescriptor for Named {
        fn name(&self) -> &str {
            &self.name
        }

        fn media_type(&self) -> &str {
            "application/octet-stream"
        }

        fn before(&self) -> Vec<&str> {
            self.before.iter().map(String::as_str).collect()
        }

        fn after(&self) -> Vec<&str> {
            self.after.iter().map(String::as_str).collect()
        }

        fn detect(&self, path: &Path) -> Detection {
            let hit = self.ext.as_deref().is_some_and(|ext| {
                path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext)
            });
            if hit {
                Detection::Match
            } else {
                Detection::NoMatch
            }
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Pdf
        }
    }

    fn names(r: &ParserRegistry) -> Vec<&str> {
        r.list().iter().map(|p| p.name()).collect()
    }

    fn build(parsers: Vec<Named>) -> Result<ParserRegistry, IngestError> {
        parsers
            .into_iter()
            .fold(RegistryBuilder::new(), |b, p| b.register(Arc::new(p)))
            .build()
    }

    #[test]
    fn before_and_after_are_honoured() {
        let r = build(vec![
            Named::new("ImageDoc"),
            Named::new("TIFFDoc").before(&["ImageDoc"]),
            Named::new("ScanDoc").before(&["TIFFDoc", "ImageDoc"]),
            Named::new("Late").after(&["ImageDoc"]),
        ])
        .unwrap();
        assert_eq!(names(&r), vec!["ScanDoc", "TIFFDoc", "ImageDoc", "Late"]);
    }

    #[test]
    fn unconstrained_keep_registration_order() {
        let r = build(vec![Named::new("b"), Named::new("a"), Named::new("c")]).unwrap();
        assert_eq!(names(&r), vec!["b", "a", "c"]);
    }

    #[test]
    fn unknown_names_in_constraints_are_ignored() {
        let r = build(vec![Named::new("a").before(&["ghost"])]).unwrap();
        assert_eq!(names(&r), vec!["a"]);
    }

    #[test]
    fn cycle_names_only_its_members() {
        let err = build(vec![
            Named::new("free"),
            Named::new("x").before(&["y"]),
            Named::new("y").before(&["z"]),
            Named::new("z").before(&["x", "tail"]),
            Named::new("tail"),
        ])
        .unwrap_err();
        match err {
            IngestError::OrderingConflict { parsers } => {
                assert_eq!(parsers, vec!["x", "y", "z"]);
            }
            other => panic!("expected ordering conflict, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = build(vec![Named::new("a"), Named::new("a")]).unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }

    #[test]
    fn first_match_wins_and_directories_recurse() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/two.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "x").unwrap();
        std::fs::write(dir.path().join("backup.txt~"), "x").unwrap();
        std::fs::write(dir.path().join("skip.bin"), "x").unwrap();

        let r = build(vec![
            Named::new("Generic").ext("txt"),
            Named::new("Special").ext("txt").before(&["Generic"]),
        ])
        .unwrap();
        let found = r.select(dir.path()).unwrap();
        let got: Vec<(String, &str)> = found
            .iter()
            .map(|s| {
                (
                    s.path.strip_prefix(dir.path()).unwrap().display().to_string(),
                    s.parser.name(),
                )
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("one.txt".to_string(), "Special"),
                ("sub/two.txt".to_string(), "Special"),
            ]
        );
    }

    #[test]
    fn unrecognised_file_is_no_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, "x").unwrap();
        let r = build(vec![Named::new("Text").ext("txt")]).unwrap();
        assert!(matches!(r.select(&path), Err(IngestError::NoFormat { .. })));
        assert!(matches!(
            r.select(&dir.path().join("missing")),
            Err(IngestError::InputNotFound { .. })
        ));
    }

    #[test]
    fn forced_format_skips_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, "x").unwrap();
        let r = build(vec![Named::new("Text").ext("txt")]).unwrap();
        let found = r.select_with(&path, Some("Text")).unwrap();
        assert_eq!(found[0].parser.name(), "Text");
        assert!(matches!(
            r.select_with(&path, Some("Nope")),
            Err(IngestError::UnknownFormat { .. })
        ));
    }

    /// Edges `(a, b)` with `a < b` mean "a before b"; the flag picks whether
    /// the constraint is written as `before` on a or `after` on b.
    fn dag() -> impl Strategy<Value = (usize, Vec<(usize, usize, bool)>)> {
        (2usize..9).prop_flat_map(|n| {
            let edges = prop::collection::vec((0..n, 0..n, any::<bool>()), 0..24).prop_map(|es| {
                es.into_iter()
                    .filter(|(a, b, _)| a != b)
                    .map(|(a, b, f)| (a.min(b), a.max(b), f))
                    .collect::<Vec<_>>()
            });
            (Just(n), edges)
        })
    }

    fn parsers_for(n: usize, edges: &[(usize, usize, bool)]) -> Vec<Named> {
        let mut parsers: Vec<Named> = (0..n).map(|i| Named::new(&format!("p{i}"))).collect();
        for &(a, b, as_before) in edges {
            if as_before {
                parsers[a].before.push(format!("p{b}"));
            } else {
                parsers[b].after.push(format!("p{a}"));
            }
        }
        // register in reverse so the sort has work to do
        parsers.reverse();
        parsers
    }

    proptest! {
        #[test]
        fn acyclic_constraints_always_hold((n, edges) in dag()) {
            let r = build(parsers_for(n, &edges)).unwrap();
            let order = names(&r);
            prop_assert_eq!(order.len(), n);
            let pos = |i: usize| order.iter().position(|p| *p == format!("p{i}")).unwrap();
            for &(a, b, _) in &edges {
                prop_assert!(pos(a) < pos(b), "p{} should precede p{} in {:?}", a, b, order);
            }
        }

        #[test]
        fn cycles_are_always_rejected((n, edges) in dag(), len in 2usize..5) {
            let len = len.min(n);
            let mut parsers = parsers_for(n, &edges);
            parsers.reverse();
            // close a cycle p0 -> p1 -> ... -> p(len-1) -> p0
            for i in 0..len {
                let next = (i + 1) % len;
                parsers[i].before.push(format!("p{next}"));
            }
            match build(parsers) {
                Err(IngestError::OrderingConflict { parsers }) => {
                    for i in 0..len {
                        let member = format!("p{i}");
                        prop_assert!(parsers.contains(&member), "{} missing from {:?}", member, parsers);
                    }
                }
                other => prop_assert!(false, "expected ordering conflict, got {:?}", other.map(|r| format!("{r:?}"))),
            }
        }
    }
}
