//! Static extraction of property tests and their dependency context.
//!
//! This module provides functionality for:
//! - Walking a Cargo project and parsing every source unit
//! - Classifying functions as property tests through a [`TestMarker`]
//! - Computing a test's transitive dependency closure and the imports it needs
//!
//! Resolution is purely syntactic: a call site named `foo` reaches every
//! project function named `foo`, whatever module it lives in.

mod calls;
mod imports;
mod marker;

pub use imports::{classify_root, Import, ImportKind};
pub use marker::{AttributeMarker, TestMarker};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use syn::{Item, ItemFn};

use crate::error::{Error, Result};
use crate::harness::TestLocator;
use crate::source::{function_items, original_text, parse_unit, render_fn, render_items};

/// Directories never treated as part of the project sources.
const SKIP_DIRS: &[&str] = &["target", "node_modules", ".git"];

/// File stems that name a crate root or module file rather than a module.
const NON_MODULE_STEMS: &[&str] = &["lib", "main", "mod", "build"];

/// Knobs for a project scan.
pub struct ExtractOptions {
    pub marker: Box<dyn TestMarker>,
    /// Glob patterns (relative to the project root) excluded from the scan.
    pub skip: Vec<String>,
    /// Crates whose imports never count as an external requirement.
    pub testing_libraries: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            marker: Box::new(AttributeMarker::default()),
            skip: Vec::new(),
            testing_libraries: vec!["proptest".to_string(), "test_strategy".to_string()],
        }
    }
}

/// One function definition found in the project.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    /// Unit path relative to the project root.
    pub unit: PathBuf,
    pub item: ItemFn,
    /// The definition exactly as written in its unit.
    pub text: String,
    pub calls: BTreeSet<String>,
    pub is_property_test: bool,
}

impl FunctionDef {
    pub fn source(&self) -> &str {
        &self.text
    }

    pub fn locator(&self) -> TestLocator {
        TestLocator::new(self.unit.clone(), self.name.clone())
    }
}

/// One parsed `.rs` file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub functions: Vec<FunctionDef>,
    pub imports: Vec<Import>,
}

/// A property test's minimal context.
#[derive(Debug, Clone)]
pub struct DependencyClosure {
    pub test: FunctionDef,
    /// Project-defined names reachable from the test, tests excluded.
    pub names: BTreeSet<String>,
    /// One definition per name, in name order.
    pub definitions: Vec<FunctionDef>,
    pub imports: BTreeSet<Import>,
    /// Whether any kept import needs a crate other than the testing library.
    pub requires_external: bool,
    pub locations: BTreeMap<String, PathBuf>,
}

impl DependencyClosure {
    /// The dependency definitions as one block of source, the mutation target.
    pub fn code(&self) -> String {
        let items = self
            .definitions
            .iter()
            .map(|def| Item::Fn(def.item.clone()))
            .collect();
        render_items(items).unwrap_or_else(|| {
            self.definitions
                .iter()
                .map(FunctionDef::source)
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

/// Parsed view of a whole project.
#[derive(Debug)]
pub struct ProjectIndex {
    root: PathBuf,
    units: Vec<SourceUnit>,
    /// Signals that an "external" import really names project code.
    local_names: BTreeSet<String>,
    testing_libraries: Vec<String>,
}

impl ProjectIndex {
    /// Parse every source unit under `root`.
    ///
    /// Units that fail to parse are skipped with a warning; the scan never
    /// writes to the project.
    pub fn load(root: &Path, options: &ExtractOptions) -> Result<Self> {
        let mut units = Vec::new();
        let mut local_names = BTreeSet::new();

        if let Some(package) = parse_cargo_package_name(&root.join("Cargo.toml")) {
            local_names.insert(package.replace('-', "_"));
        }

        for path in find_source_files(root, &options.skip)? {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

            if let Some(stem) = relative.file_stem().and_then(|s| s.to_str()) {
                if !NON_MODULE_STEMS.contains(&stem) {
                    local_names.insert(stem.to_string());
                }
            }

            let text = std::fs::read_to_string(&path)?;
            match parse_source_unit(&relative, &text, options.marker.as_ref()) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    tracing::warn!("Skipping unit: {}", e);
                    continue;
                }
            }
        }

        tracing::debug!(
            "Indexed {} unit(s) under {}",
            units.len(),
            root.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            units,
            local_names,
            testing_libraries: options.testing_libraries.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.units.iter().flat_map(|unit| unit.functions.iter())
    }

    /// All property tests, in unit order.
    pub fn find_property_tests(&self) -> Vec<&FunctionDef> {
        self.functions().filter(|f| f.is_property_test).collect()
    }

    pub fn find_property_test(&self, name: &str) -> Result<&FunctionDef> {
        self.functions()
            .find(|f| f.is_property_test && f.name == name)
            .ok_or_else(|| Error::TestNotFound(name.to_string()))
    }

    fn definitions_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FunctionDef> {
        self.functions().filter(move |f| f.name == name)
    }

    fn unit_imports(&self, unit: &Path) -> &[Import] {
        self.units
            .iter()
            .find(|u| u.path == unit)
            .map(|u| u.imports.as_slice())
            .unwrap_or(&[])
    }

    /// Names reachable through call edges from `seeds`, plus the imports of
    /// every unit visited. Iterates until no new name is discovered.
    pub fn reachable_names(&self, seeds: &BTreeSet<String>) -> (BTreeSet<String>, BTreeSet<Import>) {
        let mut seen = seeds.clone();
        let mut frontier = seeds.clone();
        let mut imports = BTreeSet::new();

        while !frontier.is_empty() {
            let mut discovered = BTreeSet::new();
            for name in &frontier {
                for def in self.definitions_named(name) {
                    imports.extend(self.unit_imports(&def.unit).iter().cloned());
                    discovered.extend(def.calls.iter().cloned());
                }
            }
            frontier = discovered.difference(&seen).cloned().collect();
            seen.extend(frontier.iter().cloned());
        }

        (seen, imports)
    }

    /// Project-defined names that are not property tests.
    fn dependency_candidates(&self) -> BTreeSet<String> {
        let tests: BTreeSet<&str> = self
            .find_property_tests()
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        self.functions()
            .filter(|f| !tests.contains(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn compute_dependency_closure(&self, test: &FunctionDef) -> DependencyClosure {
        let (reached, mut imports) = self.reachable_names(&test.calls);
        imports.extend(self.unit_imports(&test.unit).iter().cloned());

        let names: BTreeSet<String> = reached
            .intersection(&self.dependency_candidates())
            .cloned()
            .collect();

        let mut definitions = Vec::new();
        let mut locations = BTreeMap::new();
        for name in &names {
            let mut defs = self.definitions_named(name);
            if let Some(def) = defs.next() {
                locations.insert(name.clone(), def.unit.clone());
                definitions.push(def.clone());
            }
            let duplicates = defs.count();
            if duplicates > 0 {
                tracing::debug!(
                    "`{}` is defined {} more time(s); every occurrence will be swapped",
                    name,
                    duplicates
                );
            }
        }

        let mut requires_external = false;
        imports.retain(|import| {
            if import.kind != ImportKind::External {
                return true;
            }
            let idents = identifiers(&import.text);
            let disguised_local = idents
                .iter()
                .any(|id| names.contains(*id) || self.local_names.contains(*id));
            if disguised_local {
                return false;
            }
            if !self
                .testing_libraries
                .iter()
                .any(|lib| idents.contains(lib.as_str()))
            {
                requires_external = true;
            }
            true
        });

        DependencyClosure {
            test: test.clone(),
            names,
            definitions,
            imports,
            requires_external,
            locations,
        }
    }
}

/// Identifier tokens of an import's text; "contains a name" means one of these.
fn identifiers(text: &str) -> BTreeSet<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse one unit and classify its functions.
pub fn parse_source_unit(path: &Path, text: &str, marker: &dyn TestMarker) -> Result<SourceUnit> {
    let file = parse_unit(path, text)?;

    let functions = function_items(&file)
        .into_iter()
        .filter_map(|item| {
            let name = item.sig.ident.to_string();
            let Some(fn_text) = original_text(text, &item).or_else(|| render_fn(&item)) else {
                tracing::warn!("Skipping {} in {}: cannot recover its source", name, path.display());
                return None;
            };
            Some(FunctionDef {
                name,
                unit: path.to_path_buf(),
                text: fn_text,
                calls: calls::called_names(&item),
                is_property_test: marker.is_property_test(&item),
                item,
            })
        })
        .collect();

    let mut imports = Vec::new();
    imports::collect_imports(&file.items, &mut imports);

    Ok(SourceUnit {
        path: path.to_path_buf(),
        functions,
        imports,
    })
}

/// Find every `.rs` file under `dir`, skipping build output, hidden entries and
/// anything matching one of the `skip` globs.
pub fn find_source_files(dir: &Path, skip: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !dir.is_dir() {
        return Ok(files);
    }

    for entry in walkdir::WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // The root itself may be a temp dir starting with `.`
            if e.path() == dir {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref())
        })
    {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let path = entry.path();

        if !path.is_file() || path.extension().map_or(true, |ext| ext != "rs") {
            continue;
        }

        let relative = path.strip_prefix(dir).unwrap_or(path).to_string_lossy();
        if skip
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, &relative))
        {
            tracing::debug!("Skipping {}: matches a skip pattern", relative);
            continue;
        }

        files.push(path.to_path_buf());
    }

    Ok(files)
}

/// Read `package.name` from a manifest.
pub fn parse_cargo_package_name(cargo_toml_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(cargo_toml_path).ok()?;
    let doc: toml::Value = content.parse().ok()?;

    let package = doc.get("package")?;
    let name = package.get("name")?;
    name.as_str().map(String::from)
}
