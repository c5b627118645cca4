//! Global code dependencies.
//!
//! Node implementations may depend on shared code (buffers, math helpers,
//! message utilities). A [`GlobalCodeDefinition`] produces that code on demand
//! and can itself depend on other definitions, forming a DAG. Resolution goes:
//!
//! 1. [`flatten_dependencies`]: post-order expansion, duplicates kept
//! 2. [`instantiate_and_dedupe_dependencies`]: generate, then keep the first
//!    copy of every structurally equal fragment
//! 3. [`collect_and_dedupe_imports`] / [`collect_and_dedupe_exports`]: first
//!    declaration of each name wins
//!
//! Duplicates are detected on generated code, not on definition identity, so
//! two independently written definitions producing the same code collapse.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ast::{Sequence, TypeName, Variable};
use crate::error::CompileError;
use crate::settings::{CompilationSettings, Target};
use crate::variable_names::{GlobalVariableNames, VariableNamesIndex};

/// Code generator of a [`GlobalCodeDefinition`].
pub type CodeGenerator = Arc<
    dyn Fn(&mut GlobalCodeScope<'_>, &GlobalCodeContext<'_>) -> Result<Sequence, CompileError>
        + Send
        + Sync,
>;

/// Function the host provides to the generated module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSpec {
    /// Function name.
    pub name: String,
    /// Arguments.
    pub args: Vec<Variable>,
    /// Return type.
    pub return_type: TypeName,
}

impl ImportSpec {
    /// Creates an import with no arguments returning `void`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            return_type: TypeName::Void,
        }
    }

    /// Appends an argument.
    pub fn with_arg(mut self, name: impl Into<String>, type_name: TypeName) -> Self {
        self.args.push(Variable::new(name, type_name));
        self
    }

    /// Sets the return type.
    pub fn returning(mut self, type_name: TypeName) -> Self {
        self.return_type = type_name;
        self
    }
}

/// Symbol the generated module exposes to the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExportSpec {
    /// Exported name.
    pub name: String,
    /// Targets the export applies to; `None` means all.
    pub targets: Option<Vec<Target>>,
}

impl ExportSpec {
    /// Export for every target.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: None,
        }
    }

    /// Restricts the export to `targets`.
    pub fn only_for(mut self, targets: &[Target]) -> Self {
        self.targets = Some(targets.to_vec());
        self
    }

    fn applies_to(&self, target: Target) -> bool {
        self.targets.as_ref().is_none_or(|t| t.contains(&target))
    }
}

/// Read-only view handed to code generators.
#[derive(Debug, Clone, Copy)]
pub struct GlobalCodeContext<'a> {
    /// Fixed global names.
    pub globs: &'a GlobalVariableNames,
    /// Settings of the running compilation.
    pub settings: &'a CompilationSettings,
}

/// Symbol allocator for one dependency namespace.
pub struct GlobalCodeScope<'a> {
    names: &'a mut VariableNamesIndex,
    namespace: &'a str,
}

impl<'a> GlobalCodeScope<'a> {
    /// Scope allocating under `global_code.<namespace>`.
    pub fn new(names: &'a mut VariableNamesIndex, namespace: &'a str) -> Self {
        Self { names, namespace }
    }

    /// Namespace of this scope.
    pub fn namespace(&self) -> &str {
        self.namespace
    }

    /// `<namespace>_<key>`, declared on first use.
    pub fn symbol(&mut self, key: &str) -> Result<String, CompileError> {
        Ok(self.names.global_code_symbol(self.namespace, key)?)
    }

    /// Symbol of another namespace, typically one of this definition's
    /// dependencies.
    pub fn symbol_in(&mut self, namespace: &str, key: &str) -> Result<String, CompileError> {
        Ok(self.names.global_code_symbol(namespace, key)?)
    }
}

/// A node of the global code DAG.
#[derive(Clone)]
pub struct GlobalCodeDefinition {
    namespace: String,
    code: CodeGenerator,
    dependencies: Vec<Arc<GlobalCodeDefinition>>,
    imports: Vec<ImportSpec>,
    exports: Vec<ExportSpec>,
}

impl GlobalCodeDefinition {
    /// Creates a definition whose symbols live under `namespace`.
    pub fn new<F>(namespace: impl Into<String>, code: F) -> Self
    where
        F: Fn(&mut GlobalCodeScope<'_>, &GlobalCodeContext<'_>) -> Result<Sequence, CompileError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            namespace: namespace.into(),
            code: Arc::new(code),
            dependencies: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Adds a dependency, emitted before this definition.
    pub fn with_dependency(mut self, dependency: Arc<GlobalCodeDefinition>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Declares a host import.
    pub fn with_import(mut self, import: ImportSpec) -> Self {
        self.imports.push(import);
        self
    }

    /// Declares an export.
    pub fn with_export(mut self, export: ExportSpec) -> Self {
        self.exports.push(export);
        self
    }

    /// Namespace of this definition's symbols.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Direct dependencies.
    pub fn dependencies(&self) -> &[Arc<GlobalCodeDefinition>] {
        &self.dependencies
    }

    /// Declared imports.
    pub fn imports(&self) -> &[ImportSpec] {
        &self.imports
    }

    /// Declared exports.
    pub fn exports(&self) -> &[ExportSpec] {
        &self.exports
    }

    /// Runs the generator.
    pub fn generate(
        &self,
        scope: &mut GlobalCodeScope<'_>,
        context: &GlobalCodeContext<'_>,
    ) -> Result<Sequence, CompileError> {
        (self.code)(scope, context)
    }
}

impl fmt::Debug for GlobalCodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalCodeDefinition")
            .field("namespace", &self.namespace)
            .field("dependencies", &self.dependencies)
            .field("imports", &self.imports)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

/// Expands `definitions` so that every definition comes after its own
/// dependencies. Duplicates are kept.
pub fn flatten_dependencies(
    definitions: &[Arc<GlobalCodeDefinition>],
) -> Vec<Arc<GlobalCodeDefinition>> {
    let mut flat = Vec::new();
    for definition in definitions {
        flatten_into(definition, &mut flat);
    }
    flat
}

fn flatten_into(definition: &Arc<GlobalCodeDefinition>, flat: &mut Vec<Arc<GlobalCodeDefinition>>) {
    for dependency in &definition.dependencies {
        flatten_into(dependency, flat);
    }
    flat.push(Arc::clone(definition));
}

/// Generates every definition in order and concatenates the results,
/// skipping any fragment structurally equal to one already kept.
pub fn instantiate_and_dedupe_dependencies(
    definitions: &[Arc<GlobalCodeDefinition>],
    names: &mut VariableNamesIndex,
    settings: &CompilationSettings,
) -> Result<Sequence, CompileError> {
    let globs = names.globs.clone();
    let context = GlobalCodeContext {
        globs: &globs,
        settings,
    };
    let mut seen: HashSet<Sequence> = HashSet::new();
    let mut ast = Sequence::new();
    for definition in definitions {
        let mut scope = GlobalCodeScope::new(names, &definition.namespace);
        let code = definition.generate(&mut scope, &context)?;
        if seen.insert(code.clone()) {
            ast.append(code);
        }
    }
    tracing::trace!(
        "dependencies_instantiate: {} definitions → {} unique fragments",
        definitions.len(),
        seen.len()
    );
    Ok(ast)
}

/// Exports applying to `target`, first declaration of each name wins.
pub fn collect_and_dedupe_exports(
    definitions: &[Arc<GlobalCodeDefinition>],
    target: Target,
) -> Vec<ExportSpec> {
    let mut names = HashSet::new();
    definitions
        .iter()
        .flat_map(|d| d.exports.iter())
        .filter(|e| e.applies_to(target))
        .filter(|e| names.insert(e.name.clone()))
        .cloned()
        .collect()
}

/// Imports, first declaration of each name wins.
pub fn collect_and_dedupe_imports(definitions: &[Arc<GlobalCodeDefinition>]) -> Vec<ImportSpec> {
    let mut names = HashSet::new();
    definitions
        .iter()
        .flat_map(|d| d.imports.iter())
        .filter(|i| names.insert(i.name.clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_def(namespace: &str, code: &'static str) -> GlobalCodeDefinition {
        GlobalCodeDefinition::new(namespace, move |_, _| Ok(Sequence::text(code)))
    }

    fn namespaces(defs: &[Arc<GlobalCodeDefinition>]) -> Vec<&str> {
        defs.iter().map(|d| d.namespace()).collect()
    }

    #[test]
    fn test_flatten_is_post_order() {
        let core = Arc::new(text_def("core", "core"));
        let buf = Arc::new(text_def("buf", "buf").with_dependency(Arc::clone(&core)));
        let msg = Arc::new(text_def("msg", "msg").with_dependency(Arc::clone(&core)));
        let top = Arc::new(
            text_def("top", "top")
                .with_dependency(Arc::clone(&buf))
                .with_dependency(Arc::clone(&msg)),
        );

        let flat = flatten_dependencies(&[top]);
        assert_eq!(namespaces(&flat), vec!["core", "buf", "core", "msg", "top"]);
    }

    #[test]
    fn test_dedupe_is_structural() {
        let a = Arc::new(text_def("a", "const X = 1\n"));
        let same_code = Arc::new(text_def("b", "const X = 1\n"));
        let other = Arc::new(text_def("c", "const Y = 2\n"));
        let defs = vec![Arc::clone(&a), other, same_code, a];

        let mut names = VariableNamesIndex::new(false);
        let ast =
            instantiate_and_dedupe_dependencies(&defs, &mut names, &CompilationSettings::default())
                .unwrap();
        assert_eq!(ast, Sequence::text("const X = 1\nconst Y = 2\n"));
    }

    #[test]
    fn test_generators_allocate_namespaced_symbols() {
        let def = Arc::new(GlobalCodeDefinition::new("buf", |scope, ctx| {
            let create = scope.symbol("create")?;
            Ok(Sequence::text(format!("function {create}({}) {{}}\n", ctx.globs.m)))
        }));
        let mut names = VariableNamesIndex::new(false);
        let ast = instantiate_and_dedupe_dependencies(
            &[def],
            &mut names,
            &CompilationSettings::default(),
        )
        .unwrap();
        assert_eq!(ast.to_string(), "function buf_create(m) {}\n");
        assert_eq!(
            names.global_code.get("buf").unwrap().get("create").unwrap(),
            "buf_create"
        );
    }

    #[test]
    fn test_generator_errors_propagate() {
        let def = Arc::new(GlobalCodeDefinition::new("bad", |scope, _| {
            scope.symbol("not-valid")?;
            Ok(Sequence::new())
        }));
        let mut names = VariableNamesIndex::new(false);
        let result = instantiate_and_dedupe_dependencies(
            &[def],
            &mut names,
            &CompilationSettings::default(),
        );
        assert!(matches!(result, Err(CompileError::Namespace(_))));
    }

    #[test]
    fn test_exports_filtered_by_target_and_deduped() {
        let a = Arc::new(
            text_def("a", "")
                .with_export(ExportSpec::new("alloc").only_for(&[Target::AssemblyScript]))
                .with_export(ExportSpec::new("read")),
        );
        let b = Arc::new(
            text_def("b", "")
                .with_export(ExportSpec::new("read").only_for(&[Target::JavaScript]))
                .with_export(ExportSpec::new("write")),
        );
        let defs = vec![a, b];

        let js: Vec<_> = collect_and_dedupe_exports(&defs, Target::JavaScript)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(js, vec!["read", "write"]);

        let asc = collect_and_dedupe_exports(&defs, Target::AssemblyScript);
        assert_eq!(asc.len(), 3);
        assert_eq!(asc[1], ExportSpec::new("read"));
    }

    #[test]
    fn test_imports_first_wins() {
        let a = Arc::new(text_def("a", "").with_import(
            ImportSpec::new("i_read").with_arg("id", TypeName::Int).returning(TypeName::Float),
        ));
        let b = Arc::new(text_def("b", "").with_import(ImportSpec::new("i_read")));
        let imports = collect_and_dedupe_imports(&[a, b]);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].return_type, TypeName::Float);
    }
}
