//! Semantic records and the statement collector.
//!
//! The collector consumes grammar matches in file order and builds the
//! [`Environment`]: variable, task and call tables plus using
//! directives, mappings and asserts. Attributes written above a
//! statement accumulate in a pending list that the next non-attribute
//! statement consumes.
//!
//! A declaration written under `@profile P` is stored under the mangled
//! key `name@@P`; the post-processor later aligns every table onto the
//! active profile.

use crate::table::{self, find_closest};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Attribute classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Precompiler,
    Postcompiler,
    Profile,
    Public,
    Private,
    Folder,
    File,
    Always,
    Dependency,
    Callable,
    Main,
    Echo,
    Cache,
    Multithread,
    Glob,
    Map,
    Requires,
    Interpreter,
}

/// Arity rule for an attribute kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// No properties allowed.
    None,
    /// Zero or one property.
    Optional,
    /// At least one property.
    Required,
    /// Any number of properties (`@main` lists zero or more sub-tasks).
    Any,
}

impl AttrKind {
    /// Resolves an attribute name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "precompiler" => Some(Self::Precompiler),
            "postcompiler" => Some(Self::Postcompiler),
            "profile" => Some(Self::Profile),
            "public" | "pub" => Some(Self::Public),
            "private" => Some(Self::Private),
            "folder" => Some(Self::Folder),
            "file" => Some(Self::File),
            "always" => Some(Self::Always),
            // The historical arcfile spelling is kept as an alias.
            "dependency" | "dependecy" => Some(Self::Dependency),
            "callable" => Some(Self::Callable),
            "main" => Some(Self::Main),
            "echo" => Some(Self::Echo),
            "cache" => Some(Self::Cache),
            "multithread" => Some(Self::Multithread),
            "glob" => Some(Self::Glob),
            "map" => Some(Self::Map),
            "requires" => Some(Self::Requires),
            "interpreter" => Some(Self::Interpreter),
            _ => None,
        }
    }

    /// Canonical spelling used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Precompiler => "precompiler",
            Self::Postcompiler => "postcompiler",
            Self::Profile => "profile",
            Self::Public => "public",
            Self::Private => "private",
            Self::Folder => "folder",
            Self::File => "file",
            Self::Always => "always",
            Self::Dependency => "dependency",
            Self::Callable => "callable",
            Self::Main => "main",
            Self::Echo => "echo",
            Self::Cache => "cache",
            Self::Multithread => "multithread",
            Self::Glob => "glob",
            Self::Map => "map",
            Self::Requires => "requires",
            Self::Interpreter => "interpreter",
        }
    }

    /// Arity rule for this kind.
    #[must_use]
    pub fn qualifier(self) -> Qualifier {
        match self {
            Self::Main => Qualifier::Any,
            Self::Precompiler | Self::Postcompiler | Self::Multithread => Qualifier::Optional,
            Self::Profile
            | Self::Dependency
            | Self::Cache
            | Self::Map
            | Self::Requires
            | Self::Interpreter => Qualifier::Required,
            Self::Public
            | Self::Private
            | Self::Folder
            | Self::File
            | Self::Always
            | Self::Callable
            | Self::Echo
            | Self::Glob => Qualifier::None,
        }
    }

    const ALL: [Self; 18] = [
        Self::Precompiler,
        Self::Postcompiler,
        Self::Profile,
        Self::Public,
        Self::Private,
        Self::Folder,
        Self::File,
        Self::Always,
        Self::Dependency,
        Self::Callable,
        Self::Main,
        Self::Echo,
        Self::Cache,
        Self::Multithread,
        Self::Glob,
        Self::Map,
        Self::Requires,
        Self::Interpreter,
    ];
}

/// Collected attribute: kind plus whitespace-split properties.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub kind: AttrKind,
    pub props: Vec<String>,
}

/// Anything that can carry attributes.
pub trait Attributed {
    fn attributes(&self) -> &[Attribute];

    fn has_attr(&self, kind: AttrKind) -> bool {
        self.attributes().iter().any(|a| a.kind == kind)
    }

    /// Properties of the first attribute of the given kind.
    fn props_of(&self, kind: AttrKind) -> Option<&[String]> {
        self.attributes()
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.props.as_slice())
    }
}

/// Variable assignment record.
#[derive(Debug, Clone, Default)]
pub struct Assign {
    pub name: String,
    pub value: String,
    pub attributes: Vec<Attribute>,
    /// Filled by the post-processor for `@glob` and mapped variables.
    pub glob_expansion: Option<Vec<String>>,
}

impl Attributed for Assign {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

/// Task declaration record.
#[derive(Debug, Clone, Default)]
pub struct TaskDef {
    pub name: String,
    pub params: Vec<String>,
    pub instructions: Vec<String>,
    pub attributes: Vec<Attribute>,
}

impl Attributed for TaskDef {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

/// Task call record (a call-shaped line inside a task body).
#[derive(Debug, Clone)]
pub struct Call {
    pub caller: String,
    pub callee: String,
    pub params: Vec<String>,
    pub attributes: Vec<Attribute>,
}

impl Attributed for Call {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

/// Comparison operator of an assert statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertOp {
    Eq,
    Ne,
    /// Membership of the lhs among whitespace-separated rhs tokens.
    In,
}

impl AssertOp {
    #[must_use]
    pub fn from_lexeme(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "in" => Some(Self::In),
            _ => None,
        }
    }
}

/// Recorded assert, evaluated during post-processing.
#[derive(Debug, Clone)]
pub struct AssertStmt {
    pub line: usize,
    pub text: String,
    pub lhs: String,
    pub op: AssertOp,
    pub rhs: String,
    pub reason: String,
}

/// Recorded `map SRC -> DST` statement.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub src: String,
    pub dst: String,
}

/// Kind of a `using` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsingKind {
    Profiles,
    DefaultInterpreter,
    Threads,
}

/// Collected `using` directive with its raw arguments.
#[derive(Debug, Clone)]
pub struct UsingDirective {
    pub kind: UsingKind,
    pub args: Vec<String>,
}

/// The semantic environment built from one arcfile (plus imports).
#[derive(Debug, Clone)]
pub struct Environment {
    pub vtable: BTreeMap<String, Assign>,
    pub ftable: BTreeMap<String, TaskDef>,
    /// Calls keyed by callee name; the caller lives inside each record.
    pub ctable: BTreeMap<String, Vec<Call>>,
    pub usings: Vec<UsingDirective>,
    pub asserts: Vec<AssertStmt>,
    pub mappings: Vec<Mapping>,
    pub profiles: Vec<String>,
    pub active_profile: String,
    pub interpreter: String,
    pub threads: usize,
    /// Directory every relative glob expands against.
    pub root: PathBuf,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            vtable: BTreeMap::new(),
            ftable: BTreeMap::new(),
            ctable: BTreeMap::new(),
            usings: Vec::new(),
            asserts: Vec::new(),
            mappings: Vec::new(),
            profiles: Vec::new(),
            active_profile: String::new(),
            interpreter: default_interpreter().to_string(),
            threads: 0,
            root: PathBuf::from("."),
        }
    }
}

#[must_use]
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "cmd /C"
    } else {
        "/bin/sh"
    }
}

impl Environment {
    /// Merges `other` into `self`, inserting only entries not already
    /// present. This is the import contract: the importing file wins.
    pub fn merge(&mut self, other: Environment) {
        for (k, v) in other.vtable {
            self.vtable.entry(k).or_insert(v);
        }
        for (k, v) in other.ftable {
            self.ftable.entry(k).or_insert(v);
        }
        for (k, v) in other.ctable {
            self.ctable.entry(k).or_insert(v);
        }
        self.usings.extend(other.usings);
        self.asserts.extend(other.asserts);
        self.mappings.extend(other.mappings);

        if self.profiles.is_empty() {
            self.profiles = other.profiles;
        }
    }
}

/// Failure raised while collecting a statement.
#[derive(Debug, Clone)]
pub struct CollectError {
    pub message: String,
    pub hint: Option<String>,
}

impl CollectError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

pub type CollectResult = Result<(), CollectError>;

/// Builds an [`Environment`] from parsed statements.
#[derive(Default)]
pub struct Collector {
    pending: Vec<Attribute>,
    env: Environment,
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the collector, yielding the built environment.
    #[must_use]
    pub fn into_env(self) -> Environment {
        self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Takes the pending attribute list, applying profile mangling to
    /// the given base name when a `@profile P` attribute is present.
    fn take_pending(&mut self, base: &str) -> (String, Vec<Attribute>) {
        let attrs = std::mem::take(&mut self.pending);

        let key = attrs
            .iter()
            .find(|a| a.kind == AttrKind::Profile)
            .and_then(|a| a.props.first())
            .map_or_else(|| base.to_string(), |p| table::mangle(base, p));

        (key, attrs)
    }

    /// Records an attribute into the pending list after validating its
    /// name and arity.
    pub fn collect_attribute(&mut self, name: &str, raw_props: &str) -> CollectResult {
        let Some(kind) = AttrKind::from_name(name) else {
            let hint = find_closest(AttrKind::ALL.iter().map(|k| k.name()), name, 3);
            return Err(CollectError::with_hint(
                format!("Unknown attribute '{name}'"),
                hint,
            ));
        };

        let props: Vec<String> = raw_props.split_whitespace().map(str::to_string).collect();

        let ok = match kind.qualifier() {
            Qualifier::None => props.is_empty(),
            Qualifier::Optional => props.len() <= 1,
            Qualifier::Required => !props.is_empty(),
            Qualifier::Any => true,
        };

        if !ok {
            return Err(CollectError::new(format!(
                "Attribute '{}' takes {} but {} given",
                kind.name(),
                match kind.qualifier() {
                    Qualifier::None => "no property",
                    Qualifier::Optional => "at most one property",
                    Qualifier::Required | Qualifier::Any => "at least one property",
                },
                props.len(),
            )));
        }

        if kind == AttrKind::Cache {
            let selector = props[0].to_ascii_lowercase();
            if !matches!(selector.as_str(), "track" | "store" | "untrack") {
                return Err(CollectError::with_hint(
                    format!("Unknown cache directive '{}'", props[0]),
                    find_closest(["track", "store", "untrack"].into_iter(), &props[0], 3),
                ));
            }
        }

        self.pending.push(Attribute { kind, props });
        Ok(())
    }

    /// Records a variable assignment; `join` appends to an existing
    /// value (`+=`) instead of replacing it.
    pub fn collect_assignment(&mut self, name: &str, value: &str, join: bool) -> CollectResult {
        let (key, attributes) = self.take_pending(name);
        let value = value.trim();

        if join {
            if let Some(existing) = self.env.vtable.get_mut(&key) {
                if !existing.value.is_empty() {
                    existing.value.push(' ');
                }
                existing.value.push_str(value);
                existing.attributes.extend(attributes);
                return Ok(());
            }
        }

        self.env.vtable.insert(
            key.clone(),
            Assign {
                name: key,
                value: value.to_string(),
                attributes,
                glob_expansion: None,
            },
        );

        Ok(())
    }

    /// Records a task declaration.
    pub fn collect_task(
        &mut self,
        name: &str,
        raw_params: &str,
        instructions: Vec<String>,
    ) -> CollectResult {
        let (key, attributes) = self.take_pending(name);

        let params: Vec<String> = raw_params
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        self.env.ftable.insert(
            key.clone(),
            TaskDef {
                name: key,
                params,
                instructions,
                attributes,
            },
        );

        Ok(())
    }

    /// Records a call keyed by callee name.
    pub fn collect_call(&mut self, caller: &str, callee: &str, params: Vec<String>) -> CollectResult {
        let attributes = std::mem::take(&mut self.pending);

        self.env.ctable.entry(callee.to_string()).or_default().push(Call {
            caller: caller.to_string(),
            callee: callee.to_string(),
            params,
            attributes,
        });

        Ok(())
    }

    /// Applies a `using` directive to the environment metadata.
    pub fn collect_using(&mut self, what: &str, raw_args: &str) -> CollectResult {
        let args: Vec<String> = raw_args.split_whitespace().map(str::to_string).collect();

        let kind = match what.to_ascii_lowercase().as_str() {
            "profiles" => {
                if args.is_empty() {
                    return Err(CollectError::new("'using profiles' needs at least one profile"));
                }
                self.env.profiles = args.clone();
                UsingKind::Profiles
            }
            "default" => {
                if args.len() != 2 || !args[0].eq_ignore_ascii_case("interpreter") {
                    return Err(CollectError::new(
                        "Expected 'using default interpreter <path>'",
                    ));
                }
                self.env.interpreter = args[1].clone();
                UsingKind::DefaultInterpreter
            }
            "threads" => {
                let n = args
                    .first()
                    .and_then(|a| a.parse::<usize>().ok())
                    .filter(|n| *n > 0);
                let Some(n) = n else {
                    return Err(CollectError::new(
                        "Expected 'using threads <N>' with a positive integer",
                    ));
                };
                self.env.threads = n;
                UsingKind::Threads
            }
            other => {
                let hint = find_closest(["profiles", "default", "threads"].into_iter(), other, 3);
                return Err(CollectError::with_hint(
                    format!("Unknown using directive '{other}'"),
                    hint,
                ));
            }
        };

        self.env.usings.push(UsingDirective { kind, args });
        Ok(())
    }

    /// Records a `map SRC -> DST` statement and attaches the `map`
    /// attribute to every declaration of DST (plain or mangled).
    pub fn collect_mapping(&mut self, src: &str, dst: &str) -> CollectResult {
        let src_known = self
            .env
            .vtable
            .keys()
            .any(|k| table::base_name(k) == src);
        if !src_known {
            let hint = find_closest(self.env.vtable.keys().map(String::as_str), src, 3);
            return Err(CollectError::with_hint(
                format!("Cannot map unknown variable '{src}'"),
                hint,
            ));
        }

        let mut attached = false;
        for (key, stmt) in &mut self.env.vtable {
            if table::base_name(key) == dst {
                stmt.attributes.push(Attribute {
                    kind: AttrKind::Map,
                    props: vec![src.to_string()],
                });
                attached = true;
            }
        }

        if !attached {
            let hint = find_closest(self.env.vtable.keys().map(String::as_str), dst, 3);
            return Err(CollectError::with_hint(
                format!("Cannot map onto unknown variable '{dst}'"),
                hint,
            ));
        }

        self.env.mappings.push(Mapping {
            src: src.to_string(),
            dst: dst.to_string(),
        });

        Ok(())
    }

    /// Records an assert for later evaluation.
    pub fn collect_assert(
        &mut self,
        line: usize,
        text: &str,
        lhs: &str,
        op: &str,
        rhs: &str,
        reason: &str,
    ) -> CollectResult {
        let Some(op) = AssertOp::from_lexeme(op) else {
            return Err(CollectError::new(format!(
                "Unknown assert operator '{op}' (expected eq, ne or in)"
            )));
        };

        self.env.asserts.push(AssertStmt {
            line,
            text: text.to_string(),
            lhs: lhs.to_string(),
            op,
            rhs: rhs.to_string(),
            reason: reason.to_string(),
        });

        Ok(())
    }
}
