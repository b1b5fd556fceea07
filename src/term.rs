//! Term glossaries: named, hierarchically scoped bindings.
//!
//! Every term owns a string-keyed tree of child terms, so qualified names
//! like `net.router.load` descend one glossary per qualifier. Lookup
//! starts from a context and walks outward unless a prefix pins it down:
//! `_` and `@` address the root, `%` the symbolic-substitution context,
//! and leading dots address the current context (one extra dot per level
//! up).
//!
//! Assigning a definition republishes the term's value and, when the new
//! definition's level reaches the term's, raises the term and its
//! transitive subscribers so evaluation order stays valid.
//!
//! A term whose definition is Unknown can be resolved on demand by walking
//! up to a context whose node carries a `source`: `<path` consults a
//! `name=value` file, anything else runs as a command with the term name
//! as argument.

use std::process::Command;
use std::rc::Rc;

use tracing::{error, warn};

use crate::cell::{CellId, CellKind, NodeData, TermData};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::value::Value;

impl Engine {
    fn term(&self, id: CellId) -> Option<&TermData> {
        match &self.slot(id).kind {
            CellKind::Term(t) => Some(t),
            _ => None,
        }
    }

    fn term_mut(&mut self, id: CellId) -> Option<&mut TermData> {
        match &mut self.slot_mut(id).kind {
            CellKind::Term(t) => Some(t),
            _ => None,
        }
    }

    /// The definition currently bound to a term.
    pub fn definition(&self, term: CellId) -> Option<CellId> {
        self.term(term).map(|t| t.def)
    }

    /// Fully qualified name of a term, dotted from the root.
    pub fn term_name(&self, term: CellId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(term);
        while let Some(id) = cursor {
            match self.term(id) {
                Some(t) if t.parent.is_some() => {
                    parts.push(t.name.to_string());
                    cursor = t.parent;
                }
                _ => break,
            }
        }
        if parts.is_empty() {
            return "_".to_string();
        }
        parts.reverse();
        parts.join(".")
    }

    /// Single-level lookup in a context's own glossary.
    pub fn find_here(&self, context: CellId, name: &str) -> Option<CellId> {
        let t = self.term(context)?;
        let key: Rc<str> = name.into();
        t.gloss.get(&key).copied()
    }

    /// Walk up the context hierarchy until the name is found.
    pub fn find_in_scope(&self, context: CellId, name: &str) -> Option<CellId> {
        let mut cursor = Some(context);
        while let Some(id) = cursor {
            if let Some(found) = self.find_here(id, name) {
                return Some(found);
            }
            cursor = self.term(id).and_then(|t| t.parent);
        }
        None
    }

    /// Resolve a possibly qualified identifier relative to a context,
    /// honoring the prefix sigils.
    pub fn find_term(&self, context: CellId, ident: &str) -> Option<CellId> {
        let (mut ctx, rest, scoped) = self.resolve_prefix(context, ident)?;
        let mut quals = rest.split('.').filter(|q| !q.is_empty());
        let first = quals.next()?;
        let mut term = if scoped {
            self.find_in_scope(ctx, first)?
        } else {
            self.find_here(ctx, first)?
        };
        for q in quals {
            ctx = term;
            term = self.find_here(ctx, q)?;
        }
        Some(term)
    }

    /// Like [`Engine::find_term`], but never consults ancestor scopes.
    pub fn find_down(&self, context: CellId, ident: &str) -> Option<CellId> {
        let mut term = context;
        for q in ident.split('.').filter(|q| !q.is_empty()) {
            term = self.find_here(term, q)?;
        }
        if term == context {
            None
        } else {
            Some(term)
        }
    }

    /// Handle prefix sigils. Returns the starting context, the remaining
    /// identifier, and whether the first qualifier searches up the scope
    /// chain.
    fn resolve_prefix<'a>(
        &self,
        context: CellId,
        ident: &'a str,
    ) -> Option<(CellId, &'a str, bool)> {
        if let Some(rest) = ident.strip_prefix('%') {
            return Some((self.sym_context.unwrap_or(self.root), rest, true));
        }
        if let Some(rest) = ident.strip_prefix('@') {
            let rest = rest.strip_prefix('.').unwrap_or(rest);
            return Some((self.root, rest, false));
        }
        if let Some(rest) = ident.strip_prefix('_') {
            if rest.is_empty() || rest.starts_with('.') {
                let rest = rest.strip_prefix('.').unwrap_or(rest);
                return Some((self.root, rest, false));
            }
        }
        if ident.starts_with('.') {
            // first dot pins the current context; each extra dot goes up
            let mut ctx = context;
            let mut rest = &ident[1..];
            while let Some(up) = rest.strip_prefix('.') {
                ctx = self.term(ctx)?.parent?;
                rest = up;
            }
            return Some((ctx, rest, false));
        }
        Some((context, ident, true))
    }

    /// Create or rebind a term under a context. Missing intermediate
    /// qualifiers are created as undefined placeholder terms; an existing
    /// defined leaf is rebound as by [`Engine::assign_term`].
    pub fn define_term(&mut self, context: CellId, ident: &str, def: CellId) -> Result<CellId> {
        let Some((mut ctx, rest, _)) = self.resolve_prefix(context, ident) else {
            return Err(EngineError::BadIdentifier(ident.to_string()));
        };
        let quals: Vec<&str> = rest.split('.').filter(|q| !q.is_empty()).collect();
        if quals.is_empty() {
            return Err(EngineError::BadIdentifier(ident.to_string()));
        }
        for q in &quals[..quals.len() - 1] {
            ctx = match self.find_here(ctx, q) {
                Some(t) => t,
                None => self.make_term(ctx, q),
            };
        }
        let leaf_name = quals[quals.len() - 1];
        let leaf = match self.find_here(ctx, leaf_name) {
            Some(t) => t,
            None => self.make_term(ctx, leaf_name),
        };
        if self.definition(leaf) == Some(CellId::PLACEHOLDER) {
            self.bind_fresh(leaf, def);
        } else {
            self.assign_term(leaf, def);
        }
        Ok(leaf)
    }

    /// Create or rebind a context: a term defined as a node.
    pub fn define_node(
        &mut self,
        context: CellId,
        ident: &str,
        source: Option<String>,
    ) -> Result<CellId> {
        let node = self.heap.new_cell(CellKind::Node(NodeData { source }));
        self.define_term(context, ident, node)
    }

    /// Build an undefined term and link it into its parent's glossary.
    fn make_term(&mut self, parent: CellId, name: &str) -> CellId {
        let name: Rc<str> = name.into();
        let id = self.heap.new_cell(CellKind::Term(TermData {
            parent: Some(parent),
            name: name.clone(),
            def: CellId::PLACEHOLDER,
            gloss: crate::avl::Avl::new(),
        }));
        self.grab(id); // the glossary's reference
        if let Some(p) = self.term_mut(parent) {
            p.gloss.insert(name, id);
        }
        id
    }

    /// First binding of an undefined term.
    fn bind_fresh(&mut self, term: CellId, def: CellId) {
        let was_enabled = !self.value(term).is_disabled();
        if was_enabled {
            self.enable(def, Some(term));
        }
        if let Some(t) = self.term_mut(term) {
            t.def = def;
        }
        self.grab(def);
        if self.is_constant(def) {
            // static values promote immediately; no need to wait for enable
            let v = self.value(def);
            self.slot_mut(term).value = v;
        } else {
            let level = self.slot(def).level + 1;
            self.slot_mut(term).level = level;
        }
    }

    /// Rebind a term's definition and publish the resulting value change.
    /// Raises levels when the new definition reaches the term's level; a
    /// term with no subscribers goes dormant instead of chasing a value it
    /// does not need.
    pub fn assign_term(&mut self, term: CellId, new: CellId) {
        let Some(t) = self.term(term) else {
            error!(cell = %self.display(term), "assignment target is not a term");
            return;
        };
        let old_def = t.def;
        if old_def == new {
            return;
        }
        if old_def != CellId::PLACEHOLDER {
            self.disable(old_def, Some(term));
            self.drop_ref(old_def);
        }
        if let Some(t) = self.term_mut(term) {
            t.def = new;
        }
        self.grab(new);
        let old_value = self.value(term);
        if old_value.is_disabled() {
            // promote static values immediately; cells wait for enable
            if self.is_constant(new) {
                let v = self.value(new);
                self.slot_mut(term).value = v;
            }
            return;
        }
        if !self.is_constant(new) {
            if self.slot(new).level >= self.slot(term).level {
                let level = self.slot(new).level + 1;
                self.slot_mut(term).level = level;
                self.raise_levels(term);
            }
            if self.slot(term).subs.is_empty() {
                self.slot_mut(term).value = Value::Disabled;
                return;
            }
            self.enable(new, Some(term));
        } else {
            self.slot_mut(term).level = 0;
        }
        let v = self.value(new);
        self.slot_mut(term).value = v.clone();
        if !v.same(&old_value) {
            self.publish(term);
        }
    }

    /// Remove a term: refuse while outside references remain, otherwise
    /// undefine its whole subtree and release it.
    pub fn undefine(&mut self, term: CellId) -> Result<()> {
        let Some(t) = self.term(term) else {
            return Err(EngineError::BadIdentifier(self.display(term)));
        };
        if self.slot(term).refcnt > 1 {
            return Err(EngineError::StillReferenced(self.term_name(term)));
        }
        let children: Vec<CellId> = t.gloss.iter().map(|(_, c)| *c).collect();
        for child in children {
            if let Err(e) = self.undefine(child) {
                error!("{e}");
            }
        }
        self.drop_ref(term);
        Ok(())
    }

    /// Term destructor: unsubscribe from the definition, release it, and
    /// unlink from the parent glossary. A term whose glossary is not empty
    /// stays behind as an undefined shell.
    pub(crate) fn destroy_term(&mut self, id: CellId) {
        let Some(t) = self.term(id) else {
            return;
        };
        let (def, parent, name, has_children) =
            (t.def, t.parent, t.name.clone(), !t.gloss.is_empty());
        if def != CellId::PLACEHOLDER {
            self.disable(def, Some(id));
            self.drop_ref(def);
        }
        if has_children {
            self.slot_mut(id).value = Value::Disabled;
            if let Some(t) = self.term_mut(id) {
                t.def = CellId::PLACEHOLDER;
            }
            return;
        }
        if let Some(p) = parent {
            let removed = match self.term_mut(p) {
                Some(pt) => pt.gloss.remove(&name).is_some(),
                None => true,
            };
            if !removed {
                error!(term = %name, "term not found in its context glossary");
            }
        }
        self.free_slot(id);
    }

    /// Resolve a term whose definition is Unknown by consulting the
    /// nearest context source. Without a source the value simply stays
    /// Unknown.
    pub(crate) fn resolve_term(&mut self, term: CellId) {
        let name = self.term_name(term);
        let mut cursor = self.term(term).and_then(|t| t.parent);
        let mut source = None;
        while let Some(ctx) = cursor {
            let def = match self.term(ctx) {
                Some(t) => t.def,
                None => break,
            };
            if let CellKind::Node(NodeData {
                source: Some(s), ..
            }) = &self.slot(def).kind
            {
                source = Some(s.clone());
                break;
            }
            cursor = self.term(ctx).and_then(|t| t.parent);
        }
        let Some(source) = source else {
            warn!(term = %name, "no consultant for unknown term");
            return;
        };
        let text = if let Some(path) = source.strip_prefix('<') {
            ask_file(path, &name)
        } else {
            ask_command(&source, &name)
        };
        let def = match text.as_deref().map(str::trim) {
            None | Some("") | Some("?") => CellId::UNKNOWN,
            Some(t) => match t.parse::<f64>() {
                Ok(r) => self.intern_real(r),
                Err(_) => self.intern_string(t.trim_matches('"')),
            },
        };
        if def == CellId::UNKNOWN {
            if text.is_some() {
                warn!(term = %name, "source value unusable; treated as Unknown");
            }
            return;
        }
        if let Some(t) = self.term_mut(term) {
            t.def = def;
        }
        self.grab(def);
        let v = self.value(def);
        self.slot_mut(term).value = v;
        self.publish(term);
        self.react_drain();
    }
}

/// Look up `name=value` in a file source.
fn ask_file(path: &str, name: &str) -> Option<String> {
    let body = match std::fs::read_to_string(path.trim()) {
        Ok(b) => b,
        Err(e) => {
            warn!(path, "cannot read source file: {e}");
            return None;
        }
    };
    body.lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, v)| v.trim().to_string())
}

/// Run a command source with the term name as its argument and take the
/// first line of output.
fn ask_command(command: &str, name: &str) -> Option<String> {
    let out = match Command::new("sh")
        .arg("-c")
        .arg(format!("{command} {name}"))
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            warn!(command, "cannot run source command: {e}");
            return None;
        }
    };
    let stdout = String::from_utf8_lossy(&out.stdout);
    stdout.lines().next().map(|l| l.to_string())
}
