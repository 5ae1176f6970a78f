//! Template inclusion graph
//!
//! Templates are stored in an arena and referenced by [`TemplateId`]. Edges
//! point from a template to the fragments it renders. Inclusion can be
//! cyclic, so every traversal keeps a visited set.

use super::normalize_path;
use crate::checks::Outline;
use crate::config::ProjectConfig;
use crate::extract::extract;
use crate::markup::Document;
use crate::violation::TemplateKind;
use globset::GlobSet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `render "shared/nav"`, `render partial: "form"`, `render(:partial => 'row')`
static RENDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brender\s*\(?\s*(?:partial:\s*|:partial\s*=>\s*)?["']([^"']+)["']"#)
        .expect("render pattern is valid")
});

/// Index of a template in a [`TemplateGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateId(usize);

/// One template file
#[derive(Debug, Clone)]
pub struct TemplateNode {
    pub path: PathBuf,
    pub kind: TemplateKind,
    /// Fragments rendered directly by this template
    pub includes: Vec<TemplateId>,
    /// Inclusion directives that matched no known template
    pub unresolved: Vec<String>,
    /// Landmarks, literal ids and h1s found in the template
    pub outline: Outline,
}

/// Fragment names referenced by inclusion directives inside code regions
pub fn inclusion_directives(source: &str) -> Vec<String> {
    let code: Vec<&str> = match extract(source) {
        Ok(extraction) => extraction
            .regions
            .iter()
            .map(|region| &source[region.start..region.end])
            .collect(),
        Err(_) => vec![source],
    };
    code.iter()
        .flat_map(|region| RENDER_RE.captures_iter(region))
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// `_nav.html.erb` -> `_nav`
pub fn template_stem(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or("")
}

/// `show.html.erb` -> `show`, `_form.html.erb` -> `form`
pub fn action_name(path: &Path) -> &str {
    template_stem(path).trim_start_matches('_')
}

/// Kind inferred from naming convention
pub fn template_kind(path: &Path, layouts_dir: &Path) -> TemplateKind {
    if path.starts_with(layouts_dir) {
        TemplateKind::Layout
    } else if template_stem(path).starts_with('_') {
        TemplateKind::Partial
    } else {
        TemplateKind::View
    }
}

/// Inclusion graph for every template under the views directory
#[derive(Debug, Clone, Default)]
pub struct TemplateGraph {
    views_dir: PathBuf,
    layouts_dir: PathBuf,
    nodes: Vec<TemplateNode>,
    by_path: HashMap<PathBuf, TemplateId>,
    included_by: Vec<Vec<TemplateId>>,
}

impl TemplateGraph {
    /// Walk the views directory and build the graph
    pub fn build(project: &ProjectConfig, root: &Path, exclude: &GlobSet) -> Self {
        let views_dir = normalize_path(&project.views_dir(root));
        let layouts_dir = normalize_path(&project.layouts_dir(root));
        let mut sources = Vec::new();

        if views_dir.is_dir() {
            for entry in WalkDir::new(&views_dir).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Cannot walk {}: {}", views_dir.display(), e);
                        continue;
                    }
                };
                let path = normalize_path(entry.path());
                if !entry.file_type().is_file() || !project.is_template(&path) {
                    continue;
                }
                if exclude.is_match(&path) {
                    log::debug!("Excluded template {}", path.display());
                    continue;
                }
                match std::fs::read_to_string(&path) {
                    Ok(source) => sources.push((path, source)),
                    Err(e) => log::warn!("Cannot read template {}: {}", path.display(), e),
                }
            }
        }

        Self::from_sources(views_dir, layouts_dir, sources)
    }

    /// Build from in-memory template sources
    pub fn from_sources<I>(
        views_dir: impl Into<PathBuf>,
        layouts_dir: impl Into<PathBuf>,
        sources: I,
    ) -> Self
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        let mut graph = Self {
            views_dir: normalize_path(&views_dir.into()),
            layouts_dir: normalize_path(&layouts_dir.into()),
            ..Default::default()
        };

        let mut sources: Vec<(PathBuf, String)> = sources
            .into_iter()
            .map(|(path, source)| (normalize_path(&path), source))
            .collect();
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        sources.dedup_by(|a, b| a.0 == b.0);

        for (path, source) in &sources {
            let kind = template_kind(path, &graph.layouts_dir);
            let id = TemplateId(graph.nodes.len());
            graph.nodes.push(TemplateNode {
                path: path.clone(),
                kind,
                includes: Vec::new(),
                unresolved: Vec::new(),
                outline: outline_of(path, source),
            });
            graph.by_path.insert(path.clone(), id);
            graph.included_by.push(Vec::new());
        }

        for (index, (path, source)) in sources.iter().enumerate() {
            let from = TemplateId(index);
            for name in inclusion_directives(source) {
                match graph.resolve_fragment(path, &name) {
                    Some(target) => {
                        if !graph.nodes[index].includes.contains(&target) {
                            graph.nodes[index].includes.push(target);
                            graph.included_by[target.0].push(from);
                        }
                    }
                    None => {
                        log::debug!("{}: unresolved fragment '{}'", path.display(), name);
                        graph.nodes[index].unresolved.push(name);
                    }
                }
            }
        }

        graph
    }

    pub fn views_dir(&self) -> &Path {
        &self.views_dir
    }

    pub fn layouts_dir(&self) -> &Path {
        &self.layouts_dir
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<TemplateId> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    pub fn node(&self, id: TemplateId) -> &TemplateNode {
        &self.nodes[id.0]
    }

    pub fn path(&self, id: TemplateId) -> &Path {
        &self.nodes[id.0].path
    }

    /// All templates, sorted by path
    pub fn templates(&self) -> impl Iterator<Item = (TemplateId, &TemplateNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (TemplateId(i), n))
    }

    /// Templates that render `id` directly
    pub fn includers(&self, id: TemplateId) -> &[TemplateId] {
        &self.included_by[id.0]
    }

    /// Fragments reachable from `id`, excluding `id` itself, in discovery order
    pub fn fragments(&self, id: TemplateId) -> Vec<TemplateId> {
        let mut visited = HashSet::new();
        visited.insert(id);
        let mut order = Vec::new();
        let mut stack: Vec<TemplateId> = self.nodes[id.0].includes.iter().rev().copied().collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current);
            stack.extend(self.nodes[current.0].includes.iter().rev().copied());
        }

        order
    }

    /// `id` plus every fragment it transitively renders
    pub fn dependency_set(&self, id: TemplateId) -> BTreeSet<PathBuf> {
        std::iter::once(id)
            .chain(self.fragments(id))
            .map(|t| self.nodes[t.0].path.clone())
            .collect()
    }

    /// Resolve a fragment name as written in a directive
    ///
    /// `shared/nav` is looked up as `<views>/shared/_nav.*`; a bare `nav`
    /// is looked up next to the including template.
    pub fn resolve_fragment(&self, from: &Path, name: &str) -> Option<TemplateId> {
        let name = name.trim().trim_start_matches('/');
        let (dir, base) = match name.rsplit_once('/') {
            Some((dir, base)) => (self.views_dir.join(dir), base),
            None => (from.parent()?.to_path_buf(), name),
        };
        let base = base.trim_start_matches('_');
        let prefix = format!("_{}.", base);
        let exact = format!("_{}", base);

        let mut candidates: Vec<TemplateId> = self
            .templates()
            .filter(|(_, node)| node.path.parent() == Some(dir.as_path()))
            .filter(|(_, node)| {
                let file = node.path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                file.starts_with(&prefix) || file == exact
            })
            .map(|(id, _)| id)
            .collect();
        // Prefer html formats over other formats of the same partial
        candidates.sort_by_key(|id| {
            let file = self.nodes[id.0].path.to_string_lossy().to_string();
            (!file.contains(".html."), file)
        });
        candidates.first().copied()
    }

    /// Controller directory of a view, relative to the views directory
    pub fn controller_of(&self, path: &Path) -> Option<String> {
        let relative = normalize_path(path)
            .strip_prefix(&self.views_dir)
            .ok()?
            .parent()?
            .to_path_buf();
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Views directly inside a controller directory
    pub fn views_for_controller(&self, controller: &str) -> Vec<TemplateId> {
        let dir = self.views_dir.join(controller);
        self.templates()
            .filter(|(_, node)| node.kind == TemplateKind::View)
            .filter(|(_, node)| node.path.parent() == Some(dir.as_path()))
            .map(|(id, _)| id)
            .collect()
    }

    /// Layout for a controller: `layouts/<controller>.*`, else `layouts/application.*`
    pub fn layout_for(&self, controller: Option<&str>) -> Option<TemplateId> {
        let find = |dir: PathBuf, stem: &str| {
            self.templates()
                .filter(|(_, node)| node.kind == TemplateKind::Layout)
                .filter(|(_, node)| node.path.parent() == Some(dir.as_path()))
                .find(|(_, node)| template_stem(&node.path) == stem)
                .map(|(id, _)| id)
        };

        if let Some(controller) = controller {
            let (dir, stem) = match controller.rsplit_once('/') {
                Some((ns, name)) => (self.layouts_dir.join(ns), name),
                None => (self.layouts_dir.clone(), controller),
            };
            if let Some(id) = find(dir, stem) {
                return Some(id);
            }
        }
        find(self.layouts_dir.clone(), "application")
    }
}

fn outline_of(path: &Path, source: &str) -> Outline {
    let parsed = extract(source)
        .map_err(|e| e.to_string())
        .and_then(|x| Document::parse(&x.markup, &x.map).map_err(|e| e.to_string()));
    match parsed {
        Ok(doc) => Outline::of(&doc),
        Err(e) => {
            log::debug!("Cannot outline {}: {}", path.display(), e);
            Outline::default()
        }
    }
}
