//! View and fragment resolution
//!
//! Maps a page identity (a route or a template path) to the templates that
//! produce it: the primary template, its layout and every fragment they
//! render. Route identities go through a [`RouteTable`] first and are then
//! matched against the views directory by naming convention.

mod attribution;
mod graph;
mod routes;

pub use attribution::{attribute, fragment_region, region_hint, Attribution, Region};
pub use graph::{
    action_name, inclusion_directives, template_kind, template_stem, TemplateGraph, TemplateId,
    TemplateNode,
};
pub use routes::{ConventionalRoutes, RouteTable, RouteTarget, StaticRoutes};

use crate::tracker::LogicalPage;
use crate::violation::{PageContext, PageIdentity, TemplateKind};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Drop `.` components so the same file always has the same key
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// A page that could not be tied to one template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve '{identity}': {reason}")]
pub struct ResolutionAmbiguity {
    pub identity: String,
    /// Templates that matched equally well, if any
    pub candidates: Vec<PathBuf>,
    pub reason: String,
}

/// Templates behind one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: PageIdentity,
    pub primary_template: Option<PathBuf>,
    pub layout_template: Option<PathBuf>,
    /// Fragments rendered by the primary template and the layout, in discovery order
    pub fragments: Vec<PathBuf>,
    pub kind: TemplateKind,
    /// Landmarks provided by the layout
    pub inherited_landmarks: BTreeSet<String>,
    /// h1s rendered by the layout and fragments
    pub inherited_h1s: usize,
    pub ambiguity: Option<ResolutionAmbiguity>,
}

impl Resolution {
    fn unresolved(identity: &PageIdentity, ambiguity: ResolutionAmbiguity) -> Self {
        Self {
            identity: identity.clone(),
            primary_template: None,
            layout_template: None,
            fragments: Vec::new(),
            kind: TemplateKind::View,
            inherited_landmarks: BTreeSet::new(),
            inherited_h1s: 0,
            ambiguity: Some(ambiguity),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.primary_template.is_some()
    }

    /// Primary, layout and every fragment
    pub fn dependency_set(&self) -> BTreeSet<PathBuf> {
        self.primary_template
            .iter()
            .chain(self.layout_template.iter())
            .chain(self.fragments.iter())
            .cloned()
            .collect()
    }

    /// Context for violations found in the primary template
    ///
    /// An unresolved page gets a degraded context carrying only its identity.
    pub fn page_context(&self) -> PageContext {
        PageContext {
            identity: self.identity.clone(),
            view_file: self.primary_template.clone(),
            fragment_file: None,
            kind: self.kind,
            inherited_landmarks: self.inherited_landmarks.clone(),
            inherited_h1s: self.inherited_h1s,
        }
    }

    /// Context for violations found inside one of the page's other templates
    pub fn fragment_context(&self, fragment: &Path, kind: TemplateKind) -> PageContext {
        PageContext {
            identity: self.identity.clone(),
            view_file: self.primary_template.clone(),
            fragment_file: Some(fragment.to_path_buf()),
            kind,
            inherited_landmarks: BTreeSet::new(),
            inherited_h1s: 0,
        }
    }

    pub fn to_logical_page(&self) -> LogicalPage {
        LogicalPage {
            identity: self.identity.clone(),
            primary_template: self.primary_template.clone(),
            layout_template: self.layout_template.clone(),
            dependency_set: self.dependency_set(),
        }
    }
}

/// Resolves page identities against a template graph
pub struct ViewResolver<'a> {
    graph: &'a TemplateGraph,
    routes: &'a dyn RouteTable,
}

impl<'a> ViewResolver<'a> {
    pub fn new(graph: &'a TemplateGraph, routes: &'a dyn RouteTable) -> Self {
        Self { graph, routes }
    }

    pub fn graph(&self) -> &TemplateGraph {
        self.graph
    }

    pub fn resolve(&self, identity: &PageIdentity) -> Resolution {
        let result = match identity {
            PageIdentity::Route(route) => self.resolve_route(route),
            PageIdentity::File(path) => Ok(self.resolve_file(path)),
        };
        match result {
            Ok((primary, kind)) => self.assemble(identity, primary, kind),
            Err(ambiguity) => {
                log::warn!("{}", ambiguity);
                Resolution::unresolved(identity, ambiguity)
            }
        }
    }

    /// Every view in the graph as a file page
    pub fn resolve_all_views(&self) -> Vec<Resolution> {
        self.graph
            .templates()
            .filter(|(_, node)| node.kind == TemplateKind::View)
            .map(|(_, node)| self.resolve(&PageIdentity::File(node.path.clone())))
            .collect()
    }

    fn resolve_route(&self, route: &str) -> Result<(PathBuf, TemplateKind), ResolutionAmbiguity> {
        let ambiguity = |candidates: Vec<PathBuf>, reason: String| ResolutionAmbiguity {
            identity: route.to_string(),
            candidates,
            reason,
        };

        let target = self
            .routes
            .lookup(route)
            .ok_or_else(|| ambiguity(Vec::new(), "no route matches".to_string()))?;

        let views: Vec<PathBuf> = self
            .graph
            .views_for_controller(&target.controller)
            .into_iter()
            .map(|id| self.graph.path(id).to_path_buf())
            .collect();

        if let Some(exact) = exact_match(&views, &target.action) {
            log::debug!("Route {} -> {} (exact)", route, exact.display());
            return Ok((exact, TemplateKind::View));
        }

        match pick_closest(&views, &target.action) {
            Closest::One(path) => {
                log::debug!("Route {} -> {} (closest)", route, path.display());
                Ok((path, TemplateKind::View))
            }
            Closest::Tied(candidates) => Err(ambiguity(
                candidates,
                format!("several templates fit {}", target),
            )),
            Closest::None => Err(ambiguity(Vec::new(), format!("no template for {}", target))),
        }
    }

    fn resolve_file(&self, path: &Path) -> (PathBuf, TemplateKind) {
        let path = normalize_path(path);
        let kind = match self.graph.get(&path) {
            Some(id) => self.graph.node(id).kind,
            None => template_kind(&path, self.graph.layouts_dir()),
        };
        (path, kind)
    }

    fn assemble(
        &self,
        identity: &PageIdentity,
        primary: PathBuf,
        kind: TemplateKind,
    ) -> Resolution {
        // Only views known to the project get a layout
        let layout = match self.graph.get(&primary) {
            Some(_) if kind == TemplateKind::View => self
                .graph
                .layout_for(self.graph.controller_of(&primary).as_deref()),
            _ => None,
        };

        let mut fragments: Vec<PathBuf> = Vec::new();
        let roots = self.graph.get(&primary).into_iter().chain(layout);
        for root in roots {
            for fragment in self.graph.fragments(root) {
                let path = self.graph.path(fragment);
                if path != primary && !fragments.iter().any(|f| f == path) {
                    fragments.push(path.to_path_buf());
                }
            }
        }

        let inherited_landmarks = layout
            .map(|id| self.graph.node(id).outline.landmarks.clone())
            .unwrap_or_default();
        let inherited_h1s = layout
            .into_iter()
            .chain(fragments.iter().filter_map(|f| self.graph.get(f)))
            .map(|id| self.graph.node(id).outline.h1s.len())
            .sum();

        Resolution {
            identity: identity.clone(),
            primary_template: Some(primary),
            layout_template: layout.map(|id| self.graph.path(id).to_path_buf()),
            fragments,
            kind,
            inherited_landmarks,
            inherited_h1s,
            ambiguity: None,
        }
    }
}

/// Template named exactly after the action, html format first
fn exact_match(views: &[PathBuf], action: &str) -> Option<PathBuf> {
    let mut matches: Vec<&PathBuf> = views
        .iter()
        .filter(|p| template_stem(p) == action)
        .collect();
    matches.sort_by_key(|p| (!p.to_string_lossy().contains(".html."), p.to_path_buf()));
    matches.first().map(|p| (*p).clone())
}

/// Outcome of fuzzy template matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closest {
    One(PathBuf),
    Tied(Vec<PathBuf>),
    None,
}

/// Pick the template whose name is closest to `action`
///
/// Prefix matches (`show_full` for `show`) beat substring matches
/// (`quick_show`); among those, the name with the fewest extra characters
/// wins. A tie for the best score is ambiguous.
pub fn pick_closest(candidates: &[PathBuf], action: &str) -> Closest {
    if action.is_empty() {
        return Closest::None;
    }

    let mut scored: Vec<((u8, usize), &PathBuf)> = candidates
        .iter()
        .filter_map(|path| {
            let stem = template_stem(path);
            let rank = if stem.starts_with(action) {
                0
            } else if stem.contains(action) {
                1
            } else {
                return None;
            };
            Some(((rank, stem.len().abs_diff(action.len())), path))
        })
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let Some(&(best, _)) = scored.first() else {
        return Closest::None;
    };
    let mut tied: Vec<PathBuf> = scored
        .iter()
        .filter(|(score, _)| *score == best)
        .map(|(_, path)| (*path).clone())
        .collect();

    if tied.len() == 1 {
        Closest::One(tied.remove(0))
    } else {
        Closest::Tied(tied)
    }
}
