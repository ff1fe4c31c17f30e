//! Per-import diagnostics.
//!
//! The importer never fails on bad content, it reports what it had to work
//! around here instead. One `Diagnostics` value is threaded through a single
//! import, so "report once" state never leaks between unrelated files.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, trace, warn};

/// Something the importer had to work around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A rotation order we don't convert (spheric XYZ or an unknown value).
    /// The angles were used as if they were XYZ.
    UnhandledRotationOrder(i32),
    /// A loop in the connection graph; the walk stopped at this object.
    ConnectionCycle(String),
    /// A cluster links to an object that isn't an ordered model, joint 0 was used.
    JointNotInModelList(String),
    /// A mesh is owned by an object that isn't an ordered model, joint 0 was used.
    ModelNotInModelList(String),
    /// A blendshape could not be routed to a mesh.
    OrphanBlendshape(String),
    /// A mesh part has a triangle index count that isn't a multiple of three.
    MalformedTriangles(String),
}

impl Diagnostic {
    fn kind(&self) -> &'static str {
        match self {
            Diagnostic::UnhandledRotationOrder(_) => "unhandled rotation order",
            Diagnostic::ConnectionCycle(_) => "connection cycle",
            Diagnostic::JointNotInModelList(_) => "joint not in model list",
            Diagnostic::ModelNotInModelList(_) => "model not in model list",
            Diagnostic::OrphanBlendshape(_) => "orphan blendshape",
            Diagnostic::MalformedTriangles(_) => "malformed triangles",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnhandledRotationOrder(order) => {
                write!(f, "unhandled rotation order in FBX file: {order}")
            }
            Diagnostic::ConnectionCycle(id) => {
                write!(f, "ignoring loop detected in FBX connection map at {id}")
            }
            Diagnostic::JointNotInModelList(id) => write!(f, "joint not in model list: {id}"),
            Diagnostic::ModelNotInModelList(id) => write!(f, "model not in model list: {id}"),
            Diagnostic::OrphanBlendshape(id) => write!(f, "blendshape {id} has no target mesh"),
            Diagnostic::MalformedTriangles(id) => {
                write!(f, "triangle indices of mesh {id} are not divisible by three")
            }
        }
    }
}

/// Diagnostics sink for one import.
#[derive(Debug, Default)]
pub struct Diagnostics {
    url: String,
    entries: Vec<Diagnostic>,
    reported_once: HashSet<&'static str>,
    unclassified_links: usize,
}

impl Diagnostics {
    pub fn new(url: impl Into<String>) -> Self {
        Diagnostics {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Records a diagnostic and logs it.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::ConnectionCycle(_) | Diagnostic::OrphanBlendshape(_) => {
                warn!("{diagnostic} ({})", self.url);
            }
            _ => debug!("{diagnostic} ({})", self.url),
        }
        self.entries.push(diagnostic);
    }

    /// Records a diagnostic only the first time its kind shows up in this import.
    pub fn report_once(&mut self, diagnostic: Diagnostic) {
        if self.reported_once.insert(diagnostic.kind()) {
            warn!("ERROR: {diagnostic} ({})", self.url);
            self.entries.push(diagnostic);
        }
    }

    /// Counts an `OP` connection whose role we don't know about.
    pub(crate) fn unclassified_link(&mut self, role: &str) {
        trace!("unclassified property connection: {role:?}");
        self.unclassified_links += 1;
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn unclassified_links(&self) -> usize {
        self.unclassified_links
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_once_is_scoped_to_the_sink() {
        let mut first = Diagnostics::new("a.fbx");
        first.report_once(Diagnostic::UnhandledRotationOrder(6));
        first.report_once(Diagnostic::UnhandledRotationOrder(6));
        assert_eq!(first.entries().len(), 1);

        let mut second = Diagnostics::new("b.fbx");
        second.report_once(Diagnostic::UnhandledRotationOrder(6));
        assert_eq!(second.entries().len(), 1);
    }

    #[test]
    fn report_keeps_every_entry() {
        let mut diagnostics = Diagnostics::new("c.fbx");
        diagnostics.report(Diagnostic::ConnectionCycle("1".into()));
        diagnostics.report(Diagnostic::ConnectionCycle("2".into()));
        assert_eq!(diagnostics.entries().len(), 2);
        assert_eq!(
            diagnostics.entries()[0].to_string(),
            "ignoring loop detected in FBX connection map at 1"
        );
    }
}
