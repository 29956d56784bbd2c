//! Turning a file listing into dispatchable work.
//!
//! [`plan`] groups multi-part titles, resolves one identifier per title and
//! hands the result to a [`Dispatcher`].

mod dispatch;

pub use dispatch::{Dispatcher, ItemOutcome, MetadataSource};

use crate::fragment::{FragmentDetector, FragmentGroup};
use crate::identifier::{Identifier, IdentifierParser};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WorkItemKind {
    Single {
        path: PathBuf,
    },
    Group {
        base_name: String,
        main_file: PathBuf,
        /// All parts, main file first
        fragments: Vec<PathBuf>,
    },
}

/// One title to fetch metadata for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub identifier: Identifier,
    pub kind: WorkItemKind,
}

impl WorkItem {
    pub fn single(identifier: Identifier, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier,
            kind: WorkItemKind::Single { path: path.into() },
        }
    }

    fn from_group(identifier: Identifier, group: &FragmentGroup) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier,
            kind: WorkItemKind::Group {
                base_name: group.base_name().to_string(),
                main_file: group.main_file().to_path_buf(),
                fragments: group.paths(),
            },
        }
    }

    /// The file the identifier was resolved from
    pub fn main_file(&self) -> &Path {
        match &self.kind {
            WorkItemKind::Single { path } => path,
            WorkItemKind::Group { main_file, .. } => main_file,
        }
    }

    /// Every file covered by this item
    pub fn paths(&self) -> Vec<PathBuf> {
        match &self.kind {
            WorkItemKind::Single { path } => vec![path.clone()],
            WorkItemKind::Group { fragments, .. } => fragments.clone(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, WorkItemKind::Group { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkPlan {
    pub items: Vec<WorkItem>,
    /// Files no identifier could be resolved for
    pub skipped: Vec<PathBuf>,
}

impl WorkPlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Build a plan from `paths`: one item per fragment group, resolved through
/// its main file, followed by one item per remaining file.
pub fn plan<P: AsRef<Path>>(
    paths: &[P],
    parser: &IdentifierParser,
    detector: &FragmentDetector,
) -> WorkPlan {
    let (groups, singles) = detector.group(paths);
    let mut plan = WorkPlan::default();

    for group in &groups {
        match parser.identify(&group.main_file().to_string_lossy()) {
            Some(identifier) => plan.items.push(WorkItem::from_group(identifier, group)),
            None => plan.skipped.extend(group.paths()),
        }
    }

    for path in singles {
        match parser.identify(&path.to_string_lossy()) {
            Some(identifier) => plan.items.push(WorkItem::single(identifier, path)),
            None => plan.skipped.push(path),
        }
    }

    tracing::info!(
        files = paths.len(),
        groups = groups.len(),
        items = plan.items.len(),
        skipped = plan.skipped.len(),
        "Work plan ready"
    );
    plan
}
