//! Graph over all stages of a repository
//!
//! The graph is rebuilt from an explicit stage set before every mutating
//! batch operation and never persisted. Building it enforces the structural
//! invariants: no output claimed twice, no output nested inside another
//! stage's output, and no dependency cycle.

use crate::error::{Result, StageError};
use crate::stage::Stage;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

/// Edges point from a stage to the stages producing what it depends on.
#[derive(Debug)]
pub struct StageGraph {
    stages: Vec<Stage>,
    graph: DiGraph<usize, ()>,
}

impl StageGraph {
    /// Build and validate the graph for a complete stage set
    pub fn build(mut stages: Vec<Stage>) -> Result<Self> {
        stages.sort_by(|a, b| a.path().cmp(b.path()));
        check_duplicates(&stages)?;
        check_overlaps(&stages)?;

        let mut graph = DiGraph::with_capacity(stages.len(), 0);
        let nodes: Vec<NodeIndex> = (0..stages.len()).map(|i| graph.add_node(i)).collect();

        for (from, stage) in stages.iter().enumerate() {
            for dep in stage.deps() {
                for (to, producer) in stages.iter().enumerate() {
                    if producer.outs().iter().any(|out| related(out.path(), dep.path())) {
                        graph.update_edge(nodes[from], nodes[to], ());
                    }
                }
            }
        }

        let built = Self { stages, graph };
        built.check_acyclic()?;
        tracing::debug!(
            stages = built.stages.len(),
            edges = built.graph.edge_count(),
            "built stage graph"
        );
        Ok(built)
    }

    /// Check candidate stages against the existing set.
    ///
    /// A candidate replaces an existing stage with the same tracking file;
    /// the combined set must satisfy every graph invariant.
    pub fn validate(candidates: Vec<Stage>, existing: Vec<Stage>) -> Result<Self> {
        let mut stages: Vec<Stage> = existing
            .into_iter()
            .filter(|stage| !candidates.iter().any(|c| c.path() == stage.path()))
            .collect();
        stages.extend(candidates);
        Self::build(stages)
    }

    /// Stages ordered by tracking-file path
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, path: &Path) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.path() == path)
    }

    /// Stage whose output is `path` or contains it
    pub fn owner_of(&self, path: &Path) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| stage.outs().iter().any(|out| path.starts_with(out.path())))
    }

    /// Dependencies before dependents, ties broken by tracking-file path
    pub fn topological_order(&self) -> Vec<&Stage> {
        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| self.graph.neighbors_directed(node, Direction::Outgoing).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<(&Path, usize)>> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse((self.stages[i].path(), i)))
            .collect();

        let mut order = Vec::with_capacity(self.stages.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            order.push(&self.stages[i]);
            for dependent in self
                .graph
                .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
            {
                let j = self.graph[dependent];
                pending[j] -= 1;
                if pending[j] == 0 {
                    ready.push(Reverse((self.stages[j].path(), j)));
                }
            }
        }
        order
    }

    fn check_acyclic(&self) -> Result<()> {
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .map(|&node| self.graph.contains_edge(node, node))
                    .unwrap_or(false);
            if cyclic {
                let mut stages: Vec<PathBuf> = component
                    .iter()
                    .map(|&node| self.stages[self.graph[node]].path().to_path_buf())
                    .collect();
                stages.sort();
                return Err(StageError::CyclicGraph { stages });
            }
        }
        Ok(())
    }
}

/// True if one path equals or contains the other
fn related(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

fn check_duplicates(stages: &[Stage]) -> Result<()> {
    let mut owners: BTreeMap<&Path, Vec<PathBuf>> = BTreeMap::new();
    for stage in stages {
        for out in stage.outs() {
            owners
                .entry(out.path())
                .or_default()
                .push(stage.path().to_path_buf());
        }
    }
    match owners.into_iter().find(|(_, owners)| owners.len() > 1) {
        Some((output, stages)) => Err(StageError::OutputDuplication {
            output: output.to_path_buf(),
            stages,
        }),
        None => Ok(()),
    }
}

fn check_overlaps(stages: &[Stage]) -> Result<()> {
    let mut outputs: HashMap<&Path, &Stage> = HashMap::new();
    for stage in stages {
        for out in stage.outs() {
            outputs.insert(out.path(), stage);
        }
    }

    let mut paths: Vec<&Path> = outputs.keys().copied().collect();
    paths.sort();
    for path in paths {
        let parent = path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .find_map(|ancestor| outputs.get_key_value(ancestor));
        if let Some((parent, parent_stage)) = parent {
            return Err(StageError::OverlappingOutputs {
                output: path.to_path_buf(),
                stage: outputs[path].path().to_path_buf(),
                parent: parent.to_path_buf(),
                parent_stage: parent_stage.path().to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{Dependency, PathDependency};
    use crate::output::Output;

    fn stage(path: &str, outs: &[&str], deps: &[&str]) -> Stage {
        Stage::new(
            PathBuf::from(path),
            outs.iter().map(|o| Output::new(PathBuf::from(o), true)).collect(),
            deps.iter()
                .map(|d| Dependency::Path(PathDependency::new(PathBuf::from(d))))
                .collect(),
        )
        .unwrap()
    }

    fn order(graph: &StageGraph) -> Vec<&str> {
        graph
            .topological_order()
            .into_iter()
            .map(|s| s.path().to_str().unwrap())
            .collect()
    }

    #[test]
    fn test_new_output_inside_existing() {
        let existing = vec![stage("data.dvs", &["data"], &[])];
        let err = StageGraph::validate(vec![stage("data/file.dvs", &["data/file"], &[])], existing)
            .unwrap_err();
        match err {
            StageError::OverlappingOutputs {
                output,
                stage,
                parent,
                parent_stage,
            } => {
                assert_eq!(output, PathBuf::from("data/file"));
                assert_eq!(stage, PathBuf::from("data/file.dvs"));
                assert_eq!(parent, PathBuf::from("data"));
                assert_eq!(parent_stage, PathBuf::from("data.dvs"));
            }
            other => panic!("expected overlap, got {:?}", other),
        }
    }

    #[test]
    fn test_existing_output_inside_new() {
        let existing = vec![stage("data/file.dvs", &["data/file"], &[])];
        let err = StageGraph::validate(vec![stage("data.dvs", &["data"], &[])], existing).unwrap_err();
        match err {
            StageError::OverlappingOutputs { output, parent, .. } => {
                assert_eq!(output, PathBuf::from("data/file"));
                assert_eq!(parent, PathBuf::from("data"));
            }
            other => panic!("expected overlap, got {:?}", other),
        }
    }

    #[test]
    fn test_sibling_outputs_are_fine() -> anyhow::Result<()> {
        let existing = vec![stage("data/a.dvs", &["data/a"], &[])];
        let graph = StageGraph::validate(
            vec![stage("data/ab.dvs", &["data/ab"], &[])],
            existing,
        )?;
        assert_eq!(graph.len(), 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_output() {
        let err = StageGraph::build(vec![
            stage("one.dvs", &["file"], &[]),
            stage("two.dvs", &["file"], &[]),
        ])
        .unwrap_err();
        match err {
            StageError::OutputDuplication { output, stages } => {
                assert_eq!(output, PathBuf::from("file"));
                assert_eq!(stages, vec![PathBuf::from("one.dvs"), PathBuf::from("two.dvs")]);
            }
            other => panic!("expected duplication, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_replaces_same_tracking_file() -> anyhow::Result<()> {
        let existing = vec![stage("file.dvs", &["file"], &[])];
        let graph = StageGraph::validate(vec![stage("file.dvs", &["file"], &[])], existing)?;
        assert_eq!(graph.len(), 1);
        Ok(())
    }

    #[test]
    fn test_cycle_is_reported() {
        let err = StageGraph::build(vec![
            stage("a.dvs", &["a"], &["b"]),
            stage("b.dvs", &["b"], &["a"]),
        ])
        .unwrap_err();
        match err {
            StageError::CyclicGraph { stages } => {
                assert_eq!(stages, vec![PathBuf::from("a.dvs"), PathBuf::from("b.dvs")]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = StageGraph::build(vec![stage("a.dvs", &["a"], &["a/part"])]).unwrap_err();
        assert!(matches!(err, StageError::CyclicGraph { .. }));
    }

    #[test]
    fn test_topological_order_is_deterministic() -> anyhow::Result<()> {
        let graph = StageGraph::build(vec![
            stage("train.dvs", &["model"], &["features", "params.yaml"]),
            stage("zeta.dvs", &["zeta"], &[]),
            stage("featurize.dvs", &["features"], &["raw/images"]),
            stage("raw.dvs", &["raw"], &[]),
            stage("alpha.dvs", &["alpha"], &[]),
        ])?;
        assert_eq!(
            order(&graph),
            vec!["alpha.dvs", "raw.dvs", "featurize.dvs", "train.dvs", "zeta.dvs"]
        );
        Ok(())
    }

    #[test]
    fn test_owner_of() -> anyhow::Result<()> {
        let graph = StageGraph::build(vec![
            stage("data.dvs", &["data"], &[]),
            stage("model.dvs", &["model.pkl"], &[]),
        ])?;
        assert_eq!(
            graph.owner_of(Path::new("data/sub/file")).map(|s| s.path()),
            Some(Path::new("data.dvs"))
        );
        assert!(graph.owner_of(Path::new("database")).is_none());
        assert!(graph.stage(Path::new("model.dvs")).is_some());
        Ok(())
    }
}
