//! A small dependency-gated stage scheduler.
//!
//! Stages are nodes in a `petgraph` graph with an edge from each dependency to
//! its dependent. Execution launches every stage whose dependencies have all
//! succeeded as its own task, so independent branches overlap. When a stage
//! fails, every stage reachable from it is marked blocked; stages on other
//! branches keep running.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tokio::task::JoinSet;

pub type StageFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>;
type StageFn = Arc<dyn Fn() -> StageFuture + Send + Sync>;

struct Stage {
    name: &'static str,
    run: StageFn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded { summary: String },
    Failed { error: String },
    Blocked { by: &'static str },
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Succeeded { summary } => write!(f, "succeeded ({summary})"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Blocked { by } => write!(f, "blocked by {by}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: &'static str,
    pub state: StageState,
    pub elapsed: Option<Duration>,
}

/// Final state of every stage after one execution, in topological order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|s| matches!(s.state, StageState::Succeeded { .. }))
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<&StageState> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.state)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in &self.stages {
            match stage.elapsed {
                Some(elapsed) => writeln!(
                    f,
                    "{:<10} {} [{:.1}s]",
                    stage.name,
                    stage.state,
                    elapsed.as_secs_f64()
                )?,
                None => writeln!(f, "{:<10} {}", stage.name, stage.state)?,
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct DagBuilder {
    stages: Vec<(&'static str, Vec<&'static str>, StageFn)>,
}

impl DagBuilder {
    /// Add a stage that may start once every stage in `depends_on` succeeded.
    #[must_use]
    pub fn stage<F, Fut>(mut self, name: &'static str, depends_on: &[&'static str], run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let run: StageFn = Arc::new(move || -> StageFuture { Box::pin(run()) });
        self.stages.push((name, depends_on.to_vec(), run));
        self
    }

    /// # Errors
    ///
    /// Fails on a duplicate stage name, a dependency on an unknown stage, or
    /// a dependency cycle.
    pub fn build(self) -> anyhow::Result<Dag> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut edges = Vec::new();

        for (name, depends_on, run) in self.stages {
            if index.contains_key(name) {
                anyhow::bail!("duplicate stage name: {name}");
            }
            let node = graph.add_node(Stage { name, run });
            index.insert(name, node);
            edges.extend(depends_on.into_iter().map(|dep| (dep, name)));
        }

        for (dep, name) in edges {
            let Some(&from) = index.get(dep) else {
                anyhow::bail!("stage {name} depends on unknown stage {dep}");
            };
            graph.add_edge(from, index[name], ());
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            anyhow::anyhow!(
                "stage dependency cycle through {}",
                graph[cycle.node_id()].name
            )
        })?;

        Ok(Dag { graph, order })
    }
}

pub struct Dag {
    graph: DiGraph<Stage, ()>,
    order: Vec<NodeIndex>,
}

impl Dag {
    pub fn builder() -> DagBuilder {
        DagBuilder::default()
    }

    /// Stage names with their direct dependencies, in topological order.
    pub fn dependencies(&self) -> Vec<(&'static str, Vec<&'static str>)> {
        self.order
            .iter()
            .map(|&node| {
                let mut deps: Vec<&'static str> = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .map(|dep| self.graph[dep].name)
                    .collect();
                deps.sort_unstable();
                (self.graph[node].name, deps)
            })
            .collect()
    }

    fn is_ready(&self, node: NodeIndex, states: &[StageState]) -> bool {
        states[node.index()] == StageState::Pending
            && self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .all(|dep| matches!(states[dep.index()], StageState::Succeeded { .. }))
    }

    fn block_dependents(&self, failed: NodeIndex, states: &mut [StageState]) {
        let by = self.graph[failed].name;
        let mut stack: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(failed, Direction::Outgoing)
            .collect();
        while let Some(node) = stack.pop() {
            if states[node.index()] != StageState::Pending {
                continue;
            }
            tracing::warn!(stage = self.graph[node].name, blocked_by = by, "stage blocked");
            states[node.index()] = StageState::Blocked { by };
            stack.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
        }
    }

    /// Run every stage with dependency gating. Each call starts from fresh
    /// state.
    pub async fn execute(&self) -> RunReport {
        let mut states = vec![StageState::Pending; self.graph.node_count()];
        let mut elapsed: Vec<Option<Duration>> = vec![None; self.graph.node_count()];
        let mut tasks: JoinSet<(NodeIndex, Duration, Result<anyhow::Result<String>, String>)> =
            JoinSet::new();

        loop {
            for &node in &self.order {
                if !self.is_ready(node, &states) {
                    continue;
                }
                let stage = &self.graph[node];
                tracing::info!(stage = stage.name, "stage started");
                states[node.index()] = StageState::Running;
                let future = (stage.run)();
                tasks.spawn(async move {
                    let started = Instant::now();
                    let outcome = AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .map_err(|payload| panic_message(payload.as_ref()));
                    (node, started.elapsed(), outcome)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (node, took, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "stage task ended without reporting");
                    continue;
                }
            };

            let name = self.graph[node].name;
            elapsed[node.index()] = Some(took);
            match outcome {
                Ok(Ok(summary)) => {
                    tracing::info!(
                        stage = name,
                        elapsed_secs = took.as_secs_f64(),
                        summary = %summary,
                        "stage succeeded"
                    );
                    states[node.index()] = StageState::Succeeded { summary };
                }
                Ok(Err(e)) => {
                    let error = format!("{e:#}");
                    tracing::error!(stage = name, error = %error, "stage failed");
                    states[node.index()] = StageState::Failed { error };
                    self.block_dependents(node, &mut states);
                }
                Err(panic) => {
                    let error = format!("stage panicked: {panic}");
                    tracing::error!(stage = name, error = %error, "stage failed");
                    states[node.index()] = StageState::Failed { error };
                    self.block_dependents(node, &mut states);
                }
            }
        }

        // A task lost to a join error never reported; treat it as failed.
        for node in &self.order {
            if states[node.index()] == StageState::Running {
                states[node.index()] = StageState::Failed {
                    error: "stage task was lost".to_owned(),
                };
                self.block_dependents(*node, &mut states);
            }
        }

        RunReport {
            stages: self
                .order
                .iter()
                .map(|&node| StageReport {
                    name: self.graph[node].name,
                    state: states[node.index()].clone(),
                    elapsed: elapsed[node.index()],
                })
                .collect(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
