use std::collections::HashMap;

use serde::Serialize;

use crate::error::WorkflowError;
use crate::node::{StepInput, StepNode};

/// A maximal run of steps linked by predecessor edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chain {
  /// Index of the job-rooted first step.
  pub root: usize,
  /// Step indices in execution order, starting with `root`.
  pub steps: Vec<usize>,
}

/// An executable workflow: nodes in declaration order plus their chains.
#[derive(Debug, Clone, Serialize)]
pub struct StepGraph {
  pub name: String,
  pub description: String,
  pub parallel: bool,
  nodes: Vec<StepNode>,
  /// Chains ordered by the declaration position of their root.
  chains: Vec<Chain>,
  #[serde(skip)]
  successors: Vec<Option<usize>>,
  #[serde(skip)]
  by_name: HashMap<String, usize>,
}

impl StepGraph {
  /// Assemble a graph, checking that the nodes form disjoint chains.
  pub fn new(
    name: impl Into<String>,
    description: impl Into<String>,
    parallel: bool,
    nodes: Vec<StepNode>,
  ) -> Result<Self, WorkflowError> {
    let mut successors: Vec<Option<usize>> = vec![None; nodes.len()];

    for (position, node) in nodes.iter().enumerate() {
      if node.index != position {
        return Err(WorkflowError::IndexMismatch {
          step: node.name.clone(),
          index: node.index,
          position,
        });
      }

      if let StepInput::Predecessor(pred) = node.input {
        if pred >= position {
          return Err(WorkflowError::InvalidPredecessor {
            step: node.name.clone(),
            predecessor: pred,
          });
        }
        if let Some(existing) = successors[pred] {
          return Err(WorkflowError::SharedPredecessor {
            predecessor: nodes[pred].name.clone(),
            first: nodes[existing].name.clone(),
            second: node.name.clone(),
          });
        }
        successors[pred] = Some(position);
      }
    }

    let chains = nodes
      .iter()
      .filter(|node| node.is_root())
      .map(|root| {
        let mut steps = vec![root.index];
        let mut cursor = root.index;
        while let Some(next) = successors[cursor] {
          steps.push(next);
          cursor = next;
        }
        Chain {
          root: root.index,
          steps,
        }
      })
      .collect();

    let by_name = nodes
      .iter()
      .map(|node| (node.name.clone(), node.index))
      .collect();

    Ok(Self {
      name: name.into(),
      description: description.into(),
      parallel,
      nodes,
      chains,
      successors,
      by_name,
    })
  }

  pub fn nodes(&self) -> &[StepNode] {
    &self.nodes
  }

  pub fn node(&self, index: usize) -> Option<&StepNode> {
    self.nodes.get(index)
  }

  /// Get a node by step name.
  pub fn get_node(&self, name: &str) -> Option<&StepNode> {
    self.by_name.get(name).and_then(|&i| self.nodes.get(i))
  }

  pub fn chains(&self) -> &[Chain] {
    &self.chains
  }

  /// The step consuming this step's output, if any.
  pub fn downstream(&self, index: usize) -> Option<usize> {
    self.successors.get(index).copied().flatten()
  }

  /// The step whose output this step consumes, if any.
  pub fn upstream(&self, index: usize) -> Option<usize> {
    match self.nodes.get(index)?.input {
      StepInput::Predecessor(pred) => Some(pred),
      StepInput::Job(_) => None,
    }
  }

  /// Job ids read by root steps, in chain order. May repeat.
  pub fn root_jobs(&self) -> impl Iterator<Item = &str> {
    self
      .chains
      .iter()
      .filter_map(|chain| match &self.nodes[chain.root].input {
        StepInput::Job(id) => Some(id.as_str()),
        StepInput::Predecessor(_) => None,
      })
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
