//! Row-level dependency graph between modification commands.
//!
//! An edge `a -> b` means command `a` must run before command `b`:
//!
//! - a principal row is inserted before the rows whose foreign keys reference it
//! - a dependent row is deleted (or re-pointed) before the principal it referenced
//! - a row holding a unique value is deleted (or changed) before another row
//!   claims that value

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::schema::{ForeignKey, QualifiedName, SchemaSnapshot, Table};
use crate::update::command::ModificationCommand;
use crate::update::error::UpdateError;
use crate::value::Value;

type RowKey = (QualifiedName, Vec<String>, Vec<Value>);

#[derive(Debug, Clone)]
pub struct CommandGraph {
    successors: Vec<BTreeSet<usize>>,
    predecessors: Vec<BTreeSet<usize>>,
}

impl CommandGraph {
    /// Build the graph for `commands` using the keys and foreign keys in `model`.
    pub fn build(commands: &[ModificationCommand], model: &SchemaSnapshot) -> Self {
        let mut graph = Self {
            successors: vec![BTreeSet::new(); commands.len()],
            predecessors: vec![BTreeSet::new(); commands.len()],
        };

        for dependent in &model.tables {
            for fk in &dependent.foreign_keys {
                graph.add_foreign_key_edges(commands, dependent, fk);
            }
        }
        for table in &model.tables {
            for columns in table.unique_column_sets() {
                graph.add_unique_edges(commands, table, columns);
            }
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn predecessors(&self, node: usize) -> &BTreeSet<usize> {
        &self.predecessors[node]
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.successors[from].contains(&to)
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(BTreeSet::len).sum()
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if from != to {
            self.successors[from].insert(to);
            self.predecessors[to].insert(from);
        }
    }

    fn add_foreign_key_edges(&mut self, commands: &[ModificationCommand], dependent: &Table, fk: &ForeignKey) {
        let dependent_name = dependent.qualified_name();
        let mut inserted: HashMap<RowKey, Vec<usize>> = HashMap::new();
        let mut deleted: HashMap<RowKey, Vec<usize>> = HashMap::new();

        for (i, command) in commands.iter().enumerate() {
            if *command.table() != fk.principal {
                continue;
            }
            let state = command.state();
            let original = state.is_delete();
            if state.is_update() {
                continue;
            }
            if let Some(values) = command.values_of(&fk.principal_columns, original) {
                let key = (fk.principal.clone(), fk.principal_columns.clone(), values);
                let target = if original { &mut deleted } else { &mut inserted };
                target.entry(key).or_default().push(i);
            }
        }

        for (i, command) in commands.iter().enumerate() {
            if *command.table() != dependent_name {
                continue;
            }
            let state = command.state();
            let rewrites_fk = state.is_update() && writes_any(command, &fk.columns);

            if state.is_insert() || rewrites_fk {
                if let Some(values) = command.values_of(&fk.columns, false) {
                    let key = (fk.principal.clone(), fk.principal_columns.clone(), values);
                    for &principal in inserted.get(&key).into_iter().flatten() {
                        self.add_edge(principal, i);
                    }
                }
            }
            if state.is_delete() || rewrites_fk {
                if let Some(values) = command.values_of(&fk.columns, true) {
                    let key = (fk.principal.clone(), fk.principal_columns.clone(), values);
                    for &principal in deleted.get(&key).into_iter().flatten() {
                        self.add_edge(i, principal);
                    }
                }
            }
        }
    }

    fn add_unique_edges(&mut self, commands: &[ModificationCommand], table: &Table, columns: &[String]) {
        let name = table.qualified_name();
        let mut released: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();

        for (i, command) in commands.iter().enumerate() {
            if *command.table() != name {
                continue;
            }
            let state = command.state();
            if state.is_delete() || (state.is_update() && writes_any(command, columns)) {
                if let Some(values) = command.values_of(columns, true) {
                    released.entry(values).or_default().push(i);
                }
            }
        }
        if released.is_empty() {
            return;
        }

        for (i, command) in commands.iter().enumerate() {
            if *command.table() != name {
                continue;
            }
            let state = command.state();
            if state.is_insert() || (state.is_update() && writes_any(command, columns)) {
                if let Some(values) = command.values_of(columns, false) {
                    for &previous in released.get(&values).into_iter().flatten() {
                        self.add_edge(previous, i);
                    }
                }
            }
        }
    }

    /// Kahn's algorithm with ties broken by presentation order.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::CyclicDependency`] naming the commands of one
    /// cycle when the graph is not acyclic.
    pub fn topological_order(&self, commands: &[ModificationCommand]) -> Result<Vec<usize>, UpdateError> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &next in &self.successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() == self.len() {
            return Ok(order);
        }

        let remaining: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(i, _)| i)
            .collect();
        let cycle = self.find_cycle(&remaining);
        Err(UpdateError::CyclicDependency {
            cycle: cycle.iter().map(|&i| commands[i].to_string()).collect(),
        })
    }

    /// Walk predecessors inside `remaining` until a node repeats. Every
    /// remaining node has a remaining predecessor, so the walk always closes.
    fn find_cycle(&self, remaining: &BTreeSet<usize>) -> Vec<usize> {
        let Some(&start) = remaining.iter().next() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;
        loop {
            let Some(&previous) = self.predecessors[current]
                .iter()
                .find(|p| remaining.contains(*p))
            else {
                return path;
            };
            if let Some(&at) = position.get(&previous) {
                let mut cycle: Vec<usize> = path[at..].to_vec();
                cycle.reverse();
                cycle.push(cycle[0]);
                return cycle;
            }
            position.insert(previous, path.len());
            path.push(previous);
            current = previous;
        }
    }
}

fn writes_any(command: &ModificationCommand, columns: &[String]) -> bool {
    command
        .value_modifications()
        .any(|m| columns.iter().any(|c| c == m.column_name()))
}
