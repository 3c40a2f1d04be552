//! Table-level ordering by foreign key dependencies.
//!
//! Tables are sorted principals first with Kahn's algorithm, ties broken by
//! input order. Foreign key cycles do not fail the sort: the lowest-indexed
//! table still waiting is released and the foreign keys that pointed at
//! unfinished principals are reported as deferred, so callers can create them
//! after (or drop them before) the tables themselves.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::schema::{QualifiedName, Table};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TableOrdering {
    /// Indices into the input slice, principals first.
    pub order: Vec<usize>,
    /// `(table index, foreign key name)` pairs that had to be deferred to
    /// break a cycle.
    pub deferred: BTreeSet<(usize, String)>,
}

impl TableOrdering {
    pub fn is_deferred(&self, table: usize, foreign_key: &str) -> bool {
        self.deferred.contains(&(table, foreign_key.to_string()))
    }
}

/// Order `tables` so that every principal precedes its dependents.
/// Self-references and references to tables outside the slice are ignored.
pub(crate) fn principals_first(tables: &[&Table]) -> TableOrdering {
    let index: HashMap<QualifiedName, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.qualified_name(), i))
        .collect();

    // (principal, fk name) edges into each dependent
    let mut incoming: Vec<Vec<(usize, String)>> = vec![Vec::new(); tables.len()];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); tables.len()];
    for (i, table) in tables.iter().enumerate() {
        for fk in &table.foreign_keys {
            if let Some(&principal) = index.get(&fk.principal) {
                if principal != i {
                    incoming[i].push((principal, fk.name.clone()));
                    dependents[principal].insert(i);
                }
            }
        }
    }

    let mut done = vec![false; tables.len()];
    let mut ordering = TableOrdering::default();
    let mut ready: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
    let waiting_on = |i: usize, done: &[bool]| incoming[i].iter().filter(|(p, _)| !done[*p]).count();

    for i in 0..tables.len() {
        if waiting_on(i, &done) == 0 {
            ready.push(Reverse(i));
        }
    }

    while ordering.order.len() < tables.len() {
        let next = match ready.pop() {
            Some(Reverse(i)) if done[i] => continue,
            Some(Reverse(i)) => i,
            None => {
                // Cycle: release the first waiting table and defer its
                // references to unfinished principals.
                let Some(stuck) = (0..tables.len()).find(|i| !done[*i]) else {
                    break;
                };
                for (principal, name) in &incoming[stuck] {
                    if !done[*principal] {
                        ordering.deferred.insert((stuck, name.clone()));
                    }
                }
                stuck
            }
        };

        done[next] = true;
        ordering.order.push(next);
        for &dependent in &dependents[next] {
            if !done[dependent] && waiting_on(dependent, &done) == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }
    ordering
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ForeignKey};

    fn table(name: &str, references: &[&str]) -> Table {
        let mut table = Table::new(name).column(Column::new("Id", "int"));
        for principal in references {
            table = table.foreign_key(ForeignKey::new(
                format!("FK_{name}_{principal}"),
                ["Id"],
                *principal,
                ["Id"],
            ));
        }
        table
    }

    #[test]
    fn test_chain_is_ordered_principals_first() {
        let tables = [
            table("bank_transactions", &["bank_accounts"]),
            table("bank_accounts", &["banks"]),
            table("banks", &[]),
        ];
        let refs: Vec<&Table> = tables.iter().collect();
        let ordering = principals_first(&refs);
        assert_eq!(ordering.order, vec![2, 1, 0]);
        assert!(ordering.deferred.is_empty());
    }

    #[test]
    fn test_independent_tables_keep_input_order() {
        let tables = [table("b", &[]), table("a", &[]), table("c", &["c"])];
        let refs: Vec<&Table> = tables.iter().collect();
        assert_eq!(principals_first(&refs).order, vec![0, 1, 2]);
    }

    #[test]
    fn test_cycle_defers_one_foreign_key() {
        let tables = [table("a", &["b"]), table("b", &["a"]), table("c", &["a"])];
        let refs: Vec<&Table> = tables.iter().collect();
        let ordering = principals_first(&refs);
        assert_eq!(ordering.order, vec![0, 1, 2]);
        assert!(ordering.is_deferred(0, "FK_a_b"));
        assert!(!ordering.is_deferred(1, "FK_b_a"));
        assert_eq!(ordering.deferred.len(), 1);
    }
}
