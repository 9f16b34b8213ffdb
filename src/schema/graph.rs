//! Schema dependency graph and generation staging.
//!
//! Provides:
//! - Dependency graph construction from schema FK relationships
//! - Staged topological sorting (Kahn) for generation order
//! - Strongly connected component detection to name cross-table cycles

use super::{Schema, TableId};
use crate::error::SeedError;
use std::collections::VecDeque;

/// Schema dependency graph built from foreign key relationships.
///
/// Edges run parent → child: a parent is referenced by another table's FK,
/// a child holds the FK. Self-references are tracked separately and never
/// become edges, so they do not block ordering.
#[derive(Debug)]
pub struct SchemaGraph<'a> {
    /// The underlying schema
    pub schema: &'a Schema,
    /// For each table, list of parent tables (tables this table references via FK)
    pub parents: Vec<Vec<TableId>>,
    /// For each table, list of child tables (tables that reference this table via FK)
    pub children: Vec<Vec<TableId>>,
    /// Tables taking part in this run
    included: Vec<bool>,
}

/// Result of topological sort
#[derive(Debug)]
pub struct TopoSortResult {
    /// Tables in topological order (parents before children)
    pub order: Vec<TableId>,
    /// Tables that are part of, or downstream of, cycles
    pub cyclic_tables: Vec<TableId>,
}

/// Ordered generation stages.
///
/// Tables within one stage have no FK edges between them; every FK target of
/// a table lives in an earlier stage (or outside the run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPlan {
    pub stages: Vec<Vec<TableId>>,
    /// Tables that need the follow-up self-reference update pass
    pub self_referential: Vec<TableId>,
}

impl GenerationPlan {
    /// All tables in insertion order
    pub fn insertion_order(&self) -> Vec<TableId> {
        self.stages.iter().flatten().copied().collect()
    }

    pub fn stage_of(&self, id: TableId) -> Option<usize> {
        self.stages.iter().position(|s| s.contains(&id))
    }

    pub fn table_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Every planned table's parents are either outside the plan or in a
    /// strictly earlier stage.
    pub fn is_consistent_with(&self, schema: &Schema) -> bool {
        for (stage_idx, stage) in self.stages.iter().enumerate() {
            for &id in stage {
                let Some(table) = schema.table(id) else {
                    return false;
                };
                for fk in &table.foreign_keys {
                    let Some(parent) = fk.referenced_table_id else {
                        return false;
                    };
                    if parent == id {
                        continue;
                    }
                    if let Some(parent_stage) = self.stage_of(parent) {
                        if parent_stage >= stage_idx {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}

impl<'a> SchemaGraph<'a> {
    /// Build a dependency graph over every table of a schema
    pub fn from_schema(schema: &'a Schema) -> Self {
        Self::with_tables(schema, |_| true)
    }

    /// Build a dependency graph restricted to the tables accepted by `include`.
    /// Edges to excluded tables are dropped.
    pub fn with_tables(schema: &'a Schema, include: impl Fn(TableId) -> bool) -> Self {
        let n = schema.table_schemas.len();
        let included: Vec<bool> = (0..n).map(|i| include(TableId(i as u32))).collect();
        let mut parents: Vec<Vec<TableId>> = vec![Vec::new(); n];
        let mut children: Vec<Vec<TableId>> = vec![Vec::new(); n];

        for table in &schema.table_schemas {
            let child_id = table.id;
            if !included[child_id.0 as usize] {
                continue;
            }

            for fk in &table.foreign_keys {
                if let Some(parent_id) = fk.referenced_table_id {
                    // Self-references are handled by the update pass
                    if parent_id != child_id && included[parent_id.0 as usize] {
                        if !parents[child_id.0 as usize].contains(&parent_id) {
                            parents[child_id.0 as usize].push(parent_id);
                        }
                        if !children[parent_id.0 as usize].contains(&child_id) {
                            children[parent_id.0 as usize].push(child_id);
                        }
                    }
                }
            }
        }

        Self {
            schema,
            parents,
            children,
            included,
        }
    }

    /// Get the number of tables in the graph
    pub fn len(&self) -> usize {
        self.schema.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    pub fn is_included(&self, id: TableId) -> bool {
        self.included.get(id.0 as usize).copied().unwrap_or(false)
    }

    fn included_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        (0..self.len())
            .map(|i| TableId(i as u32))
            .filter(|&id| self.is_included(id))
    }

    /// Check if a table has a self-referential FK
    pub fn has_self_reference(&self, id: TableId) -> bool {
        self.schema
            .table(id)
            .map(|t| t.has_self_reference())
            .unwrap_or(false)
    }

    /// Get included tables that have self-referential FKs
    pub fn self_referential_tables(&self) -> Vec<TableId> {
        self.included_ids()
            .filter(|&id| self.has_self_reference(id))
            .collect()
    }

    /// Perform topological sort using Kahn's algorithm.
    ///
    /// Returns tables in dependency order (parents before children).
    /// Tables that are part of cycles are returned separately.
    pub fn topo_sort(&self) -> TopoSortResult {
        let stages = self.kahn_stages();
        let order: Vec<TableId> = stages.0.into_iter().flatten().collect();
        TopoSortResult {
            order,
            cyclic_tables: stages.1,
        }
    }

    /// Group tables into stages: each step takes every table whose parents
    /// are all placed, then removes their outgoing edges.
    fn kahn_stages(&self) -> (Vec<Vec<TableId>>, Vec<TableId>) {
        let n = self.len();
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();

        let mut current: Vec<TableId> = self
            .included_ids()
            .filter(|id| in_degree[id.0 as usize] == 0)
            .collect();
        let mut stages = Vec::new();
        let mut placed = 0usize;

        while !current.is_empty() {
            current.sort();
            let mut next = Vec::new();
            for &table_id in &current {
                for &child_id in &self.children[table_id.0 as usize] {
                    in_degree[child_id.0 as usize] -= 1;
                    if in_degree[child_id.0 as usize] == 0 {
                        next.push(child_id);
                    }
                }
            }
            placed += current.len();
            stages.push(std::mem::take(&mut current));
            current = next;
        }

        let cyclic_tables: Vec<TableId> = if placed == self.included_ids().count() {
            Vec::new()
        } else {
            (0..n)
                .map(|i| TableId(i as u32))
                .filter(|&id| self.is_included(id) && in_degree[id.0 as usize] > 0)
                .collect()
        };

        (stages, cyclic_tables)
    }

    /// Build the staged generation plan.
    ///
    /// Fails with [`SeedError::CyclicDependency`] naming the tables of every
    /// cycle spanning two or more distinct tables.
    pub fn generation_plan(&self) -> Result<GenerationPlan, SeedError> {
        let (stages, cyclic) = self.kahn_stages();
        if !cyclic.is_empty() {
            let mut tables: Vec<String> = self
                .cycle_components()
                .into_iter()
                .flatten()
                .map(|id| self.schema.table_name(id).to_string())
                .collect();
            tables.sort();
            return Err(SeedError::CyclicDependency { tables });
        }

        Ok(GenerationPlan {
            stages,
            self_referential: self.self_referential_tables(),
        })
    }

    /// Strongly connected components with more than one table (Tarjan).
    pub fn cycle_components(&self) -> Vec<Vec<TableId>> {
        let mut finder = Tarjan::new(self);
        for id in self.included_ids() {
            if finder.indices[id.0 as usize].is_none() {
                finder.strongconnect(id);
            }
        }
        finder.sccs.into_iter().filter(|scc| scc.len() > 1).collect()
    }

    /// Get all ancestor tables of a given table (tables it depends on, directly or transitively)
    pub fn ancestors(&self, id: TableId) -> Vec<TableId> {
        self.walk(id, &self.parents)
    }

    /// Get all descendant tables of a given table (tables that depend on it)
    pub fn descendants(&self, id: TableId) -> Vec<TableId> {
        self.walk(id, &self.children)
    }

    fn walk(&self, id: TableId, edges: &[Vec<TableId>]) -> Vec<TableId> {
        let mut found = Vec::new();
        let mut visited = vec![false; self.len()];
        let mut queue = VecDeque::new();

        for &next in &edges[id.0 as usize] {
            queue.push_back(next);
            visited[next.0 as usize] = true;
        }

        while let Some(current) = queue.pop_front() {
            found.push(current);
            for &next in &edges[current.0 as usize] {
                if !visited[next.0 as usize] {
                    visited[next.0 as usize] = true;
                    queue.push_back(next);
                }
            }
        }

        found
    }

    /// Get included root tables (tables with no parents in the run)
    pub fn root_tables(&self) -> Vec<TableId> {
        self.included_ids()
            .filter(|id| self.parents[id.0 as usize].is_empty())
            .collect()
    }
}

/// Tarjan's strongly connected components over table IDs
struct Tarjan<'g, 'a> {
    graph: &'g SchemaGraph<'a>,
    index_counter: usize,
    stack: Vec<TableId>,
    on_stack: Vec<bool>,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    sccs: Vec<Vec<TableId>>,
}

impl<'g, 'a> Tarjan<'g, 'a> {
    fn new(graph: &'g SchemaGraph<'a>) -> Self {
        let n = graph.len();
        Self {
            graph,
            index_counter: 0,
            stack: Vec::new(),
            on_stack: vec![false; n],
            indices: vec![None; n],
            lowlinks: vec![0; n],
            sccs: Vec::new(),
        }
    }

    fn strongconnect(&mut self, v: TableId) {
        let vi = v.0 as usize;
        self.indices[vi] = Some(self.index_counter);
        self.lowlinks[vi] = self.index_counter;
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack[vi] = true;

        let graph = self.graph;
        for &w in &graph.parents[vi] {
            let wi = w.0 as usize;
            match self.indices[wi] {
                None => {
                    self.strongconnect(w);
                    self.lowlinks[vi] = self.lowlinks[vi].min(self.lowlinks[wi]);
                }
                Some(w_index) if self.on_stack[wi] => {
                    self.lowlinks[vi] = self.lowlinks[vi].min(w_index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlinks[vi]) == self.indices[vi] {
            let mut scc = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w.0 as usize] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            scc.sort();
            self.sccs.push(scc);
        }
    }
}
