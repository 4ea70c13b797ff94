use std::collections::{BTreeSet, HashMap};

use trellis_common::asm::Reg;

/// An undirected graph of registers that may not share a color. Machine
/// registers are colored from the start, so their degree is never counted.
#[derive(Debug, Default)]
pub struct InterferenceGraph {
    adjacent: HashMap<Reg, BTreeSet<Reg>>,
    degrees: HashMap<Reg, usize>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, u: &Reg, v: &Reg) {
        if u == v || self.contains(u, v) {
            return;
        }

        self.adjacent.entry(u.clone()).or_default().insert(v.clone());
        self.adjacent.entry(v.clone()).or_default().insert(u.clone());

        for node in [u, v] {
            if node.as_temp().is_some() {
                *self.degrees.entry(node.clone()).or_default() += 1;
            }
        }
    }

    pub fn contains(&self, u: &Reg, v: &Reg) -> bool {
        self.adjacent
            .get(u)
            .map(|adjacent| adjacent.contains(v))
            .unwrap_or(false)
    }

    pub fn degree(&self, node: &Reg) -> usize {
        self.degrees.get(node).copied().unwrap_or(0)
    }

    /// Lower the degree of a node by one, returning the degree it had before.
    pub fn decrement_degree(&mut self, node: &Reg) -> usize {
        match self.degrees.get_mut(node) {
            Some(degree) if *degree > 0 => {
                *degree -= 1;
                *degree + 1
            }
            _ => 0,
        }
    }

    pub fn adjacent(&self, node: &Reg) -> Vec<Reg> {
        self.adjacent
            .get(node)
            .map(|adjacent| adjacent.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.adjacent.clear();
        self.degrees.clear();
    }
}

#[cfg(test)]
mod tests {
    use trellis_common::asm::{Reg, Register};

    use super::InterferenceGraph;

    #[test]
    fn degrees() {
        let a = Reg::temp("a");
        let b = Reg::temp("b");
        let c = Reg::temp("c");
        let rax = Reg::Machine(Register::Rax);

        let mut graph = InterferenceGraph::new();
        graph.add_edge(&a, &b);
        graph.add_edge(&a, &c);
        assert_eq!(2, graph.degree(&a));
        assert_eq!(1, graph.degree(&b));

        graph.add_edge(&a, &rax);
        assert_eq!(3, graph.degree(&a));
        assert_eq!(0, graph.degree(&rax));

        graph.add_edge(&a, &a);
        graph.add_edge(&b, &a);
        assert_eq!(3, graph.degree(&a));
        assert_eq!(1, graph.degree(&b));
        assert!(graph.contains(&rax, &a));
        assert!(!graph.contains(&b, &c));

        graph.clear();
        assert_eq!(0, graph.degree(&a));
        assert_eq!(0, graph.degree(&b));
        assert!(graph.adjacent(&a).is_empty());
    }

    #[test]
    fn decrement() {
        let a = Reg::temp("a");
        let b = Reg::temp("b");

        let mut graph = InterferenceGraph::new();
        graph.add_edge(&a, &b);

        assert_eq!(1, graph.decrement_degree(&a));
        assert_eq!(0, graph.degree(&a));
        assert_eq!(0, graph.decrement_degree(&a));
        assert_eq!(vec![b.clone()], graph.adjacent(&a));
    }
}
