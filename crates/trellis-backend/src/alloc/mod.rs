//! Register allocation by graph coloring with coalescing, after George and
//! Appel. Every round builds the interference graph from liveness, then
//! simplifies, coalesces, freezes and picks spill candidates until the graph
//! is empty, and finally assigns colors. If some registers could not be
//! colored they are spilled to the stack and the round starts over.

mod callee;
mod color;
mod interfere;
mod liveness;
mod spill;


use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::{debug, trace};

use trellis_common::asm::{Arg, Instruction, Reg, Register};
use trellis_common::names::ResourceAllocator;

use interfere::InterferenceGraph;
use liveness::Liveness;

/// Registers available for coloring, in order of preference. Callee-saved
/// registers come last so they are only used when nothing else is left.
pub const OK_REGISTERS: [Register; 14] = [
    Register::Rax,
    Register::Rcx,
    Register::Rdx,
    Register::Rsi,
    Register::Rdi,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::Rbx,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const K: usize = OK_REGISTERS.len();

#[derive(Debug)]
pub struct Allocation {
    /// The program with nothing but machine registers.
    pub instructions: Vec<Instruction>,
    /// Stack slots below the frame pointer the program uses.
    pub slots: usize,
}

#[derive(Debug)]
pub enum AllocationOutcome {
    Colored(HashMap<Reg, Register>),
    Spilled {
        instructions: Vec<Instruction>,
        spilled: usize,
    },
}

/// Allocate registers for the tiled body of one function.
pub fn allocate(
    names: &mut ResourceAllocator,
    instructions: Vec<Instruction>,
    has_return: bool,
) -> Allocation {
    let mut allocator = Allocator::new(names, instructions, has_return);

    let colors = loop {
        match allocator.round() {
            AllocationOutcome::Colored(colors) => break colors,
            AllocationOutcome::Spilled {
                instructions,
                spilled,
            } => {
                debug!("spilled {spilled} registers, {} slots in use", allocator.slots.len());
                allocator.instructions = instructions;
            }
        }
    };

    allocator.finish(&colors)
}

fn is_precolored(reg: &Reg) -> bool {
    matches!(reg, Reg::Machine(_))
}

/// A move from one register to another, a candidate for coalescing.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct Move {
    dest: Reg,
    src: Reg,
}

struct Allocator<'a> {
    names: &'a mut ResourceAllocator,
    has_return: bool,
    instructions: Vec<Instruction>,

    /// Slots of every register spilled so far.
    slots: BTreeMap<Reg, usize>,
    /// Registers made by spilling. They live so briefly that spilling them
    /// again gains nothing.
    spill_temps: HashSet<Reg>,

    // every node is in exactly one of these
    simplify_worklist: BTreeSet<Reg>,
    freeze_worklist: BTreeSet<Reg>,
    spill_worklist: BTreeSet<Reg>,
    spilled: BTreeSet<Reg>,
    coalesced: BTreeSet<Reg>,
    colored: BTreeSet<Reg>,
    select_stack: Vec<Reg>,
    selected: HashSet<Reg>,

    // moves not coalesced, constrained or frozen yet
    worklist_moves: BTreeSet<Move>,
    active_moves: BTreeSet<Move>,

    graph: InterferenceGraph,
    move_map: HashMap<Reg, BTreeSet<Move>>,
    alias: HashMap<Reg, Reg>,
    colors: HashMap<Reg, Register>,
}

impl<'a> Allocator<'a> {
    fn new(names: &'a mut ResourceAllocator, instructions: Vec<Instruction>, has_return: bool) -> Self {
        Self {
            names,
            has_return,
            instructions: callee::save_callee_saved(instructions),
            slots: BTreeMap::new(),
            spill_temps: HashSet::new(),
            simplify_worklist: BTreeSet::new(),
            freeze_worklist: BTreeSet::new(),
            spill_worklist: BTreeSet::new(),
            spilled: BTreeSet::new(),
            coalesced: BTreeSet::new(),
            colored: BTreeSet::new(),
            select_stack: Vec::new(),
            selected: HashSet::new(),
            worklist_moves: BTreeSet::new(),
            active_moves: BTreeSet::new(),
            graph: InterferenceGraph::new(),
            move_map: HashMap::new(),
            alias: HashMap::new(),
            colors: precolored(),
        }
    }

    fn round(&mut self) -> AllocationOutcome {
        let liveness = liveness::analyze(&self.instructions, self.has_return);
        self.build(&liveness);
        self.make_worklist(&liveness);

        let uses = use_counts(&liveness);
        loop {
            if let Some(node) = self.simplify_worklist.iter().next().cloned() {
                self.simplify(node);
            } else if let Some(mv) = self.worklist_moves.iter().next().cloned() {
                self.coalesce(mv);
            } else if let Some(node) = self.freeze_worklist.iter().next().cloned() {
                self.freeze(node);
            } else if !self.spill_worklist.is_empty() {
                self.select_spill(&uses);
            } else {
                break;
            }
        }

        self.assign_colors();

        if self.spilled.is_empty() {
            trace!("colored {} registers", self.colored.len());
            return AllocationOutcome::Colored(self.colors.clone());
        }

        self.rewrite_program()
    }

    fn build(&mut self, liveness: &Liveness) {
        for (index, instruction) in self.instructions.iter().enumerate().rev() {
            let mut live = liveness.out[index].clone();
            let uses_and_defs = &liveness.uses_and_defs[index];

            if let Instruction::MoveToRegister {
                dest,
                src: Arg::Reg(src),
            } = instruction
            {
                for used in uses_and_defs.uses.iter() {
                    live.remove(used);
                }

                let mv = Move {
                    dest: dest.clone(),
                    src: src.clone(),
                };
                self.move_map.entry(dest.clone()).or_default().insert(mv.clone());
                self.move_map.entry(src.clone()).or_default().insert(mv.clone());
                self.worklist_moves.insert(mv);
            }

            live.extend(uses_and_defs.defs.iter().cloned());
            for defined in uses_and_defs.defs.iter() {
                for alive in live.iter() {
                    self.graph.add_edge(alive, defined);
                }
            }
        }
    }

    fn make_worklist(&mut self, liveness: &Liveness) {
        let initial: BTreeSet<Reg> = liveness
            .uses_and_defs
            .iter()
            .flat_map(|uses_and_defs| uses_and_defs.uses.iter().chain(uses_and_defs.defs.iter()))
            .filter(|reg| !is_precolored(reg))
            .cloned()
            .collect();

        for node in initial {
            if self.graph.degree(&node) >= K {
                self.spill_worklist.insert(node);
            } else if self.move_related(&node) {
                self.freeze_worklist.insert(node);
            } else {
                self.simplify_worklist.insert(node);
            }
        }
    }

    /// Neighbors still in the graph.
    fn adjacent(&self, node: &Reg) -> BTreeSet<Reg> {
        self.graph
            .adjacent(node)
            .into_iter()
            .filter(|other| !self.selected.contains(other) && !self.coalesced.contains(other))
            .collect()
    }

    fn node_moves(&self, node: &Reg) -> BTreeSet<Move> {
        self.move_map
            .get(node)
            .map(|moves| {
                moves
                    .iter()
                    .filter(|mv| self.active_moves.contains(mv) || self.worklist_moves.contains(mv))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn move_related(&self, node: &Reg) -> bool {
        self.move_map
            .get(node)
            .map(|moves| {
                moves
                    .iter()
                    .any(|mv| self.active_moves.contains(mv) || self.worklist_moves.contains(mv))
            })
            .unwrap_or(false)
    }

    fn simplify(&mut self, node: Reg) {
        self.simplify_worklist.remove(&node);

        for other in self.adjacent(&node) {
            self.decrement_degree(&other);
        }

        self.selected.insert(node.clone());
        self.select_stack.push(node);
    }

    fn decrement_degree(&mut self, node: &Reg) {
        if self.graph.decrement_degree(node) != K {
            return;
        }

        let mut enabled = self.adjacent(node);
        enabled.insert(node.clone());
        self.enable_moves(enabled);

        self.spill_worklist.remove(node);
        if self.move_related(node) {
            self.freeze_worklist.insert(node.clone());
        } else {
            self.simplify_worklist.insert(node.clone());
        }
    }

    fn enable_moves(&mut self, nodes: impl IntoIterator<Item = Reg>) {
        for node in nodes {
            for mv in self.node_moves(&node) {
                if self.active_moves.remove(&mv) {
                    self.worklist_moves.insert(mv);
                }
            }
        }
    }

    fn add_to_worklist(&mut self, node: &Reg) {
        if !is_precolored(node) && !self.move_related(node) && self.graph.degree(node) < K {
            self.freeze_worklist.remove(node);
            self.simplify_worklist.insert(node.clone());
        }
    }

    /// Can `node` be merged into the machine register `reg` without making
    /// the graph harder to color?
    fn ok(&self, node: &Reg, reg: &Reg) -> bool {
        self.graph.degree(node) < K || is_precolored(node) || self.graph.contains(node, reg)
    }

    fn conservative(&self, nodes: &BTreeSet<Reg>) -> bool {
        nodes
            .iter()
            .filter(|node| self.graph.degree(node) >= K)
            .count()
            < K
    }

    fn alias(&self, node: &Reg) -> Reg {
        let mut node = node;
        while self.coalesced.contains(node) {
            match self.alias.get(node) {
                Some(alias) => node = alias,
                None => break,
            }
        }
        node.clone()
    }

    fn coalesce(&mut self, mv: Move) {
        self.worklist_moves.remove(&mv);

        let x = self.alias(&mv.dest);
        let y = self.alias(&mv.src);
        let (u, v) = if is_precolored(&y) { (y, x) } else { (x, y) };

        if u == v {
            self.add_to_worklist(&u);
        } else if is_precolored(&v) || self.graph.contains(&u, &v) {
            self.add_to_worklist(&u);
            self.add_to_worklist(&v);
        } else {
            let mergeable = if is_precolored(&u) {
                self.adjacent(&v).iter().all(|node| self.ok(node, &u))
            } else {
                let mut nodes = self.adjacent(&u);
                nodes.extend(self.adjacent(&v));
                self.conservative(&nodes)
            };

            if mergeable {
                self.combine(&u, &v);
                self.add_to_worklist(&u);
            } else {
                self.active_moves.insert(mv);
            }
        }
    }

    fn combine(&mut self, u: &Reg, v: &Reg) {
        if !self.freeze_worklist.remove(v) {
            self.spill_worklist.remove(v);
        }

        self.coalesced.insert(v.clone());
        self.alias.insert(v.clone(), u.clone());

        let moves = self.move_map.get(v).cloned().unwrap_or_default();
        self.move_map.entry(u.clone()).or_default().extend(moves);
        self.enable_moves([v.clone()]);

        for node in self.adjacent(v) {
            self.graph.add_edge(&node, u);
            self.decrement_degree(&node);
        }

        if self.graph.degree(u) >= K && self.freeze_worklist.remove(u) {
            self.spill_worklist.insert(u.clone());
        }
    }

    fn freeze(&mut self, node: Reg) {
        self.freeze_worklist.remove(&node);
        self.simplify_worklist.insert(node.clone());
        self.freeze_moves(&node);
    }

    fn freeze_moves(&mut self, node: &Reg) {
        let node_alias = self.alias(node);

        for mv in self.node_moves(node) {
            let src_alias = self.alias(&mv.src);
            let other = if src_alias == node_alias {
                self.alias(&mv.dest)
            } else {
                src_alias
            };

            self.active_moves.remove(&mv);

            if self.freeze_worklist.contains(&other) && self.node_moves(&other).is_empty() {
                self.freeze_worklist.remove(&other);
                self.simplify_worklist.insert(other);
            }
        }
    }

    /// Pick the node with the fewest uses per interference as a potential
    /// spill.
    fn select_spill(&mut self, uses: &HashMap<Reg, usize>) {
        let score = |node: &Reg| {
            let degree = self.graph.degree(node);
            if degree == 0 || self.spill_temps.contains(node) {
                f64::MAX
            } else {
                uses.get(node).copied().unwrap_or(0) as f64 / degree as f64
            }
        };

        let mut best: Option<(Reg, f64)> = None;
        for node in self.spill_worklist.iter() {
            let score = score(node);
            match &best {
                Some((_, lowest)) if *lowest <= score => {}
                _ => best = Some((node.clone(), score)),
            }
        }

        let Some((node, _)) = best else {
            return;
        };

        self.spill_worklist.remove(&node);
        self.simplify_worklist.insert(node.clone());
        self.freeze_moves(&node);
    }

    fn assign_colors(&mut self) {
        while let Some(node) = self.select_stack.pop() {
            self.selected.remove(&node);

            let mut available: Vec<Register> = OK_REGISTERS.to_vec();
            for other in self.graph.adjacent(&node) {
                let other = self.alias(&other);
                if self.colored.contains(&other) || is_precolored(&other) {
                    if let Some(color) = self.colors.get(&other) {
                        available.retain(|register| register != color);
                    }
                }
            }

            match available.first() {
                Some(color) => {
                    self.colors.insert(node.clone(), *color);
                    self.colored.insert(node);
                }
                None => {
                    self.spilled.insert(node);
                }
            }
        }

        for node in self.coalesced.iter() {
            let alias = self.alias(node);
            if let Some(color) = self.colors.get(&alias).copied() {
                self.colors.insert(node.clone(), color);
            }
        }
    }

    fn rewrite_program(&mut self) -> AllocationOutcome {
        let spilled = std::mem::take(&mut self.spilled);
        let rewritten = spill::spill(self.names, &self.instructions, &spilled, self.slots.len());

        self.slots.extend(rewritten.slots);
        self.spill_temps.extend(rewritten.temps);

        self.graph.clear();
        self.colored.clear();
        self.coalesced.clear();
        self.colors = precolored();
        self.worklist_moves.clear();
        self.active_moves.clear();
        self.move_map.clear();
        self.alias.clear();

        AllocationOutcome::Spilled {
            instructions: rewritten.instructions,
            spilled: spilled.len(),
        }
    }

    fn finish(self, colors: &HashMap<Reg, Register>) -> Allocation {
        let unused = unused_callee_saved(colors);
        let (moves, slots) = callee::reorganize_slots(&self.slots, &unused);
        let instructions = color::color(&self.instructions, colors, &moves, &unused);

        trace!("{} callee-saved registers are unused", unused.len());
        Allocation {
            instructions,
            slots,
        }
    }
}

/// Callee-saved registers that hold nothing but their own saved value. A
/// register counts as used when the program proper is colored with it, or when
/// it stores the saved value of a used register.
fn unused_callee_saved(colors: &HashMap<Reg, Register>) -> BTreeSet<Register> {
    let storage: HashSet<Reg> = Register::CALLEE_SAVED.into_iter().map(callee::storage).collect();

    let mut used: BTreeSet<Register> = colors
        .iter()
        .filter(|(reg, _)| !is_precolored(reg) && !storage.contains(*reg))
        .map(|(_, color)| *color)
        .collect();

    let mut worklist: Vec<Register> = used.iter().copied().collect();
    while let Some(register) = worklist.pop() {
        if !Register::CALLEE_SAVED.contains(&register) {
            continue;
        }

        if let Some(color) = colors.get(&callee::storage(register)) {
            if used.insert(*color) {
                worklist.push(*color);
            }
        }
    }

    Register::CALLEE_SAVED
        .into_iter()
        .filter(|register| !used.contains(register))
        .collect()
}

fn precolored() -> HashMap<Reg, Register> {
    Register::ALL
        .into_iter()
        .map(|register| (Reg::Machine(register), register))
        .collect()
}

fn use_counts(liveness: &Liveness) -> HashMap<Reg, usize> {
    let mut counts = HashMap::new();
    for uses_and_defs in liveness.uses_and_defs.iter() {
        for reg in uses_and_defs.uses.iter().chain(uses_and_defs.defs.iter()) {
            *counts.entry(reg.clone()).or_default() += 1;
        }
    }
    counts
}
