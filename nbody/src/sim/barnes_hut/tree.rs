use anyhow::{bail, ensure};

use crate::{
    constants::MAX_CHILDREN,
    coords::{Coords, MassPoint},
    sim::{Body, ForceSample, barnes_hut::region::Region},
};

/// Index of a body in the tree's flat registry. Stable for the life of the
/// tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub(crate) usize);

impl BodyId {
    pub fn to_index(self) -> usize {
        self.0
    }
}

/// Index of a branch in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Body(BodyId),
    Branch(BranchId),
}

#[derive(Debug, Clone)]
pub struct Branch<P: Coords> {
    pub region: Region<P>,
    /// Center of gravity and total mass, as of the last recalibration.
    pub mass_point: MassPoint<P>,
    pub(crate) children: [Option<NodeId>; MAX_CHILDREN],
    pub(crate) parent: Option<BranchId>,
}

impl<P: Coords> Branch<P> {
    fn new(region: Region<P>, parent: Option<BranchId>) -> Self {
        Self {
            region,
            mass_point: MassPoint::empty(),
            children: [None; MAX_CHILDREN],
            parent,
        }
    }

    /// The `2^D` child slots.
    #[inline]
    pub fn children(&self) -> &[Option<NodeId>] {
        &self.children[..P::CHILDREN]
    }

    pub fn parent(&self) -> Option<BranchId> {
        self.parent
    }

    pub fn child_count(&self) -> usize {
        self.children().iter().flatten().count()
    }

    fn slot_of(&self, node: NodeId) -> Option<usize> {
        self.children().iter().position(|c| *c == Some(node))
    }
}

/// Where the tree's bodies went during one integration pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Bodies that left their cell and were detached and reinserted.
    pub relinks: usize,
    /// Relinks that found no enclosing ancestor and went through the root.
    pub root_reinserts: usize,
    /// Bodies left outside the tree because they coincide with another body.
    pub unattached: usize,
}

/// Outcome of looking for a body's place in the tree.
#[derive(Debug, Clone, Copy)]
enum Placement<P: Coords> {
    /// An empty slot of this branch, or the root of an empty tree.
    Free(Option<BranchId>),
    /// `node` moves under a new branch over `region`, next to the body.
    Split {
        parent: Option<BranchId>,
        node: NodeId,
        region: Region<P>,
    },
    /// No cell separates the body from `node`.
    Blocked(NodeId),
}

/// Barnes-Hut quadtree/octree over a flat body registry.
///
/// Branches live in an arena and refer to each other by index. Bodies are
/// never removed; a body that no cell can separate from one already in the
/// tree (the same position, or a few ulps off) stays unattached until it
/// moves apart.
#[derive(Debug, Clone)]
pub struct BarnesHutTree<P: Coords> {
    pub(crate) root: Option<NodeId>,
    pub(crate) branches: Vec<Branch<P>>,
    free: Vec<BranchId>,
    pub(crate) bodies: Vec<Body<P>>,
    pub(crate) samples: Vec<ForceSample<P::Vector>>,
}

impl<P: Coords> Default for BarnesHutTree<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Coords> BarnesHutTree<P> {
    pub fn new() -> Self {
        Self {
            root: None,
            branches: Vec::new(),
            free: Vec::new(),
            bodies: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn with_bodies(bodies: impl IntoIterator<Item = Body<P>>) -> Self {
        let mut tree = Self::new();
        for body in bodies {
            tree.add(body);
        }
        tree
    }

    /// Register a body and insert it into the tree.
    pub fn add(&mut self, mut body: Body<P>) -> BodyId {
        body.parent = None;
        let id = BodyId(self.bodies.len());
        self.bodies.push(body);
        self.insert(id);
        id
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// All bodies, in insertion order.
    pub fn bodies(&self) -> &[Body<P>] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> &Body<P> {
        &self.bodies[id.0]
    }

    pub fn for_each_body(&self, mut f: impl FnMut(BodyId, &Body<P>)) {
        for (i, body) in self.bodies.iter().enumerate() {
            f(BodyId(i), body);
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn branch(&self, id: BranchId) -> &Branch<P> {
        &self.branches[id.0]
    }

    /// Region of the root branch. `None` while the tree holds at most one body.
    pub fn root_region(&self) -> Option<Region<P>> {
        match self.root? {
            NodeId::Branch(b) => Some(self.branches[b.0].region),
            NodeId::Body(_) => None,
        }
    }

    /// Center of gravity and total mass of everything in the tree, as of the
    /// last recalibration.
    pub fn center_of_gravity(&self) -> Option<MassPoint<P>> {
        Some(self.mass_point_of(self.root?))
    }

    /// Branches currently linked into the tree.
    pub fn branch_count(&self) -> usize {
        self.branches.len() - self.free.len()
    }

    pub fn is_attached(&self, id: BodyId) -> bool {
        self.bodies[id.0].parent.is_some() || self.root == Some(NodeId::Body(id))
    }

    pub fn unattached_count(&self) -> usize {
        (0..self.bodies.len())
            .filter(|&i| !self.is_attached(BodyId(i)))
            .count()
    }

    /// Links on the longest path from the root to a body.
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 0)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let NodeId::Branch(b) = node {
                stack.extend(self.branches[b.0].children().iter().flatten().map(|&c| (c, depth + 1)));
            }
        }
        deepest
    }

    #[inline]
    pub(crate) fn mass_point_of(&self, node: NodeId) -> MassPoint<P> {
        match node {
            NodeId::Body(id) => self.bodies[id.0].mass_point(),
            NodeId::Branch(b) => self.branches[b.0].mass_point,
        }
    }

    /// The point that decides which slot a node occupies in its parent.
    fn anchor(&self, node: NodeId) -> P {
        match node {
            NodeId::Body(id) => self.bodies[id.0].pos,
            NodeId::Branch(b) => self.branches[b.0].region.center,
        }
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<BranchId>) {
        match node {
            NodeId::Body(id) => self.bodies[id.0].parent = parent,
            NodeId::Branch(b) => self.branches[b.0].parent = parent,
        }
    }

    fn alloc_branch(&mut self, region: Region<P>, parent: Option<BranchId>) -> BranchId {
        let branch = Branch::new(region, parent);
        match self.free.pop() {
            Some(id) => {
                self.branches[id.0] = branch;
                id
            }
            None => {
                self.branches.push(branch);
                BranchId(self.branches.len() - 1)
            }
        }
    }

    fn release_branch(&mut self, id: BranchId) {
        let branch = &mut self.branches[id.0];
        branch.children = [None; MAX_CHILDREN];
        branch.parent = None;
        self.free.push(id);
    }

    /// Link `node` below `parent`, or make it the root.
    fn attach(&mut self, parent: Option<BranchId>, node: NodeId) {
        self.set_parent(node, parent);
        match parent {
            None => self.root = Some(node),
            Some(b) => {
                let anchor = self.anchor(node);
                let branch = &mut self.branches[b.0];
                let slot = branch.region.child_index(&anchor);
                branch.children[slot] = Some(node);
            }
        }
    }

    /// Insert a registered body, starting at the root. Returns whether it
    /// found a place.
    pub(crate) fn insert(&mut self, id: BodyId) -> bool {
        let pos = self.bodies[id.0].pos;
        if self.root_region().is_some_and(|r| !r.contains(&pos)) {
            log::debug!("body {} lies outside the root region, growing it", id.0);
        }
        let placement = self.locate(pos);
        self.place(id, placement)
    }

    /// Where a body at `pos` would go if inserted from the root.
    fn locate(&self, pos: P) -> Placement<P> {
        match self.root {
            None => Placement::Free(None),
            Some(NodeId::Body(other)) => {
                let anchor = self.bodies[other.0].pos;
                let mut region = Region::around(anchor, pos);
                if anchor != pos && region.shrink_until_distinct(&anchor, &pos) {
                    Placement::Split {
                        parent: None,
                        node: NodeId::Body(other),
                        region,
                    }
                } else {
                    Placement::Blocked(NodeId::Body(other))
                }
            }
            Some(NodeId::Branch(root)) => {
                let mut region = self.branches[root.0].region;
                if region.contains(&pos) {
                    return self.locate_below(root, pos);
                }
                region.enlarge_to_contain(&pos);
                self.wrap(None, root, region, pos)
            }
        }
    }

    /// Walk down from branch `from`, which contains `pos`, to the first free
    /// slot or the occupant that has to be split.
    fn locate_below(&self, from: BranchId, pos: P) -> Placement<P> {
        let mut parent = from;
        loop {
            let branch = &self.branches[parent.0];
            let index = branch.region.child_index(&pos);
            let Some(node) = branch.children[index] else {
                return Placement::Free(Some(parent));
            };
            let cell = branch.region.child(index);

            match node {
                NodeId::Body(other) => {
                    let anchor = self.bodies[other.0].pos;
                    let mut region = cell;
                    let split = anchor != pos
                        && region.shrink_until_distinct(&anchor, &pos)
                        && branch.region.holds(index, &region);
                    return if split {
                        Placement::Split {
                            parent: Some(parent),
                            node,
                            region,
                        }
                    } else {
                        Placement::Blocked(node)
                    };
                }
                NodeId::Branch(b) if self.branches[b.0].region.contains(&pos) => parent = b,
                NodeId::Branch(b) => return self.wrap(Some(parent), b, cell, pos),
            }
        }
    }

    /// Shrink `region` until it parts branch `inner` from `pos`, giving the
    /// branch that takes both.
    fn wrap(
        &self,
        parent: Option<BranchId>,
        inner: BranchId,
        mut region: Region<P>,
        pos: P,
    ) -> Placement<P> {
        let inner_region = self.branches[inner.0].region;
        let fits = region.separate(&inner_region, &pos)
            && region.contains(&pos)
            && region.holds(region.child_index(&inner_region.center), &inner_region)
            && parent.is_none_or(|p| {
                let outer = self.branches[p.0].region;
                outer.holds(outer.child_index(&pos), &region)
            });
        if fits {
            Placement::Split {
                parent,
                node: NodeId::Branch(inner),
                region,
            }
        } else {
            Placement::Blocked(NodeId::Branch(inner))
        }
    }

    /// Carry out a placement. A blocked body stays unattached.
    fn place(&mut self, id: BodyId, placement: Placement<P>) -> bool {
        match placement {
            Placement::Free(parent) => self.attach(parent, NodeId::Body(id)),
            Placement::Split {
                parent,
                node,
                region,
            } => {
                let branch = self.alloc_branch(region, parent);
                self.splice(parent, node, NodeId::Branch(branch));
                self.attach(Some(branch), node);
                self.attach(Some(branch), NodeId::Body(id));
            }
            Placement::Blocked(node) => {
                log::trace!("body {} cannot be told apart from {node:?}", id.0);
                return false;
            }
        }
        true
    }

    /// Whether a body still sits in the slot its position selects.
    fn in_correct_slot(&self, parent: BranchId, id: BodyId) -> bool {
        let branch = &self.branches[parent.0];
        let pos = &self.bodies[id.0].pos;
        branch.region.contains(pos)
            && branch.children[branch.region.child_index(pos)] == Some(NodeId::Body(id))
    }

    /// Unlink a body from its parent, collapsing the parent if it is left with
    /// a single child. Returns the former grandparent.
    fn detach(&mut self, id: BodyId) -> Option<BranchId> {
        let parent = self.bodies[id.0]
            .parent
            .take()
            .unwrap_or_else(|| panic!("detaching unattached body {}", id.0));

        let branch = &mut self.branches[parent.0];
        let slot = branch
            .slot_of(NodeId::Body(id))
            .unwrap_or_else(|| panic!("body {} missing from its parent branch", id.0));
        branch.children[slot] = None;
        let grandparent = branch.parent;

        let mut remaining = branch.children().iter().flatten().copied();
        match (remaining.next(), remaining.next()) {
            (None, _) => panic!("branch {} left without children", parent.0),
            (Some(only), None) => {
                self.splice(grandparent, NodeId::Branch(parent), only);
                self.release_branch(parent);
            }
            _ => {}
        }
        grandparent
    }

    /// Put `new` into the slot `old` occupies. The survivor of a collapse may
    /// have moved this tick, so its own position cannot pick the slot.
    fn splice(&mut self, parent: Option<BranchId>, old: NodeId, new: NodeId) {
        self.set_parent(new, parent);
        match parent {
            None => self.root = Some(new),
            Some(b) => {
                let branch = &mut self.branches[b.0];
                let slot = branch
                    .slot_of(old)
                    .unwrap_or_else(|| panic!("{old:?} missing from branch {}", b.0));
                branch.children[slot] = Some(new);
            }
        }
    }

    /// Move a body that left its cell to wherever its position now belongs.
    /// Returns whether it went back in through the root.
    fn relink(&mut self, id: BodyId) -> bool {
        let mut cursor = self.detach(id);
        let pos = self.bodies[id.0].pos;
        while let Some(b) = cursor {
            let branch = &self.branches[b.0];
            if branch.region.contains(&pos) {
                let placement = self.locate_below(b, pos);
                if self.place(id, placement) {
                    return false;
                }
                break;
            }
            cursor = branch.parent;
        }
        self.insert(id);
        true
    }

    /// Repair the tree after every body has moved. Unattached bodies are
    /// retried once the moved ones are back in place.
    pub(crate) fn relink_moved(&mut self) -> StepReport {
        let mut report = StepReport::default();
        for i in 0..self.bodies.len() {
            let id = BodyId(i);
            let Some(parent) = self.bodies[i].parent else {
                continue;
            };
            if !self.in_correct_slot(parent, id) {
                report.relinks += 1;
                if self.relink(id) {
                    report.root_reinserts += 1;
                }
            }
        }
        for i in 0..self.bodies.len() {
            let id = BodyId(i);
            if !self.is_attached(id) {
                self.insert(id);
            }
        }
        report.unattached = self.unattached_count();
        report
    }

    /// Recompute every branch's center of gravity from scratch.
    pub fn recalibrate(&mut self) {
        if let Some(NodeId::Branch(root)) = self.root {
            self.recalibrate_branch(root);
        }
    }

    fn recalibrate_branch(&mut self, id: BranchId) -> MassPoint<P> {
        let children = self.branches[id.0].children;
        let mut points = [None; MAX_CHILDREN];
        for (point, child) in points.iter_mut().zip(children).take(P::CHILDREN) {
            *point = child.map(|node| match node {
                NodeId::Body(body) => self.bodies[body.0].mass_point(),
                NodeId::Branch(b) => self.recalibrate_branch(b),
            });
        }
        let mass_point = MassPoint::weighted_average(points.into_iter().flatten());
        self.branches[id.0].mass_point = mass_point;
        mass_point
    }

    /// Check every structural invariant: branches hold at least two children,
    /// children sit in the slot their position selects, parent links match,
    /// and every attached body is reachable exactly once.
    pub fn verify(&self) -> anyhow::Result<()> {
        let mut seen = vec![false; self.bodies.len()];

        if let Some(root) = self.root {
            match root {
                NodeId::Body(id) => ensure!(
                    self.bodies[id.0].parent.is_none(),
                    "root body {} has a parent",
                    id.0
                ),
                NodeId::Branch(b) => ensure!(
                    self.branches[b.0].parent.is_none(),
                    "root branch {} has a parent",
                    b.0
                ),
            }

            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                let b = match node {
                    NodeId::Body(id) => {
                        ensure!(!seen[id.0], "body {} linked twice", id.0);
                        seen[id.0] = true;
                        continue;
                    }
                    NodeId::Branch(b) => b,
                };

                let branch = &self.branches[b.0];
                ensure!(
                    branch.child_count() >= 2,
                    "branch {} has {} children",
                    b.0,
                    branch.child_count()
                );
                ensure!(
                    branch.children[P::CHILDREN..].iter().all(Option::is_none),
                    "branch {} uses slots beyond {}",
                    b.0,
                    P::CHILDREN
                );

                for (slot, child) in branch.children().iter().enumerate() {
                    let Some(child) = *child else { continue };
                    match child {
                        NodeId::Body(id) => {
                            let body = &self.bodies[id.0];
                            ensure!(
                                body.parent == Some(b),
                                "body {} has a stale parent link",
                                id.0
                            );
                            ensure!(
                                branch.region.contains(&body.pos)
                                    && branch.region.child_index(&body.pos) == slot,
                                "body {} at {:?} is not in slot {slot} of branch {}",
                                id.0,
                                body.pos,
                                b.0
                            );
                        }
                        NodeId::Branch(c) => {
                            let inner = &self.branches[c.0];
                            ensure!(
                                inner.parent == Some(b),
                                "branch {} has a stale parent link",
                                c.0
                            );
                            ensure!(
                                branch.region.holds(slot, &inner.region),
                                "branch {} does not fit slot {slot} of branch {}",
                                c.0,
                                b.0
                            );
                        }
                    }
                    stack.push(child);
                }
            }
        }

        for (i, body) in self.bodies.iter().enumerate() {
            let id = BodyId(i);
            if seen[i] {
                continue;
            }
            if body.parent.is_some() {
                bail!("body {i} claims a parent but is unreachable");
            }
            ensure!(
                self.root != Some(NodeId::Body(id)),
                "root body {i} was not visited"
            );
            ensure!(
                matches!(self.locate(body.pos), Placement::Blocked(_)),
                "body {i} at {:?} is unattached but has a place in the tree",
                body.pos
            );
        }
        Ok(())
    }
}
