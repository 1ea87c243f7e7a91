//! Streaming sparse voxel octree node
//!
//! Nodes are shared between the host thread, which owns the tree shape, the
//! work queues and the atlas, and worker jobs that voxelize one node at a
//! time. The tree is held through `Arc` from the root down; parents are
//! `Weak`, and queues only hold `Weak` references so eviction frees a
//! subtree as soon as no job is touching it.
//!
//! Node boxes are relative to the environment origin; world-space boxes are
//! derived on demand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use glam::Vec3;

use super::pending::{MeshMap, PendingMeshes};
use crate::atlas::BlockId;
use crate::core::CameraSnapshot;
use crate::math::Aabb;
use crate::scene::GeometrySource;
use crate::streaming::VoxelBudget;
use crate::terrain::triangulate;
use crate::voxel::brick::Brick;
use crate::voxel::scratch::ScratchBuffer;
use crate::voxel::super_mesh::SuperMesh;
use crate::voxel::voxelize::process_triangles;

const NO_BLOCK: u32 = u32::MAX;

/// Read-only state shared by every voxelization job
pub struct ProcessContext {
    pub origin: Vec3,
    pub brick_size: u32,
    pub max_node_size: f32,
    /// Surface offset in cells
    pub surface_offset: f32,
    pub terrain_double_sided: bool,
    pub geometry: Arc<dyn GeometrySource>,
    pub budget: Arc<VoxelBudget>,
}

/// Result of one voxelization pass over a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrickUpdate {
    /// Node is structural or detached; nothing to do
    Skipped,
    /// A new brick was needed but the voxel budget is exhausted
    Refused,
    Updated { has_data: bool, triangles: usize },
}

/// Counters gathered while walking the tree
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub visited: usize,
    pub culled: usize,
    pub lod_skipped: usize,
    pub created: usize,
    pub queued: usize,
    pub upload_requeued: usize,
}

/// Host-side state for one update pass
pub struct UpdateContext<'a> {
    pub camera: &'a CameraSnapshot,
    pub origin: Vec3,
    pub frame: u32,
    pub min_node_size: f32,
    pub max_node_size: f32,
    /// Distance over node size beyond which detail is skipped; 0 disables
    pub lod_ratio: f32,
    /// Terrain-only parents also satisfy the LOD skip rule
    pub terrain_lod: bool,
    pub process_queue: &'a mut VecDeque<Weak<VoxelNode>>,
    pub upload_queue: &'a mut VecDeque<Weak<VoxelNode>>,
    pub stats: TraversalStats,
}

/// Host-side state for one eviction pass
pub struct EvictContext<'a> {
    pub frame: u32,
    pub delay_frames: u32,
    /// Evict every child regardless of visibility
    pub force: bool,
    pub freed_blocks: &'a mut Vec<BlockId>,
    pub evicted_nodes: usize,
}

#[derive(Debug)]
pub struct VoxelNode {
    local_box: Aabb,
    parent: Weak<VoxelNode>,
    children: RwLock<[Option<Arc<VoxelNode>>; 8]>,
    pending: Mutex<PendingMeshes>,
    brick: RwLock<Option<Arc<Brick>>>,
    block: AtomicU32,
    last_visible_frame: AtomicU32,
    data_version: AtomicU32,
    uploaded_version: AtomicU32,
    queued: AtomicBool,
    upload_queued: AtomicBool,
    processed: AtomicBool,
    legacy_collected: AtomicBool,
    has_data: AtomicBool,
    terrain_only: AtomicBool,
    has_dynamic: AtomicBool,
    evicted: AtomicBool,
}

impl VoxelNode {
    fn with_pending(local_box: Aabb, parent: Weak<VoxelNode>, pending: PendingMeshes) -> Self {
        Self {
            local_box,
            parent,
            children: RwLock::new(Default::default()),
            pending: Mutex::new(pending),
            brick: RwLock::new(None),
            block: AtomicU32::new(NO_BLOCK),
            last_visible_frame: AtomicU32::new(0),
            data_version: AtomicU32::new(0),
            uploaded_version: AtomicU32::new(0),
            queued: AtomicBool::new(false),
            upload_queued: AtomicBool::new(false),
            processed: AtomicBool::new(false),
            legacy_collected: AtomicBool::new(false),
            has_data: AtomicBool::new(false),
            terrain_only: AtomicBool::new(true),
            has_dynamic: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
        }
    }

    fn pending_for(local_box: &Aabb, meshes: MeshMap, max_node_size: f32) -> PendingMeshes {
        if local_box.max_extent() > max_node_size {
            let mut pending = PendingMeshes::default();
            pending.merge_applied(&meshes, &MeshMap::new());
            pending
        } else {
            PendingMeshes::seeded(meshes)
        }
    }

    /// Root node seeded with every mesh currently in the scene
    pub fn new_root(local_box: Aabb, meshes: MeshMap, max_node_size: f32) -> Arc<Self> {
        let pending = Self::pending_for(&local_box, meshes, max_node_size);
        Arc::new(Self::with_pending(local_box, Weak::new(), pending))
    }

    fn new_child(self: &Arc<Self>, index: u8, origin: Vec3, max_node_size: f32) -> Arc<Self> {
        let local_box = self.local_box.child_octant(index);
        let world_box = local_box.translated(origin);
        let meshes: MeshMap = self
            .pending()
            .effective_meshes()
            .into_iter()
            .filter(|(_, m)| m.world_box.intersects(&world_box))
            .collect();
        let pending = Self::pending_for(&local_box, meshes, max_node_size);
        Arc::new(Self::with_pending(local_box, Arc::downgrade(self), pending))
    }

    fn pending(&self) -> MutexGuard<'_, PendingMeshes> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Geometry ---

    pub fn local_box(&self) -> &Aabb {
        &self.local_box
    }

    pub fn world_box(&self, origin: Vec3) -> Aabb {
        self.local_box.translated(origin)
    }

    /// Edge length
    pub fn size(&self) -> f32 {
        self.local_box.max_extent()
    }

    // --- Hierarchy ---

    pub fn parent(&self) -> Option<Arc<VoxelNode>> {
        self.parent.upgrade()
    }

    pub fn child(&self, index: usize) -> Option<Arc<VoxelNode>> {
        let children = self.children.read().unwrap_or_else(|e| e.into_inner());
        children.get(index).and_then(|c| c.clone())
    }

    /// Snapshot of the child slots, so callers never hold the lock while
    /// recursing
    pub fn children(&self) -> [Option<Arc<VoxelNode>>; 8] {
        self.children.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn child_count(&self) -> usize {
        self.children().iter().flatten().count()
    }

    /// Visit this node and every descendant, depth first
    pub fn visit(self: &Arc<Self>, depth: u32, f: &mut dyn FnMut(&Arc<VoxelNode>, u32)) {
        f(self, depth);
        for child in self.children().iter().flatten() {
            child.visit(depth + 1, f);
        }
    }

    // --- State ---

    pub fn brick(&self) -> Option<Arc<Brick>> {
        self.brick.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn block(&self) -> Option<BlockId> {
        match self.block.load(Ordering::Acquire) {
            NO_BLOCK => None,
            id => Some(BlockId(id)),
        }
    }

    pub fn set_block(&self, block: BlockId) {
        self.block.store(block.0, Ordering::Release);
    }

    pub fn take_block(&self) -> Option<BlockId> {
        match self.block.swap(NO_BLOCK, Ordering::AcqRel) {
            NO_BLOCK => None,
            id => Some(BlockId(id)),
        }
    }

    pub fn has_data(&self) -> bool {
        self.has_data.load(Ordering::Acquire)
    }

    /// True while only terrain has contributed to this node
    pub fn is_terrain_only(&self) -> bool {
        self.terrain_only.load(Ordering::Acquire)
    }

    pub fn has_dynamic(&self) -> bool {
        self.has_dynamic.load(Ordering::Acquire)
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    pub fn last_visible_frame(&self) -> u32 {
        self.last_visible_frame.load(Ordering::Acquire)
    }

    pub fn data_version(&self) -> u32 {
        self.data_version.load(Ordering::Acquire)
    }

    pub fn has_pending_edits(&self) -> bool {
        self.pending().has_pending()
    }

    pub fn has_pending_insertions(&self) -> bool {
        self.pending().has_pending_insertions()
    }

    /// Meshes applied to this node by completed or running passes
    pub fn applied_meshes(&self) -> MeshMap {
        self.pending().applied().clone()
    }

    /// Brick data exists that the atlas does not hold yet
    pub fn needs_upload(&self) -> bool {
        self.has_data()
            && (self.block().is_none()
                || self.uploaded_version.load(Ordering::Acquire) != self.data_version())
    }

    /// Record that brick data of `version` reached the atlas
    pub fn mark_uploaded(&self, version: u32) {
        self.uploaded_version.store(version, Ordering::Release);
    }

    /// Queue for upload unless already queued; returns true when queued now
    pub fn try_mark_upload_queued(&self) -> bool {
        !self.upload_queued.swap(true, Ordering::AcqRel)
    }

    pub fn clear_upload_queued(&self) {
        self.upload_queued.store(false, Ordering::Release);
    }

    fn parent_has_detail(&self, terrain_lod: bool) -> bool {
        self.parent()
            .is_some_and(|p| p.has_data() && (terrain_lod || !p.is_terrain_only()))
    }

    // --- Host passes ---

    /// Visibility-driven refinement.
    ///
    /// Marks the node visible, queues it for voxelization when it has work,
    /// creates visible children and recurses into them.
    pub fn update(self: &Arc<Self>, ctx: &mut UpdateContext<'_>) {
        let world_box = self.world_box(ctx.origin);
        if !ctx.camera.is_visible(&world_box) {
            ctx.stats.culled += 1;
            return;
        }
        ctx.stats.visited += 1;
        self.last_visible_frame.fetch_max(ctx.frame, Ordering::AcqRel);

        let size = self.size();
        if ctx.lod_ratio > 0.0
            && self.parent_has_detail(ctx.terrain_lod)
            && ctx.camera.distance_to(&world_box) > size * ctx.lod_ratio
        {
            ctx.stats.lod_skipped += 1;
            return;
        }

        if size <= ctx.max_node_size {
            let has_work = !self.is_processed() || self.has_pending_edits();
            if has_work && !self.queued.swap(true, Ordering::AcqRel) {
                ctx.process_queue.push_back(Arc::downgrade(self));
                ctx.stats.queued += 1;
            } else if !has_work && self.needs_upload() && self.try_mark_upload_queued() {
                // atlas block was reclaimed while the node was out of view
                ctx.upload_queue.push_back(Arc::downgrade(self));
                ctx.stats.upload_requeued += 1;
            }
        }

        self.allocate_children(ctx);
        for child in self.children().iter().flatten() {
            child.update(ctx);
        }
    }

    /// Create visible children for nodes that hold or will hold data
    pub fn allocate_children(self: &Arc<Self>, ctx: &mut UpdateContext<'_>) {
        let size = self.size();
        if size * 0.5 < ctx.min_node_size {
            return;
        }
        let wants_children =
            size > ctx.max_node_size || self.has_data() || self.has_pending_insertions();
        if !wants_children {
            return;
        }

        let mut children = self.children.write().unwrap_or_else(|e| e.into_inner());
        for (index, slot) in children.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let child_box = self.local_box.child_octant(index as u8).translated(ctx.origin);
            if ctx.camera.is_visible(&child_box) {
                *slot = Some(self.new_child(index as u8, ctx.origin, ctx.max_node_size));
                ctx.stats.created += 1;
            }
        }
    }

    /// Drop children not seen for `delay_frames`, recursing into the rest.
    ///
    /// Atlas blocks of dropped subtrees are collected for the caller to
    /// release.
    pub fn evict(&self, ctx: &mut EvictContext<'_>) {
        let mut children = self.children.write().unwrap_or_else(|e| e.into_inner());
        for slot in children.iter_mut() {
            let stale = slot.as_ref().is_some_and(|child| {
                ctx.force || child.last_visible_frame().saturating_add(ctx.delay_frames) < ctx.frame
            });
            if stale {
                if let Some(child) = slot.take() {
                    child.detach(ctx);
                }
            } else if let Some(child) = slot.as_ref() {
                child.evict(ctx);
            }
        }
    }

    fn detach(&self, ctx: &mut EvictContext<'_>) {
        self.evicted.store(true, Ordering::Release);
        ctx.evicted_nodes += 1;
        if let Some(block) = self.take_block() {
            ctx.freed_blocks.push(block);
        }
        let mut children = self.children.write().unwrap_or_else(|e| e.into_inner());
        for slot in children.iter_mut() {
            if let Some(child) = slot.take() {
                child.detach(ctx);
            }
        }
    }

    /// Route mesh edits to every node whose box they overlap
    pub fn enqueue_meshes(&self, insertions: &MeshMap, removals: &MeshMap, origin: Vec3, max_node_size: f32) {
        let world_box = self.world_box(origin);
        let overlapping = |meshes: &MeshMap| -> MeshMap {
            meshes
                .iter()
                .filter(|(_, m)| m.world_box.intersects(&world_box))
                .map(|(id, m)| (*id, Arc::clone(m)))
                .collect()
        };
        let ins = overlapping(insertions);
        let rem = overlapping(removals);
        if ins.is_empty() && rem.is_empty() {
            return;
        }

        {
            let mut pending = self.pending();
            if self.size() > max_node_size {
                pending.merge_applied(&ins, &rem);
            } else {
                pending.merge(&ins, &rem);
            }
        }

        for child in self.children().iter().flatten() {
            child.enqueue_meshes(&ins, &rem, origin, max_node_size);
        }
    }

    // --- Worker pass ---

    /// Voxelize pending edits, plus static geometry on the first pass, into
    /// this node's brick.
    pub fn update_brick_data(&self, ctx: &ProcessContext, scratch: &mut ScratchBuffer) -> BrickUpdate {
        if self.size() > ctx.max_node_size || self.is_evicted() {
            return BrickUpdate::Skipped;
        }

        let edits = self.pending().swap();
        let world_box = self.world_box(ctx.origin);
        let size = self.size();
        let cell = size / ctx.brick_size as f32;
        let offset = ctx.surface_offset * cell;
        let clip = world_box.inflated(cell);
        let first_pass = !self.legacy_collected.load(Ordering::Acquire);

        let mut insert = SuperMesh::with_anchor(world_box.min, clip);
        let mut non_terrain = false;
        if first_pass {
            for mesh in ctx.geometry.static_meshes(&clip) {
                non_terrain |= insert.add_mesh(&mesh, offset) > 0;
            }
            for area in ctx.geometry.vis_areas(&clip) {
                non_terrain |= insert.add_loose(&area.boundary_triangles(), offset) > 0;
            }
            if let Some(terrain) = ctx.geometry.terrain() {
                let triangles = triangulate(terrain, &clip);
                insert.add_loose(&triangles, offset);
                if ctx.terrain_double_sided {
                    insert.add_loose(&triangles, -offset);
                }
            }
        }
        for mesh in edits.insertions.values() {
            non_terrain |= insert.add_mesh(mesh, offset) > 0;
        }
        let mut remove = SuperMesh::with_anchor(world_box.min, clip);
        for mesh in edits.removals.values() {
            remove.add_mesh(mesh, offset);
        }

        let brick = match self.brick() {
            Some(brick) => brick,
            None if insert.is_empty() => {
                self.finish_pass(non_terrain, false);
                return BrickUpdate::Updated { has_data: false, triangles: 0 };
            }
            None => match Brick::try_new(ctx.brick_size, &ctx.budget) {
                Some(brick) => Arc::new(brick),
                None => {
                    self.pending().restore(edits);
                    return BrickUpdate::Refused;
                }
            },
        };

        scratch.ensure_size(ctx.brick_size);
        let mut triangles = 0;
        if !insert.is_empty() {
            triangles += process_triangles(&insert, size, scratch).triangles;
            brick.update_brick_data(scratch, true);
            scratch.clear();
        }
        if !remove.is_empty() {
            triangles += process_triangles(&remove, size, scratch).triangles;
            brick.update_brick_data(scratch, false);
            scratch.clear();
        }

        let has_data = brick.has_brick_data();
        *self.brick.write().unwrap_or_else(|e| e.into_inner()) = has_data.then_some(brick);
        self.finish_pass(non_terrain, has_data);
        BrickUpdate::Updated { has_data, triangles }
    }

    fn finish_pass(&self, non_terrain: bool, has_data: bool) {
        if non_terrain {
            self.terrain_only.store(false, Ordering::Release);
        }
        let dynamic = self.pending().applied_has_dynamic();
        self.has_dynamic.store(dynamic, Ordering::Release);
        self.has_data.store(has_data, Ordering::Release);
        self.legacy_collected.store(true, Ordering::Release);
        self.processed.store(true, Ordering::Release);
        self.data_version.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityId;
    use crate::scene::{EmptyScene, Material, MeshSnapshot, StaticScene};

    const BRICK: u32 = 8;

    fn context(geometry: Arc<dyn GeometrySource>, max_bricks: usize) -> ProcessContext {
        ProcessContext {
            origin: Vec3::ZERO,
            brick_size: BRICK,
            max_node_size: 8.0,
            surface_offset: 0.0,
            terrain_double_sided: false,
            geometry,
            budget: Arc::new(VoxelBudget::new(max_bricks)),
        }
    }

    fn cube(lo: f32, hi: f32) -> Arc<MeshSnapshot> {
        let mat = Arc::new(Material::opaque("white", Vec3::ONE));
        Arc::new(MeshSnapshot::cuboid(Aabb::new(Vec3::splat(lo), Vec3::splat(hi)), Some(mat)))
    }

    fn leaf(meshes: MeshMap) -> Arc<VoxelNode> {
        VoxelNode::new_root(Aabb::new(Vec3::ZERO, Vec3::splat(8.0)), meshes, 8.0)
    }

    fn single(id: u64, mesh: &Arc<MeshSnapshot>) -> MeshMap {
        [(EntityId(id), Arc::clone(mesh))].into_iter().collect()
    }

    fn run_update(root: &Arc<VoxelNode>, camera: &CameraSnapshot, frame: u32) -> (Vec<Arc<VoxelNode>>, TraversalStats) {
        let mut process = VecDeque::new();
        let mut upload = VecDeque::new();
        let mut ctx = UpdateContext {
            camera,
            origin: Vec3::ZERO,
            frame,
            min_node_size: 8.0,
            max_node_size: 8.0,
            lod_ratio: 0.0,
            terrain_lod: false,
            process_queue: &mut process,
            upload_queue: &mut upload,
            stats: TraversalStats::default(),
        };
        root.update(&mut ctx);
        let stats = ctx.stats;
        (process.iter().filter_map(Weak::upgrade).collect(), stats)
    }

    #[test]
    fn test_mesh_insert_creates_brick() {
        let mesh = cube(2.0, 6.0);
        let node = leaf(single(1, &mesh));
        let ctx = context(Arc::new(EmptyScene), 16);
        let mut scratch = ScratchBuffer::new(BRICK);

        let result = node.update_brick_data(&ctx, &mut scratch);
        assert!(matches!(result, BrickUpdate::Updated { has_data: true, .. }));
        assert!(node.has_data());
        assert!(!node.is_terrain_only());
        assert_eq!(ctx.budget.bricks(), 1);
        assert!(!node.has_pending_edits());
    }

    #[test]
    fn test_remove_restores_empty_brick() {
        let mesh = cube(2.0, 6.0);
        let node = leaf(single(1, &mesh));
        let ctx = context(Arc::new(EmptyScene), 16);
        let mut scratch = ScratchBuffer::new(BRICK);
        node.update_brick_data(&ctx, &mut scratch);

        node.enqueue_meshes(&MeshMap::new(), &single(1, &mesh), Vec3::ZERO, 8.0);
        assert!(node.has_pending_edits());
        let result = node.update_brick_data(&ctx, &mut scratch);
        assert_eq!(result, BrickUpdate::Updated { has_data: false, triangles: 12 });
        assert!(node.brick().is_none());
        assert_eq!(ctx.budget.bricks(), 0);
    }

    #[test]
    fn test_dynamic_flag_follows_applied_meshes() {
        let still = cube(1.0, 3.0);
        let moving = Arc::new((*cube(4.0, 6.0)).clone().with_mobility(crate::scene::MeshMobility::Dynamic));
        let node = leaf(single(1, &still));
        let ctx = context(Arc::new(EmptyScene), 16);
        let mut scratch = ScratchBuffer::new(BRICK);
        node.update_brick_data(&ctx, &mut scratch);
        assert!(!node.has_dynamic());

        node.enqueue_meshes(&single(2, &moving), &MeshMap::new(), Vec3::ZERO, 8.0);
        node.update_brick_data(&ctx, &mut scratch);
        assert!(node.has_dynamic());

        node.enqueue_meshes(&MeshMap::new(), &single(2, &moving), Vec3::ZERO, 8.0);
        node.update_brick_data(&ctx, &mut scratch);
        assert!(node.has_data());
        assert!(!node.has_dynamic());
    }

    #[test]
    fn test_budget_refusal_keeps_edits() {
        let mesh = cube(2.0, 6.0);
        let node = leaf(single(1, &mesh));
        let ctx = context(Arc::new(EmptyScene), 0);
        let mut scratch = ScratchBuffer::new(BRICK);

        assert_eq!(node.update_brick_data(&ctx, &mut scratch), BrickUpdate::Refused);
        assert!(node.has_pending_insertions());
        assert!(!node.is_processed());
    }

    #[test]
    fn test_static_geometry_collected_once() {
        let scene = StaticScene::new().with_mesh((*cube(1.0, 3.0)).clone());
        let node = leaf(MeshMap::new());
        let ctx = context(Arc::new(scene), 16);
        let mut scratch = ScratchBuffer::new(BRICK);

        let first = node.update_brick_data(&ctx, &mut scratch);
        assert_eq!(first, BrickUpdate::Updated { has_data: true, triangles: 12 });
        let covered = node.brick().map(|b| b.covered_cells()).unwrap_or(0);

        let second = node.update_brick_data(&ctx, &mut scratch);
        assert_eq!(second, BrickUpdate::Updated { has_data: true, triangles: 0 });
        assert_eq!(node.brick().map(|b| b.covered_cells()).unwrap_or(0), covered);
    }

    #[test]
    fn test_terrain_not_added_again_by_edit_passes() {
        use crate::terrain::{NoiseTerrain, TerrainParams};
        let terrain = NoiseTerrain::new(TerrainParams {
            height_scale: 8.0,
            grid_step: 2.0,
            ..Default::default()
        });
        let node = leaf(MeshMap::new());
        let ctx = context(Arc::new(StaticScene::new().with_terrain(terrain)), 16);
        let mut scratch = ScratchBuffer::new(BRICK);
        let total = |node: &VoxelNode| node.brick().map_or(0, |b| b.read().counts.iter().sum::<u32>());

        node.update_brick_data(&ctx, &mut scratch);
        assert!(node.is_terrain_only());
        let terrain_only = total(&node);
        assert!(terrain_only > 0);

        let mesh = cube(1.0, 3.0);
        node.enqueue_meshes(&single(1, &mesh), &MeshMap::new(), Vec3::ZERO, 8.0);
        node.update_brick_data(&ctx, &mut scratch);
        assert!(total(&node) > terrain_only);

        node.enqueue_meshes(&MeshMap::new(), &single(1, &mesh), Vec3::ZERO, 8.0);
        node.update_brick_data(&ctx, &mut scratch);
        assert_eq!(total(&node), terrain_only);
    }

    #[test]
    fn test_empty_node_has_no_brick() {
        let node = leaf(MeshMap::new());
        let ctx = context(Arc::new(EmptyScene), 16);
        let mut scratch = ScratchBuffer::new(BRICK);
        let result = node.update_brick_data(&ctx, &mut scratch);
        assert_eq!(result, BrickUpdate::Updated { has_data: false, triangles: 0 });
        assert!(node.brick().is_none());
        assert!(node.is_processed());
    }

    #[test]
    fn test_structural_node_is_skipped() {
        let root = VoxelNode::new_root(Aabb::new(Vec3::ZERO, Vec3::splat(32.0)), MeshMap::new(), 8.0);
        let ctx = context(Arc::new(EmptyScene), 16);
        let mut scratch = ScratchBuffer::new(BRICK);
        assert_eq!(root.update_brick_data(&ctx, &mut scratch), BrickUpdate::Skipped);
    }

    #[test]
    fn test_update_subdivides_structural_root() {
        let mesh = cube(2.0, 6.0);
        let root = VoxelNode::new_root(Aabb::new(Vec3::ZERO, Vec3::splat(16.0)), single(1, &mesh), 8.0);
        let camera = CameraSnapshot::unbounded(Vec3::splat(-10.0));
        let (queued, stats) = run_update(&root, &camera, 1);

        assert_eq!(root.child_count(), 8);
        assert_eq!(stats.created, 8);
        // root is structural; all eight children are processed once
        assert_eq!(queued.len(), 8);
        assert!(!root.is_queued());
        // only the child overlapping the mesh inherits it
        let with_mesh = (0..8)
            .filter_map(|i| root.child(i))
            .filter(|c| c.has_pending_insertions())
            .count();
        assert_eq!(with_mesh, 1);
    }

    #[test]
    fn test_queued_node_not_queued_twice() {
        let root = VoxelNode::new_root(Aabb::new(Vec3::ZERO, Vec3::splat(16.0)), MeshMap::new(), 8.0);
        let camera = CameraSnapshot::unbounded(Vec3::ZERO);
        let (first, _) = run_update(&root, &camera, 1);
        let (second, _) = run_update(&root, &camera, 2);
        assert_eq!(first.len(), 8);
        assert!(second.is_empty());
    }

    #[test]
    fn test_eviction_drops_stale_children() {
        let root = VoxelNode::new_root(Aabb::new(Vec3::ZERO, Vec3::splat(16.0)), MeshMap::new(), 8.0);
        let camera = CameraSnapshot::unbounded(Vec3::ZERO);
        run_update(&root, &camera, 1);
        let child = root.child(0).unwrap();
        child.set_block(BlockId(3));

        let mut freed = Vec::new();
        let mut ctx = EvictContext {
            frame: 5,
            delay_frames: 10,
            force: false,
            freed_blocks: &mut freed,
            evicted_nodes: 0,
        };
        root.evict(&mut ctx);
        assert_eq!(ctx.evicted_nodes, 0);

        let mut ctx = EvictContext {
            frame: 20,
            delay_frames: 10,
            force: false,
            freed_blocks: &mut freed,
            evicted_nodes: 0,
        };
        root.evict(&mut ctx);
        assert_eq!(ctx.evicted_nodes, 8);
        assert_eq!(root.child_count(), 0);
        assert_eq!(freed, vec![BlockId(3)]);
        assert!(child.is_evicted());
    }

    #[test]
    fn test_enqueue_routes_by_overlap() {
        let root = VoxelNode::new_root(Aabb::new(Vec3::ZERO, Vec3::splat(16.0)), MeshMap::new(), 8.0);
        let camera = CameraSnapshot::unbounded(Vec3::ZERO);
        run_update(&root, &camera, 1);

        let mesh = cube(9.0, 10.0);
        root.enqueue_meshes(&single(7, &mesh), &MeshMap::new(), Vec3::ZERO, 8.0);
        // structural root records the mesh as applied for future children
        assert!(root.applied_meshes().contains_key(&EntityId(7)));
        let touched: Vec<_> = (0..8)
            .filter(|&i| root.child(i).is_some_and(|c| c.has_pending_insertions()))
            .collect();
        assert_eq!(touched, vec![7]);
    }
}
