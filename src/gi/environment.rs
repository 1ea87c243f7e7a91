//! Voxel GI environment
//!
//! Owns the octree, the mesh edit maps, the processing and upload queues, the
//! atlas packer and one texture pool per channel. A frame runs four phases on
//! the calling thread:
//!
//! 1. **Update** - flush mesh edits into the tree, refine visible nodes and
//!    queue the ones that need voxelizing
//! 2. **Process** - hand queued nodes to background jobs in bounded batches,
//!    one scratch buffer per job
//! 3. **Evict** - drop stale subtrees and reclaim atlas blocks
//! 4. **Upload** - copy finished bricks into the atlas and rewrite the tree
//!    metadata texture
//!
//! Workers only touch the bricks of their own batch. Everything else,
//! including the queues and the packer, is mutated here.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use glam::{UVec3, Vec3};

use super::config::SvoConfig;
use super::debug::{DebugDraw, COLOR_EMPTY, COLOR_RESIDENT, COLOR_STALE};
use super::jobs::{JobSystem, RayonJobs};
use super::lights::{collect_lights, LightBuckets, LightSource};
use super::stats::SvoStats;
use crate::atlas::{
    AtlasChannel, BlockId, MemoryBackend, PoolDesc, PoolId, TexelFormat, TexelRegion, TextureBackend,
    TextureBlockPacker3D,
};
use crate::core::{CameraSnapshot, EntityId, Error, Result};
use crate::math::Aabb;
use crate::scene::{GeometrySource, MeshSnapshot};
use crate::streaming::VoxelBudget;
use crate::voxel::brick::Brick;
use crate::voxel::scratch::{ScratchLease, ScratchPool};
use crate::voxel::svo::gpu_node::encode_ref;
use crate::voxel::svo::{
    BrickUpdate, EvictContext, GpuTreeNode, MeshMap, ProcessContext, UpdateContext, VoxelNode, NODE_ABSENT,
    TREE_TEXELS_PER_NODE,
};

/// Cap on tree rows reserved for nodes above the brick levels
const MAX_STRUCTURAL_ROWS: u32 = 4096;

/// Dirty atlas region handed to the renderer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SvoNodeInfo {
    pub ws_box: Aabb,
    /// Normalized atlas coordinates
    pub tc_box: Aabb,
    pub atlas_offset: u32,
}

/// Texture pools and atlas layout for the renderer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SvoTextureInfo {
    pub tree_pool: Option<PoolId>,
    pub opacity_pool: Option<PoolId>,
    pub albedo_pool: Option<PoolId>,
    pub normal_pool: Option<PoolId>,
    pub emittance_pool: Option<PoolId>,
    /// Brick atlas width and height in texels
    pub tex_dim_xy: [u32; 2],
    /// Brick atlas depth in texels
    pub tex_dim_z: u32,
    pub brick_size: u32,
    /// Rows in the tree pool: one per atlas block id, then the root and the
    /// other nodes above the brick levels
    pub tree_rows: u32,
    /// Row of the root record, where GPU traversal starts
    pub root_row: u32,
    /// The tree texture has been written at least once
    pub ready: bool,
    pub frozen: bool,
}

#[derive(Default)]
struct JobReport {
    results: Vec<(Weak<VoxelNode>, BrickUpdate)>,
}

/// Sends the report when the job finishes, even if it unwinds
struct ReportOnDrop {
    tx: Sender<JobReport>,
    report: JobReport,
}

impl ReportOnDrop {
    fn push(&mut self, node: &Arc<VoxelNode>, outcome: BrickUpdate) {
        self.report.results.push((Arc::downgrade(node), outcome));
    }
}

impl Drop for ReportOnDrop {
    fn drop(&mut self) {
        let report = std::mem::take(&mut self.report);
        let _ = self.tx.send(report);
    }
}

/// Rows needed for the root and every node larger than `max_node_size`
fn structural_rows(config: &SvoConfig) -> u32 {
    let mut rows = 0u64;
    let mut level = 1u64;
    let mut size = config.root_size;
    while size > config.max_node_size && rows < MAX_STRUCTURAL_ROWS as u64 {
        rows += level;
        level *= 8;
        size *= 0.5;
    }
    rows.clamp(1, MAX_STRUCTURAL_ROWS as u64) as u32
}

/// Assigns tree rows depth-first and fills their records
struct TreeWriter<'a> {
    packer: &'a TextureBlockPacker3D,
    origin: Vec3,
    max_node_size: f32,
    next_row: u32,
    records: Vec<GpuTreeNode>,
    overflow: usize,
}

impl TreeWriter<'_> {
    /// Write `node` at `row` and its subtree; returns the reference to `node`
    fn write(&mut self, node: &Arc<VoxelNode>, row: Option<u32>, parent: i32) -> i32 {
        let own = encode_ref(row, true);
        let children = node.children().map(|child| match child {
            Some(child) => {
                let row = self.row_for(&child);
                self.write(&child, row, own)
            }
            None => NODE_ABSENT,
        });

        if let Some(row) = row {
            let grid = self.packer.dim();
            let offset = node
                .block()
                .and_then(|block| self.packer.get_block_info(block))
                .map(|info| info.atlas_offset(grid));
            if let Some(record) = self.records.get_mut(row as usize) {
                *record = GpuTreeNode::new(&node.world_box(self.origin), offset, parent, children);
            }
        }
        own
    }

    fn row_for(&mut self, node: &VoxelNode) -> Option<u32> {
        if let Some(block) = node.block().filter(|&b| self.packer.get_block_info(b).is_some()) {
            return Some(block.0);
        }
        if node.size() <= self.max_node_size {
            return None;
        }
        if (self.next_row as usize) < self.records.len() {
            self.next_row += 1;
            Some(self.next_row - 1)
        } else {
            self.overflow += 1;
            None
        }
    }
}

fn channel_format(channel: AtlasChannel, brick_format: TexelFormat) -> TexelFormat {
    match channel {
        AtlasChannel::Tree => TexelFormat::Rgba32Float,
        AtlasChannel::Opacity => TexelFormat::R8Unorm,
        _ => brick_format,
    }
}

pub struct SvoEnvironment<B: TextureBackend = MemoryBackend> {
    config: SvoConfig,
    origin: Vec3,
    root: Option<Arc<VoxelNode>>,

    /// Every mesh currently in the scene
    live_meshes: MeshMap,
    pending_insertions: MeshMap,
    pending_removals: MeshMap,

    process_queue: VecDeque<Weak<VoxelNode>>,
    upload_queue: VecDeque<Weak<VoxelNode>>,

    packer: TextureBlockPacker3D,
    backend: B,
    pools: HashMap<AtlasChannel, PoolId>,

    structural_rows: u32,

    scratch: Arc<ScratchPool>,
    jobs: Arc<dyn JobSystem>,
    report_tx: Sender<JobReport>,
    report_rx: Receiver<JobReport>,
    outstanding_jobs: usize,
    process_ctx: Arc<ProcessContext>,
    budget: Arc<VoxelBudget>,

    frame: u32,
    atlas_full: bool,
    tree_dirty: bool,
    tree_written: bool,
    frozen: bool,
    pressure_frames: u32,
    atlas_pressure_frames: u32,

    lights: HashMap<EntityId, LightSource>,
    light_buckets: LightBuckets,
    stats: SvoStats,
}

impl SvoEnvironment<MemoryBackend> {
    /// Environment backed by CPU texture pools and the rayon thread pool
    pub fn in_memory(config: SvoConfig, geometry: Arc<dyn GeometrySource>) -> Result<Self> {
        Self::new(config, geometry, MemoryBackend::new(), Arc::new(RayonJobs))
    }
}

impl<B: TextureBackend> SvoEnvironment<B> {
    pub fn new(
        config: SvoConfig,
        geometry: Arc<dyn GeometrySource>,
        mut backend: B,
        jobs: Arc<dyn JobSystem>,
    ) -> Result<Self> {
        config.validate()?;

        let grid = UVec3::from_array(config.atlas_bricks);
        let packer = TextureBlockPacker3D::new(grid);
        let structural_rows = structural_rows(&config);
        let pools = Self::create_pools(
            &mut backend,
            &config,
            grid * config.brick_size,
            packer.capacity() + structural_rows,
        )?;

        let budget = Arc::new(VoxelBudget::new(config.max_loaded_bricks));
        let scratch = ScratchPool::for_hardware(config.scratch_fraction, config.brick_size);
        let process_ctx = Arc::new(ProcessContext {
            origin: config.origin(),
            brick_size: config.brick_size,
            max_node_size: config.max_node_size,
            surface_offset: config.surface_offset,
            terrain_double_sided: config.terrain_double_sided,
            geometry,
            budget: Arc::clone(&budget),
        });
        let (report_tx, report_rx) = crossbeam_channel::unbounded();

        log::info!(
            "SvoEnvironment: root {}m, nodes {}m..{}m, brick {}^3, atlas {:?} bricks, {} scratch buffers on {} jobs",
            config.root_size,
            config.min_node_size,
            config.max_node_size,
            config.brick_size,
            config.atlas_bricks,
            scratch.capacity(),
            jobs.name(),
        );

        Ok(Self {
            origin: config.origin(),
            config,
            root: None,
            live_meshes: MeshMap::new(),
            pending_insertions: MeshMap::new(),
            pending_removals: MeshMap::new(),
            process_queue: VecDeque::new(),
            upload_queue: VecDeque::new(),
            packer,
            backend,
            pools,
            structural_rows,
            scratch,
            jobs,
            report_tx,
            report_rx,
            outstanding_jobs: 0,
            process_ctx,
            budget,
            frame: 0,
            atlas_full: false,
            tree_dirty: true,
            tree_written: false,
            frozen: false,
            pressure_frames: 0,
            atlas_pressure_frames: 0,
            lights: HashMap::new(),
            light_buckets: LightBuckets::default(),
            stats: SvoStats::default(),
        })
    }

    fn create_pools(
        backend: &mut B,
        config: &SvoConfig,
        brick_extent: UVec3,
        tree_rows: u32,
    ) -> Result<HashMap<AtlasChannel, PoolId>> {
        let mut descs: Vec<PoolDesc> = AtlasChannel::BRICK_CHANNELS
            .iter()
            .map(|&channel| PoolDesc {
                channel,
                width: brick_extent.x,
                height: brick_extent.y,
                depth: brick_extent.z,
                format: channel_format(channel, config.texel_format),
            })
            .collect();
        descs.push(PoolDesc {
            channel: AtlasChannel::Tree,
            width: TREE_TEXELS_PER_NODE,
            height: tree_rows,
            depth: 1,
            format: channel_format(AtlasChannel::Tree, config.texel_format),
        });

        let mut pools = HashMap::new();
        for desc in &descs {
            match backend.create_pool(desc) {
                Ok(pool) => {
                    pools.insert(desc.channel, pool);
                }
                Err(err) => {
                    for (_, pool) in pools.drain() {
                        backend.release_pool(pool);
                    }
                    return Err(err);
                }
            }
        }
        Ok(pools)
    }

    // --- Mesh edits ---

    /// Add or move a mesh. Edits reach the tree on the next update.
    pub fn insert_mesh(&mut self, id: EntityId, mesh: Arc<MeshSnapshot>) {
        match self.live_meshes.insert(id, Arc::clone(&mesh)) {
            Some(old) if Arc::ptr_eq(&old, &mesh) => return,
            Some(old) => {
                // nodes that only overlap the old position still subtract it
                self.pending_removals.entry(id).or_insert(old);
            }
            None => {}
        }
        self.pending_insertions.insert(id, mesh);
    }

    /// Remove a mesh; returns false when the id is unknown
    pub fn remove_mesh(&mut self, id: EntityId) -> bool {
        let Some(old) = self.live_meshes.remove(&id) else {
            return false;
        };
        self.pending_insertions.remove(&id);
        self.pending_removals.entry(id).or_insert(old);
        true
    }

    pub fn mesh_count(&self) -> usize {
        self.live_meshes.len()
    }

    // --- Lights ---

    pub fn add_light(&mut self, id: EntityId, light: LightSource) {
        self.lights.insert(id, light);
    }

    pub fn remove_light(&mut self, id: EntityId) -> bool {
        self.lights.remove(&id).is_some()
    }

    /// Lights gathered during the last update
    pub fn lights(&self) -> &LightBuckets {
        &self.light_buckets
    }

    // --- Frame ---

    /// Run one frame of the pipeline
    pub fn update(&mut self, camera: &CameraSnapshot) -> Result<()> {
        self.frame += 1;
        self.stats = SvoStats::new(self.frame);
        if self.frozen {
            return Ok(());
        }

        self.update_voxels(camera);
        self.process_voxels();
        self.evict_voxels();
        self.evict_gpu_data();
        self.upload_voxels()?;
        self.track_pressure();

        self.light_buckets = collect_lights(
            self.lights.values(),
            camera.position,
            self.config.light_search_radius,
            self.config.max_lights_per_bucket,
        );

        self.stats.jobs_outstanding = self.outstanding_jobs;
        self.stats.process_queue = self.process_queue.len();
        self.stats.upload_queue = self.upload_queue.len();
        self.stats.live_blocks = self.packer.live_blocks();
        self.stats.active_bricks = self.budget.bricks();
        self.stats.scratch_free = self.scratch.free_count();
        self.stats.scratch_total = self.scratch.capacity();
        self.stats.log();
        Ok(())
    }

    /// Discard the tree and the atlas contents. Meshes stay registered and
    /// are voxelized again from scratch.
    pub fn reconstruct_tree(&mut self) {
        self.wait_for_jobs();
        log::info!("Reconstructing voxel tree with {} meshes", self.live_meshes.len());

        self.root = None;
        self.process_queue.clear();
        self.upload_queue.clear();
        self.pending_insertions.clear();
        self.pending_removals.clear();
        self.packer.clear();
        self.atlas_full = false;
        self.tree_dirty = true;
    }

    /// Flush mesh edits and refine the visible part of the tree
    pub fn update_voxels(&mut self, camera: &CameraSnapshot) {
        let root = match &self.root {
            Some(root) => {
                if !self.pending_insertions.is_empty() || !self.pending_removals.is_empty() {
                    root.enqueue_meshes(
                        &self.pending_insertions,
                        &self.pending_removals,
                        self.origin,
                        self.config.max_node_size,
                    );
                }
                Arc::clone(root)
            }
            None => {
                let local_box = Aabb::new(Vec3::ZERO, Vec3::splat(self.config.root_size));
                let world_box = local_box.translated(self.origin);
                let meshes: MeshMap = self
                    .live_meshes
                    .iter()
                    .filter(|(_, m)| m.world_box.intersects(&world_box))
                    .map(|(id, m)| (*id, Arc::clone(m)))
                    .collect();
                log::debug!("Creating voxel tree root seeded with {} meshes", meshes.len());
                let root = VoxelNode::new_root(local_box, meshes, self.config.max_node_size);
                self.root = Some(Arc::clone(&root));
                root
            }
        };
        self.pending_insertions.clear();
        self.pending_removals.clear();

        let mut ctx = UpdateContext {
            camera,
            origin: self.origin,
            frame: self.frame,
            min_node_size: self.config.min_node_size,
            max_node_size: self.config.max_node_size,
            lod_ratio: self.config.lod_ratio,
            terrain_lod: self.config.terrain_lod,
            process_queue: &mut self.process_queue,
            upload_queue: &mut self.upload_queue,
            stats: Default::default(),
        };
        root.update(&mut ctx);
        let traversal = ctx.stats;
        if traversal.created > 0 {
            self.tree_dirty = true;
        }
        self.stats.add_traversal(&traversal);
    }

    /// Dispatch queued nodes to background jobs.
    ///
    /// Stops when the per-frame job cap is reached or no scratch buffer is
    /// free; remaining nodes wait for the next frame.
    pub fn process_voxels(&mut self) {
        self.collect_completions();

        let mut dispatched = 0;
        while dispatched < self.config.max_jobs_per_frame && !self.process_queue.is_empty() {
            let Some(lease) = self.scratch.try_claim() else {
                log::trace!("No free scratch buffer, {} nodes deferred", self.process_queue.len());
                break;
            };
            let batch = self.next_batch();
            if batch.is_empty() {
                break;
            }
            self.dispatch(batch, lease);
            dispatched += 1;
        }
        self.stats.jobs_dispatched += dispatched;

        self.collect_completions();
    }

    fn next_batch(&mut self) -> Vec<Arc<VoxelNode>> {
        let max_nodes = self.config.max_nodes_per_job;
        let mut batch = Vec::with_capacity(max_nodes);
        while batch.len() < max_nodes {
            let Some(weak) = self.process_queue.pop_front() else {
                break;
            };
            let Some(node) = weak.upgrade() else {
                continue;
            };
            if node.is_evicted() {
                node.clear_queued();
                continue;
            }
            batch.push(node);
        }
        batch
    }

    fn dispatch(&mut self, batch: Vec<Arc<VoxelNode>>, mut lease: ScratchLease) {
        let ctx = Arc::clone(&self.process_ctx);
        let mut report = ReportOnDrop {
            tx: self.report_tx.clone(),
            report: JobReport::default(),
        };
        self.outstanding_jobs += 1;

        self.jobs.submit(Box::new(move || {
            for node in batch {
                let outcome = node.update_brick_data(&ctx, &mut lease);
                log::trace!("Voxelized node {:?}: {:?}", node.local_box().min, outcome);
                report.push(&node, outcome);
            }
            drop(lease);
            drop(report);
        }));
    }

    fn collect_completions(&mut self) {
        while let Ok(report) = self.report_rx.try_recv() {
            self.apply_report(report);
        }
    }

    fn wait_for_jobs(&mut self) {
        while self.outstanding_jobs > 0 {
            match self.report_rx.recv() {
                Ok(report) => self.apply_report(report),
                Err(_) => break,
            }
        }
    }

    fn apply_report(&mut self, report: JobReport) {
        self.outstanding_jobs = self.outstanding_jobs.saturating_sub(1);
        for (weak, outcome) in report.results {
            let Some(node) = weak.upgrade() else {
                continue;
            };
            node.clear_queued();
            match outcome {
                BrickUpdate::Updated { .. } => {
                    self.stats.processed += 1;
                    let stale_block = !node.has_data() && node.block().is_some();
                    if !node.is_evicted()
                        && (node.needs_upload() || stale_block)
                        && node.try_mark_upload_queued()
                    {
                        self.upload_queue.push_back(weak);
                    }
                }
                BrickUpdate::Refused => self.stats.refused += 1,
                BrickUpdate::Skipped => {}
            }
        }
    }

    /// Drop subtrees that have not been visible for the eviction delay.
    ///
    /// Runs every eviction interval, and every frame while the voxel budget
    /// is under pressure (with the shorter GPU delay).
    pub fn evict_voxels(&mut self) -> usize {
        let Some(root) = self.root.clone() else {
            return 0;
        };
        let over_budget = self.budget.should_evict();
        let due = self.frame % self.config.eviction_interval_frames == 0;
        if !due && !over_budget {
            return 0;
        }

        let delay_frames = if over_budget {
            self.config.eviction_delay_frames.min(self.config.gpu_eviction_delay_frames)
        } else {
            self.config.eviction_delay_frames
        };
        let mut freed = Vec::new();
        let mut ctx = EvictContext {
            frame: self.frame,
            delay_frames,
            force: false,
            freed_blocks: &mut freed,
            evicted_nodes: 0,
        };
        root.evict(&mut ctx);
        let evicted = ctx.evicted_nodes;

        self.release_blocks(&freed);
        self.stats.evicted_nodes += evicted;
        if evicted > 0 {
            self.tree_dirty = true;
            log::debug!(
                "Evicted {} nodes ({} atlas blocks), {} bricks resident",
                evicted,
                freed.len(),
                self.budget.bricks()
            );
        }
        evicted
    }

    /// Reclaim atlas blocks of nodes unseen for the GPU eviction delay.
    ///
    /// When the atlas ran out of space, every block not visible this frame
    /// is reclaimed.
    pub fn evict_gpu_data(&mut self) -> usize {
        let Some(root) = self.root.clone() else {
            return 0;
        };
        let force = self.atlas_full;
        if !force && self.frame % self.config.eviction_interval_frames != 0 {
            return 0;
        }

        let frame = self.frame;
        let delay = self.config.gpu_eviction_delay_frames;
        let mut freed = Vec::new();
        root.visit(0, &mut |node, _| {
            if node.block().is_none() {
                return;
            }
            let last = node.last_visible_frame();
            if last.saturating_add(delay) < frame || (force && last < frame) {
                if let Some(block) = node.take_block() {
                    freed.push(block);
                }
            }
        });

        self.release_blocks(&freed);
        if force {
            self.atlas_full = false;
        }
        freed.len()
    }

    fn release_blocks(&mut self, blocks: &[BlockId]) {
        for &block in blocks {
            self.packer.remove_block(block);
        }
        if !blocks.is_empty() {
            self.tree_dirty = true;
            self.stats.freed_blocks += blocks.len();
        }
    }

    /// Copy processed bricks into the atlas, up to the per-frame cap, then
    /// rewrite the tree texture if any block moved.
    pub fn upload_voxels(&mut self) -> Result<usize> {
        let mut uploaded = 0;
        while uploaded < self.config.max_uploads_per_frame {
            let Some(weak) = self.upload_queue.pop_front() else {
                break;
            };
            let Some(node) = weak.upgrade() else {
                continue;
            };
            node.clear_upload_queued();
            if node.is_evicted() {
                continue;
            }

            if !node.has_data() {
                if let Some(block) = node.take_block() {
                    self.release_blocks(&[block]);
                }
                continue;
            }
            let Some(brick) = node.brick() else {
                continue;
            };

            let block = match node.block() {
                Some(block) => block,
                None => match self.packer.add_block(1, 1, 1, node.world_box(self.origin)) {
                    Some(block) => {
                        node.set_block(block);
                        self.tree_dirty = true;
                        block
                    }
                    None => {
                        self.atlas_full = true;
                        if node.try_mark_upload_queued() {
                            self.upload_queue.push_front(weak);
                        }
                        break;
                    }
                },
            };

            let version = node.data_version();
            self.write_brick(block, &brick)?;
            if let Some(info) = self.packer.get_block_info_mut(block) {
                if node.has_dynamic() {
                    info.dirty_dynamic = true;
                } else {
                    info.dirty_static = true;
                }
            }
            node.mark_uploaded(version);
            uploaded += 1;
        }
        self.stats.uploaded += uploaded;

        if self.tree_dirty {
            self.write_tree()?;
        }
        Ok(uploaded)
    }

    fn pool(&self, channel: AtlasChannel) -> Result<PoolId> {
        self.pools
            .get(&channel)
            .copied()
            .ok_or_else(|| Error::Texture(format!("no pool for {}", channel.label())))
    }

    fn write_brick(&mut self, block: BlockId, brick: &Brick) -> Result<()> {
        let min = self
            .packer
            .get_block_info(block)
            .map(|info| info.min)
            .ok_or_else(|| Error::Atlas(format!("block {} is not allocated", block.0)))?;
        let n = brick.size();
        let region = TexelRegion::new(min * n, UVec3::splat(n));

        let samples = brick.read();
        for channel in AtlasChannel::BRICK_CHANNELS {
            let data = samples.pack_channel(channel, channel_format(channel, self.config.texel_format));
            let pool = self.pool(channel)?;
            self.backend.update_region(pool, region, &data)?;
        }
        Ok(())
    }

    /// Rewrite the tree texture. Brick nodes fill the row of their block id,
    /// the root takes the row after the last block row and the other nodes
    /// above the brick levels follow it.
    fn write_tree(&mut self) -> Result<()> {
        let root_row = self.packer.capacity();
        let rows = root_row + self.structural_rows;
        let mut writer = TreeWriter {
            packer: &self.packer,
            origin: self.origin,
            max_node_size: self.config.max_node_size,
            next_row: root_row + 1,
            records: vec![GpuTreeNode::default(); rows as usize],
            overflow: 0,
        };
        if let Some(root) = &self.root {
            writer.write(root, Some(root_row), NODE_ABSENT);
        }
        if writer.overflow > 0 {
            log::warn!("Tree texture full: {} nodes above brick level have no row", writer.overflow);
        }
        let records = writer.records;

        let pool = self.pool(AtlasChannel::Tree)?;
        let region = TexelRegion::new(UVec3::ZERO, UVec3::new(TREE_TEXELS_PER_NODE, rows, 1));
        self.backend.update_region(pool, region, bytemuck::cast_slice(&records))?;
        self.tree_dirty = false;
        self.tree_written = true;
        Ok(())
    }

    fn track_pressure(&mut self) {
        let every = self.config.pressure_warning_frames.max(1);

        if self.budget.should_evict() {
            self.pressure_frames += 1;
            if self.pressure_frames % every == 0 {
                log::warn!(
                    "Voxel budget under pressure for {} frames: {}/{} bricks",
                    self.pressure_frames,
                    self.budget.bricks(),
                    self.budget.max_bricks()
                );
            }
        } else {
            self.pressure_frames = 0;
        }

        if self.atlas_full {
            self.atlas_pressure_frames += 1;
            if self.atlas_pressure_frames % every == 0 {
                log::warn!(
                    "Brick atlas full for {} frames: {} blocks, {} uploads waiting",
                    self.atlas_pressure_frames,
                    self.packer.live_blocks(),
                    self.upload_queue.len()
                );
            }
        } else {
            self.atlas_pressure_frames = 0;
        }
    }

    // --- Renderer interface ---

    /// Blocks whose static or dynamic content changed since the last call,
    /// capped per frame. Returned blocks are marked clean.
    pub fn bricks_for_update(&mut self, dynamic: bool) -> Vec<SvoNodeInfo> {
        let grid = self.packer.dim();
        let ids: Vec<BlockId> = self
            .packer
            .blocks()
            .filter(|(_, block)| if dynamic { block.dirty_dynamic } else { block.dirty_static })
            .map(|(id, _)| id)
            .take(self.config.max_dirty_blocks_per_frame)
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                let block = self.packer.get_block_info_mut(id)?;
                if dynamic {
                    block.dirty_dynamic = false;
                } else {
                    block.dirty_static = false;
                }
                Some(SvoNodeInfo {
                    ws_box: block.world_box,
                    tc_box: block.texture_box(grid),
                    atlas_offset: block.atlas_offset(grid),
                })
            })
            .collect()
    }

    pub fn static_texture_info(&self) -> SvoTextureInfo {
        let extent = UVec3::from_array(self.config.atlas_bricks) * self.config.brick_size;
        let pool = |channel: AtlasChannel| self.pools.get(&channel).copied();
        SvoTextureInfo {
            tree_pool: pool(AtlasChannel::Tree),
            opacity_pool: pool(AtlasChannel::Opacity),
            albedo_pool: pool(AtlasChannel::Albedo),
            normal_pool: pool(AtlasChannel::Normal),
            emittance_pool: pool(AtlasChannel::Emittance),
            tex_dim_xy: [extent.x, extent.y],
            tex_dim_z: extent.z,
            brick_size: self.config.brick_size,
            tree_rows: self.packer.capacity() + self.structural_rows,
            root_row: self.packer.capacity(),
            ready: self.tree_written,
            frozen: self.frozen,
        }
    }

    /// Stop all tree updates and uploads
    pub fn set_frozen(&mut self, frozen: bool) {
        if self.frozen != frozen {
            log::info!("Voxel tree {}", if frozen { "frozen" } else { "unfrozen" });
        }
        self.frozen = frozen;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Draw node boxes down to `max_depth`, colored by residency
    pub fn debug_draw(&self, draw: &mut dyn DebugDraw, max_depth: u32) {
        let Some(root) = &self.root else {
            return;
        };
        let origin = self.origin;
        root.visit(0, &mut |node, depth| {
            if depth > max_depth {
                return;
            }
            let color = if node.block().is_some() && !node.needs_upload() {
                COLOR_RESIDENT
            } else if node.has_data() {
                COLOR_STALE
            } else {
                COLOR_EMPTY
            };
            draw.draw_aabb(&node.world_box(origin), color);
        });
    }

    // --- Accessors ---

    pub fn config(&self) -> &SvoConfig {
        &self.config
    }

    pub fn root(&self) -> Option<&Arc<VoxelNode>> {
        self.root.as_ref()
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn stats(&self) -> &SvoStats {
        &self.stats
    }

    pub fn budget(&self) -> &VoxelBudget {
        &self.budget
    }

    pub fn packer(&self) -> &TextureBlockPacker3D {
        &self.packer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_atlas_full(&self) -> bool {
        self.atlas_full
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        if let Some(root) = &self.root {
            root.visit(0, &mut |_, _| count += 1);
        }
        count
    }
}

impl<B: TextureBackend> Drop for SvoEnvironment<B> {
    fn drop(&mut self) {
        // running jobs hold scratch leases and node references
        self.wait_for_jobs();
        for (_, pool) in self.pools.drain() {
            self.backend.release_pool(pool);
        }
    }
}
