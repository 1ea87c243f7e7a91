//! Per-node queue of mesh edits
//!
//! Edits arriving from the host land in the active buffer. A worker that
//! voxelizes the node swaps buffers under the lock and takes the previously
//! active one, so edits made while it runs wait in the other buffer for the
//! next pass. The `applied` set remembers which snapshot each entity was
//! voxelized with so a removal always subtracts exactly what was added.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::EntityId;
use crate::scene::MeshSnapshot;

pub type MeshMap = HashMap<EntityId, Arc<MeshSnapshot>>;

/// Insertions and removals waiting for one voxelization pass
#[derive(Clone, Debug, Default)]
pub struct MeshEdits {
    pub insertions: MeshMap,
    pub removals: MeshMap,
}

impl MeshEdits {
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.removals.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PendingMeshes {
    buffers: [MeshEdits; 2],
    active: usize,
    applied: MeshMap,
}

impl PendingMeshes {
    /// Pending state for a new node that must voxelize `meshes` from scratch
    pub fn seeded(meshes: MeshMap) -> Self {
        let mut pending = Self::default();
        pending.buffers[0].insertions = meshes;
        pending
    }

    /// Queue edits for the next pass.
    ///
    /// A removal cancels a not-yet-voxelized insertion of the same entity
    /// and subtracts the applied snapshot if there is one. Re-inserting an
    /// entity with a different snapshot is a move: the applied snapshot is
    /// removed and the new one inserted.
    pub fn merge(&mut self, insertions: &MeshMap, removals: &MeshMap) {
        let edits = &mut self.buffers[self.active];

        for id in removals.keys() {
            edits.insertions.remove(id);
            if let Some(applied) = self.applied.get(id) {
                edits.removals.entry(*id).or_insert_with(|| Arc::clone(applied));
            }
        }

        for (id, mesh) in insertions {
            match self.applied.get(id) {
                Some(applied) if Arc::ptr_eq(applied, mesh) => {
                    // already voxelized with this snapshot
                    edits.removals.remove(id);
                    edits.insertions.remove(id);
                }
                Some(applied) => {
                    edits.removals.entry(*id).or_insert_with(|| Arc::clone(applied));
                    edits.insertions.insert(*id, Arc::clone(mesh));
                }
                None => {
                    edits.insertions.insert(*id, Arc::clone(mesh));
                }
            }
        }
    }

    /// Apply edits without voxelizing, for nodes that never hold a brick
    pub fn merge_applied(&mut self, insertions: &MeshMap, removals: &MeshMap) {
        for id in removals.keys() {
            self.applied.remove(id);
        }
        for (id, mesh) in insertions {
            self.applied.insert(*id, Arc::clone(mesh));
        }
    }

    /// Take the active edits and redirect new edits to the other buffer.
    ///
    /// The taken edits are recorded as applied immediately, so edits that
    /// arrive while they are being voxelized resolve against them.
    pub fn swap(&mut self) -> MeshEdits {
        let taken = std::mem::take(&mut self.buffers[self.active]);
        self.active ^= 1;
        for id in taken.removals.keys() {
            self.applied.remove(id);
        }
        for (id, mesh) in &taken.insertions {
            self.applied.insert(*id, Arc::clone(mesh));
        }
        taken
    }

    /// Undo a [`swap`](Self::swap) whose edits were not voxelized
    pub fn restore(&mut self, edits: MeshEdits) {
        for id in edits.insertions.keys() {
            self.applied.remove(id);
        }
        for (id, mesh) in &edits.removals {
            self.applied.insert(*id, Arc::clone(mesh));
        }

        // newer edits already queued take precedence
        let current = std::mem::take(&mut self.buffers[self.active]);
        let active = &mut self.buffers[self.active];
        active.insertions = edits.insertions;
        active.removals = edits.removals;
        self.merge(&current.insertions, &current.removals);
    }

    pub fn has_pending(&self) -> bool {
        !self.buffers[self.active].is_empty()
    }

    pub fn has_pending_insertions(&self) -> bool {
        !self.buffers[self.active].insertions.is_empty()
    }

    pub fn applied(&self) -> &MeshMap {
        &self.applied
    }

    /// Any applied snapshot is a dynamic mesh
    pub fn applied_has_dynamic(&self) -> bool {
        self.applied.values().any(|m| m.is_dynamic())
    }

    /// Every mesh this node will contain once pending edits are processed
    pub fn effective_meshes(&self) -> MeshMap {
        let edits = &self.buffers[self.active];
        let mut meshes = self.applied.clone();
        for id in edits.removals.keys() {
            meshes.remove(id);
        }
        for (id, mesh) in &edits.insertions {
            meshes.insert(*id, Arc::clone(mesh));
        }
        meshes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use glam::Vec3;

    fn mesh(x: f32) -> Arc<MeshSnapshot> {
        Arc::new(MeshSnapshot::cuboid(Aabb::new(Vec3::splat(x), Vec3::splat(x + 1.0)), None))
    }

    fn map(entries: &[(u64, &Arc<MeshSnapshot>)]) -> MeshMap {
        entries.iter().map(|(id, m)| (EntityId(*id), Arc::clone(m))).collect()
    }

    #[test]
    fn test_insert_then_swap() {
        let a = mesh(0.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        assert!(p.has_pending_insertions());

        let edits = p.swap();
        assert_eq!(edits.insertions.len(), 1);
        assert!(!p.has_pending());
        assert!(p.applied().contains_key(&EntityId(1)));
    }

    #[test]
    fn test_remove_before_processing_cancels() {
        let a = mesh(0.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        p.merge(&MeshMap::new(), &map(&[(1, &a)]));
        assert!(!p.has_pending());
    }

    #[test]
    fn test_remove_uses_applied_snapshot() {
        let a = mesh(0.0);
        let stale = mesh(5.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        p.swap();

        p.merge(&MeshMap::new(), &map(&[(1, &stale)]));
        let edits = p.swap();
        assert!(Arc::ptr_eq(&edits.removals[&EntityId(1)], &a));
        assert!(p.applied().is_empty());
    }

    #[test]
    fn test_move_removes_old_and_inserts_new() {
        let a = mesh(0.0);
        let b = mesh(2.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        p.swap();

        p.merge(&map(&[(1, &b)]), &MeshMap::new());
        let edits = p.swap();
        assert!(Arc::ptr_eq(&edits.removals[&EntityId(1)], &a));
        assert!(Arc::ptr_eq(&edits.insertions[&EntityId(1)], &b));
        assert!(Arc::ptr_eq(&p.applied()[&EntityId(1)], &b));
    }

    #[test]
    fn test_reinsert_same_snapshot_is_noop() {
        let a = mesh(0.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        p.swap();
        p.merge(&MeshMap::new(), &map(&[(1, &a)]));
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        assert!(!p.has_pending());
    }

    #[test]
    fn test_edits_during_processing_wait_for_next_pass() {
        let a = mesh(0.0);
        let b = mesh(3.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        let first = p.swap();
        p.merge(&map(&[(2, &b)]), &MeshMap::new());
        assert_eq!(first.insertions.len(), 1);
        assert!(p.has_pending_insertions());
        let second = p.swap();
        assert!(second.insertions.contains_key(&EntityId(2)));
    }

    #[test]
    fn test_restore_requeues_edits() {
        let a = mesh(0.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        let edits = p.swap();
        p.restore(edits);
        assert!(p.applied().is_empty());
        assert!(p.has_pending_insertions());
        let again = p.swap();
        assert!(again.insertions.contains_key(&EntityId(1)));
    }

    #[test]
    fn test_effective_meshes() {
        let a = mesh(0.0);
        let b = mesh(3.0);
        let mut p = PendingMeshes::default();
        p.merge(&map(&[(1, &a)]), &MeshMap::new());
        p.swap();
        p.merge(&map(&[(2, &b)]), &map(&[(1, &a)]));
        let eff = p.effective_meshes();
        assert_eq!(eff.len(), 1);
        assert!(eff.contains_key(&EntityId(2)));
    }

    #[test]
    fn test_merge_applied_for_structural_nodes() {
        let a = mesh(0.0);
        let mut p = PendingMeshes::default();
        p.merge_applied(&map(&[(1, &a)]), &MeshMap::new());
        assert!(!p.has_pending());
        assert_eq!(p.effective_meshes().len(), 1);
        p.merge_applied(&MeshMap::new(), &map(&[(1, &a)]));
        assert!(p.effective_meshes().is_empty());
    }
}
