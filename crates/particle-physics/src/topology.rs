//! Dihedral topology and its per-particle table layout

use bytemuck::{Pod, Zeroable};

/// Four particles forming one dihedral, plus the dihedral type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DihedralGroup {
    pub members: [u32; 4],
    pub type_id: u32,
}

/// Declared dihedral types and every dihedral group in the system.
///
/// `revision` changes on every mutation so computes can tell when their
/// cached per-particle tables are out of date.
#[derive(Debug, Clone, Default)]
pub struct DihedralData {
    groups: Vec<DihedralGroup>,
    type_names: Vec<String>,
    revision: u64,
}

impl DihedralData {
    pub fn new(type_names: Vec<String>) -> Self {
        Self {
            groups: Vec::new(),
            type_names,
            revision: 0,
        }
    }

    pub fn n_types(&self) -> u32 {
        self.type_names.len() as u32
    }

    pub fn type_names(&self) -> &[String] {
        &self.type_names
    }

    pub fn type_id(&self, name: &str) -> Option<u32> {
        self.type_names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    pub fn groups(&self) -> &[DihedralGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a group. Member/type validation happens in `SystemDefinition`.
    pub(crate) fn push(&mut self, group: DihedralGroup) -> usize {
        self.groups.push(group);
        self.revision += 1;
        self.groups.len() - 1
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.revision += 1;
    }

    /// Build the per-particle dihedral table for `n_particles` particles
    pub fn build_table(&self, n_particles: usize) -> DihedralTable {
        DihedralTable::build(&self.groups, n_particles)
    }
}

/// One row of the per-particle dihedral table (matches WGSL `DihedralEntry`)
///
/// `slot` is the position (0..4) of the owning particle inside `members`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DihedralEntry {
    pub members: [u32; 4],
    pub type_id: u32,
    pub slot: u32,
    pub _padding: [u32; 2],
}

/// Per-particle list of the dihedrals each particle takes part in.
///
/// Entries are stored with a pitch of `n_particles`: entry `k` of particle
/// `i` lives at `k * n_particles + i`, so neighbouring threads read
/// neighbouring memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DihedralTable {
    pub n_particles: usize,
    pub width: usize,
    pub counts: Vec<u32>,
    pub entries: Vec<DihedralEntry>,
}

impl DihedralTable {
    pub fn build(groups: &[DihedralGroup], n_particles: usize) -> Self {
        let mut counts = vec![0u32; n_particles];
        for group in groups {
            for &m in &group.members {
                counts[m as usize] += 1;
            }
        }
        let width = counts.iter().copied().max().unwrap_or(0) as usize;

        let mut entries = vec![DihedralEntry::zeroed(); width * n_particles];
        let mut fill = vec![0usize; n_particles];
        for group in groups {
            for (slot, &m) in group.members.iter().enumerate() {
                let i = m as usize;
                entries[fill[i] * n_particles + i] = DihedralEntry {
                    members: group.members,
                    type_id: group.type_id,
                    slot: slot as u32,
                    _padding: [0; 2],
                };
                fill[i] += 1;
            }
        }

        Self {
            n_particles,
            width,
            counts,
            entries,
        }
    }

    /// Dihedral entries of particle `i`, in insertion order
    pub fn entries_of(&self, i: usize) -> impl Iterator<Item = &DihedralEntry> + '_ {
        let n = self.counts.get(i).copied().unwrap_or(0) as usize;
        (0..n).map(move |k| &self.entries[k * self.n_particles + i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout() {
        let groups = [
            DihedralGroup {
                members: [0, 1, 2, 3],
                type_id: 0,
            },
            DihedralGroup {
                members: [1, 2, 3, 4],
                type_id: 1,
            },
        ];
        let table = DihedralTable::build(&groups, 5);
        assert_eq!(table.width, 2);
        assert_eq!(table.counts, vec![1, 2, 2, 2, 1]);

        let of_three: Vec<_> = table.entries_of(3).collect();
        assert_eq!(of_three.len(), 2);
        assert_eq!(of_three[0].slot, 3);
        assert_eq!(of_three[1].slot, 2);
        assert_eq!(of_three[1].type_id, 1);

        // Pitch layout: second entry of particle 1 sits one full row later
        assert_eq!(table.entries[5 + 1].members, [1, 2, 3, 4]);
        assert_eq!(table.entries[5 + 1].slot, 0);
    }

    #[test]
    fn test_revision_tracks_mutation() {
        let mut data = DihedralData::new(vec!["A".into()]);
        let r0 = data.revision();
        data.push(DihedralGroup {
            members: [0, 1, 2, 3],
            type_id: 0,
        });
        assert!(data.revision() > r0);
        let r1 = data.revision();
        data.clear();
        assert!(data.revision() > r1);
        assert_eq!(data.type_id("A"), Some(0));
        assert_eq!(data.type_id("B"), None);
    }
}
