//! Accept/reject statistics of Monte Carlo moves

use std::ops::Sub;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Translate,
    Rotate,
    Box,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HpmcCounters {
    pub translate_accept: u64,
    pub translate_reject: u64,
    pub rotate_accept: u64,
    pub rotate_reject: u64,
    pub box_accept: u64,
    pub box_reject: u64,
}

fn ratio(accept: u64, reject: u64) -> f64 {
    let total = accept + reject;
    if total == 0 {
        0.0
    } else {
        accept as f64 / total as f64
    }
}

impl HpmcCounters {
    pub fn record(&mut self, kind: MoveKind, accepted: bool) {
        let counter = match (kind, accepted) {
            (MoveKind::Translate, true) => &mut self.translate_accept,
            (MoveKind::Translate, false) => &mut self.translate_reject,
            (MoveKind::Rotate, true) => &mut self.rotate_accept,
            (MoveKind::Rotate, false) => &mut self.rotate_reject,
            (MoveKind::Box, true) => &mut self.box_accept,
            (MoveKind::Box, false) => &mut self.box_reject,
        };
        *counter += 1;
    }

    pub fn translate_acceptance(&self) -> f64 {
        ratio(self.translate_accept, self.translate_reject)
    }

    pub fn rotate_acceptance(&self) -> f64 {
        ratio(self.rotate_accept, self.rotate_reject)
    }

    pub fn box_acceptance(&self) -> f64 {
        ratio(self.box_accept, self.box_reject)
    }

    /// Single-particle moves attempted
    pub fn particle_moves(&self) -> u64 {
        self.translate_accept + self.translate_reject + self.rotate_accept + self.rotate_reject
    }
}

/// Counts accumulated between two snapshots
impl Sub for HpmcCounters {
    type Output = HpmcCounters;

    fn sub(self, rhs: HpmcCounters) -> HpmcCounters {
        HpmcCounters {
            translate_accept: self.translate_accept.saturating_sub(rhs.translate_accept),
            translate_reject: self.translate_reject.saturating_sub(rhs.translate_reject),
            rotate_accept: self.rotate_accept.saturating_sub(rhs.rotate_accept),
            rotate_reject: self.rotate_reject.saturating_sub(rhs.rotate_reject),
            box_accept: self.box_accept.saturating_sub(rhs.box_accept),
            box_reject: self.box_reject.saturating_sub(rhs.box_reject),
        }
    }
}
